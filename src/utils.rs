use poem::{
    http::StatusCode,
    web::headers::authorization::Basic,
    web::headers::{self, HeaderMapExt},
    Endpoint, Error as PoemError, Middleware, Request, Response, Result as PoemResult,
};
use poem_openapi::{error::ParseRequestPayloadError, payload::Json, ApiResponse, Object, Tags};
use std::{env, path::PathBuf};

#[derive(Tags)]
pub enum ApiTags {
    /// Health check endpoints
    HealthCheck,
    /// Media lookup and download
    Media,
}

pub fn get_port() -> String {
    env::var("PORT").unwrap_or("3000".to_string())
}

pub fn get_host() -> String {
    env::var("HOST").unwrap_or(format!("http://localhost:{}", get_port()))
}

/// Parent directory for per-request download directories.
pub fn get_download_dir() -> PathBuf {
    match env::var("DOWNLOAD_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => env::temp_dir(),
    }
}

/// Body of every error response.
#[derive(Debug, Object)]
pub struct ErrorObject {
    pub error: String,
}

#[derive(ApiResponse)]
#[oai(bad_request_handler = "bad_request_handler")]
pub enum JsonError {
    #[oai(status = 400)]
    BadRequest(Json<ErrorObject>),
    #[oai(status = 500)]
    InternalServerError(Json<ErrorObject>),
}

impl JsonError {
    pub fn bad_request(error: impl ToString) -> Self {
        JsonError::BadRequest(Json(ErrorObject {
            error: error.to_string(),
        }))
    }

    pub fn internal_server_error(error: impl ToString) -> Self {
        JsonError::InternalServerError(Json(ErrorObject {
            error: error.to_string(),
        }))
    }
}

fn bad_request_handler(err: PoemError) -> JsonError {
    if err.is::<ParseRequestPayloadError>() {
        JsonError::bad_request(err)
    } else {
        JsonError::internal_server_error(err)
    }
}

/// Guards the API documentation when credentials are configured.
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        BasicAuth {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let username = env::var("BASIC_AUTH_USERNAME").ok()?;
        let password = env::var("BASIC_AUTH_PASSWORD").ok()?;
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(BasicAuth::new(username, password))
    }
}

impl<E: Endpoint> Middleware<E> for BasicAuth {
    type Output = BasicAuthEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        BasicAuthEndpoint {
            ep,
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

pub struct BasicAuthEndpoint<E> {
    ep: E,
    username: String,
    password: String,
}

impl<E: Endpoint> Endpoint for BasicAuthEndpoint<E> {
    type Output = E::Output;

    async fn call(&self, req: Request) -> PoemResult<Self::Output> {
        if let Some(auth) = req.headers().typed_get::<headers::Authorization<Basic>>() {
            if auth.0.username() == self.username && auth.0.password() == self.password {
                return self.ep.call(req).await;
            }
        }

        let res = Response::builder()
            .header("WWW-Authenticate", "Basic")
            .status(StatusCode::UNAUTHORIZED)
            .body(());

        Err(PoemError::from_response(res))
    }
}
