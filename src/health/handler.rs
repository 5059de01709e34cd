use super::model::Status;
use crate::{utils::ApiTags, yt_dlp::extractor::SharedExtractor};
use poem::{http::StatusCode, Error, Result};
use poem_openapi::{
    payload::{Json, PlainText},
    OpenApi,
};
use tracing::error;

pub struct HealthCheck {
    extractor: SharedExtractor,
}

#[OpenApi(tag = "ApiTags::HealthCheck")]
impl HealthCheck {
    pub fn new(extractor: SharedExtractor) -> Self {
        Self { extractor }
    }

    #[oai(path = "/", method = "get")]
    async fn status(&self) -> Json<Status> {
        Json(Status {
            status: "ok".to_string(),
            message: "Backend is running!".to_string(),
        })
    }

    #[oai(path = "/health/liveness", method = "get")]
    async fn liveness(&self) -> PlainText<String> {
        PlainText("OK".to_string())
    }

    /// Ready once the yt-dlp binary can be executed
    #[oai(path = "/health/readiness", method = "get")]
    async fn readiness(&self) -> Result<PlainText<String>> {
        match self.extractor.version().await {
            Ok(version) => Ok(PlainText(format!("OK yt-dlp {}", version))),
            Err(err) => {
                error!(error = ?err, "yt-dlp is not available");
                Err(Error::from_string(
                    err.to_string(),
                    StatusCode::INTERNAL_SERVER_ERROR,
                ))
            }
        }
    }
}
