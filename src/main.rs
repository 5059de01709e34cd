use dotenv::dotenv;
use poem::{
    listener::TcpListener,
    middleware::{Cors, NormalizePath, Tracing, TrailingSlash},
    Endpoint, EndpointExt, IntoEndpoint, Route, Server,
};
use poem_openapi::OpenApiService;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use yt_dlp::extractor::SharedExtractor;

mod health;
mod utils;
mod yt_dlp;

/// Docs are only wrapped in Basic auth when credentials are configured.
fn protect<E>(ep: E) -> poem::endpoint::BoxEndpoint<'static>
where
    E: IntoEndpoint,
    E::Endpoint: 'static,
{
    let ep = ep.into_endpoint();
    match utils::BasicAuth::from_env() {
        Some(auth) => ep.with(auth).map_to_response().boxed(),
        None => ep.map_to_response().boxed(),
    }
}

fn routes(extractor: SharedExtractor) -> impl Endpoint {
    let health_api = health::health_checks(extractor.clone());
    let media_api = yt_dlp::media_api(extractor);

    let api_service = OpenApiService::new((health_api, media_api), "LinkDrop", "1.0")
        .server(utils::get_host());
    let ui = protect(api_service.swagger_ui());
    let spec = protect(api_service.spec_endpoint_yaml());

    Route::new()
        .nest("/swagger", ui)
        .nest("/swagger/spec", spec)
        .nest("/", api_service)
        // operations are registered without the trailing slash clients send
        .with(NormalizePath::new(TrailingSlash::Trim))
        .with(Cors::new())
        .with(Tracing)
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    dotenv().ok(); // This line loads the environment variables from the ".env" file.
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = utils::get_port();
    let extractor = match yt_dlp::extractor().await {
        Ok(extractor) => extractor,
        Err(err) => {
            error!(error = ?err, "Failed to set up yt-dlp");
            return Err(std::io::Error::new(std::io::ErrorKind::Other, err));
        }
    };

    match extractor.version().await {
        Ok(version) => info!(version = %version, "Using yt-dlp"),
        Err(err) => error!(error = %err, "yt-dlp is not runnable, requests will fail"),
    }

    Server::new(TcpListener::bind(format!("0.0.0.0:{}", port)))
        .run_with_graceful_shutdown(
            routes(extractor),
            async move {
                let _ = tokio::signal::ctrl_c().await;
            },
            Some(Duration::from_secs(5)),
        )
        .await
}
