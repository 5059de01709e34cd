use crate::yt_dlp::extractor::SharedExtractor;

mod handler;
mod model;

pub fn health_checks(extractor: SharedExtractor) -> handler::HealthCheck {
    handler::HealthCheck::new(extractor)
}
