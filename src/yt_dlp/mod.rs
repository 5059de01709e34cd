use anyhow::Context;
use extractor::{ExtractorOptions, SharedExtractor, YtDlp};
use std::{path::PathBuf, sync::Arc};
use tracing::info;

pub mod extractor;
mod handler;
mod model;
mod utils;

/// Builds the yt-dlp extractor from the environment, fetching the binary
/// first when `YT_DLP_AUTO_DOWNLOAD` names a directory.
pub async fn extractor() -> anyhow::Result<SharedExtractor> {
    let mut options = ExtractorOptions::from_env();

    if let Ok(dir) = std::env::var("YT_DLP_AUTO_DOWNLOAD") {
        let dir = PathBuf::from(dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = youtube_dl::download_yt_dlp(&dir)
            .await
            .context("Failed to download yt-dlp")?;
        info!(path = %path.display(), "Downloaded yt-dlp");
        options.binary_path = Some(path);
    }

    Ok(Arc::new(YtDlp::new(options)))
}

pub fn media_api(extractor: SharedExtractor) -> handler::Media {
    handler::Media::new(extractor)
}
