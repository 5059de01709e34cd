use super::model::RawMediaInfo;
use async_trait::async_trait;
use std::{env, path::Path, path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio::process::Command;
use youtube_dl::YoutubeDl;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

pub type SharedExtractor = Arc<dyn Extractor>;

#[derive(Debug, Error)]
pub enum ExtractorError {
    /// yt-dlp ran and reported an `ERROR:` line.
    #[error("{0}")]
    Download(String),
    #[error("yt-dlp failed: {0}")]
    Process(youtube_dl::Error),
    #[error("yt-dlp is not runnable: {0}")]
    Unavailable(String),
    #[error("invalid yt-dlp output: {0}")]
    Output(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<youtube_dl::Error> for ExtractorError {
    fn from(error: youtube_dl::Error) -> Self {
        let message = error.to_string();
        if message.contains("ERROR:") {
            ExtractorError::Download(message)
        } else {
            ExtractorError::Process(error)
        }
    }
}

/// Everything the service needs from the media extractor.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetch stream metadata without downloading anything.
    async fn extract_info(&self, url: &str) -> Result<RawMediaInfo, ExtractorError>;

    /// Fetch `format` and merge it into `<dir>/media.mp4`.
    async fn download(&self, url: &str, format: &str, dir: &Path) -> Result<(), ExtractorError>;

    async fn version(&self) -> Result<String, ExtractorError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorOptions {
    pub binary_path: Option<PathBuf>,
    pub socket_timeout: u32,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub age_limit: u32,
    pub force_ipv4: bool,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            binary_path: None,
            socket_timeout: 15,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            accept_language: Some("en-US,en;q=0.5".to_string()),
            age_limit: 99,
            force_ipv4: true,
        }
    }
}

impl ExtractorOptions {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let header = |name: &str, default: Option<String>| match env::var(name) {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(value),
            Err(_) => default,
        };

        Self {
            binary_path: env::var("YT_DLP_PATH").ok().map(PathBuf::from),
            socket_timeout: env::var("YT_DLP_SOCKET_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.socket_timeout),
            user_agent: header("YT_DLP_USER_AGENT", defaults.user_agent),
            accept_language: header("YT_DLP_ACCEPT_LANGUAGE", defaults.accept_language),
            age_limit: env::var("YT_DLP_AGE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.age_limit),
            force_ipv4: env::var("YT_DLP_FORCE_IPV4")
                .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(defaults.force_ipv4),
        }
    }

    /// Flags passed to every metadata lookup.
    pub fn metadata_args(&self) -> Vec<String> {
        let mut args = vec![
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--age-limit".to_string(),
            self.age_limit.to_string(),
        ];
        if self.force_ipv4 {
            args.push("--force-ipv4".to_string());
        }
        if let Some(user_agent) = &self.user_agent {
            args.push("--add-header".to_string());
            args.push(format!("User-Agent:{}", user_agent));
        }
        if let Some(language) = &self.accept_language {
            args.push("--add-header".to_string());
            args.push(format!("Accept-Language:{}", language));
        }
        args
    }

    /// Flags passed to every download.
    pub fn download_args(&self) -> Vec<String> {
        vec![
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
        ]
    }
}

pub struct YtDlp {
    options: ExtractorOptions,
}

impl YtDlp {
    pub fn new(options: ExtractorOptions) -> Self {
        Self { options }
    }

    fn command(&self, url: &str, args: Vec<String>) -> YoutubeDl {
        let mut ytdl = YoutubeDl::new(url);
        if let Some(path) = &self.options.binary_path {
            ytdl.youtube_dl_path(path);
        }
        ytdl.socket_timeout(self.options.socket_timeout.to_string());
        for arg in args {
            ytdl.extra_arg(arg);
        }
        ytdl
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn extract_info(&self, url: &str) -> Result<RawMediaInfo, ExtractorError> {
        let value = self
            .command(url, self.options.metadata_args())
            .run_raw_async()
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn download(&self, url: &str, format: &str, dir: &Path) -> Result<(), ExtractorError> {
        self.command(url, self.options.download_args())
            .format(format)
            .output_template("media.%(ext)s")
            .download_to_async(dir)
            .await?;
        Ok(())
    }

    async fn version(&self) -> Result<String, ExtractorError> {
        let binary = self
            .options
            .binary_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("yt-dlp"));

        let output = Command::new(binary).arg("--version").output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractorError::Unavailable(format!(
                "--version exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// In-memory extractor for handler tests.
    #[derive(Default)]
    pub struct FakeExtractor {
        pub info: Option<serde_json::Value>,
        pub error: Option<String>,
        /// Bytes written to `media.mp4`; `None` leaves the directory empty.
        pub file: Option<Vec<u8>>,
        pub download_dir: Mutex<Option<PathBuf>>,
        pub requested_format: Mutex<Option<String>>,
        pub calls: Mutex<usize>,
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        async fn extract_info(&self, _url: &str) -> Result<RawMediaInfo, ExtractorError> {
            *self.calls.lock().unwrap() += 1;
            if let Some(error) = &self.error {
                return Err(ExtractorError::Download(error.clone()));
            }
            match &self.info {
                Some(info) => Ok(serde_json::from_value(info.clone())?),
                None => Err(ExtractorError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "yt-dlp not found",
                ))),
            }
        }

        async fn download(
            &self,
            _url: &str,
            format: &str,
            dir: &Path,
        ) -> Result<(), ExtractorError> {
            *self.calls.lock().unwrap() += 1;
            *self.download_dir.lock().unwrap() = Some(dir.to_path_buf());
            *self.requested_format.lock().unwrap() = Some(format.to_string());
            if let Some(error) = &self.error {
                return Err(ExtractorError::Download(error.clone()));
            }
            if let Some(file) = &self.file {
                std::fs::write(dir.join("media.mp4"), file)?;
            }
            Ok(())
        }

        async fn version(&self) -> Result<String, ExtractorError> {
            match &self.error {
                Some(error) => Err(ExtractorError::Unavailable(error.clone())),
                None => Ok("2024.04.09".to_string()),
            }
        }
    }
}
