use super::extractor::{ExtractorError, SharedExtractor};
use super::model::{DownloadRequest, MediaInfo, MediaRequest};
use super::utils::{self, DownloadedFile};
use crate::utils::{get_download_dir, ApiTags, JsonError};
use poem::Body;
use poem_openapi::{
    payload::{Binary, Json},
    ApiResponse, OpenApi,
};
use tracing::{error, info};

pub struct Media {
    extractor: SharedExtractor,
}

#[derive(ApiResponse)]
pub enum DownloadResponse {
    /// The merged mp4, streamed from disk
    #[oai(status = 200, content_type = "video/mp4")]
    Ok(
        Binary<Body>,
        #[oai(header = "Content-Disposition")] String,
        #[oai(header = "Content-Length")] u64,
    ),
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[OpenApi(tag = "ApiTags::Media")]
impl Media {
    pub fn new(extractor: SharedExtractor) -> Self {
        Self { extractor }
    }

    /// Look up a media URL and list the formats that can be downloaded
    #[oai(path = "/media", method = "post", operation_id = "media::get_info")]
    async fn get_info(&self, payload: Json<MediaRequest>) -> Result<Json<MediaInfo>, JsonError> {
        let url = match required(&payload.url) {
            Some(url) => url,
            None => return Err(JsonError::bad_request("URL is required")),
        };

        if !utils::is_http_url(url) {
            return Err(JsonError::bad_request(
                "Could not process the URL: Invalid URL",
            ));
        }

        let raw = match self.extractor.extract_info(url).await {
            Ok(raw) => raw,
            Err(ExtractorError::Download(message)) => {
                let message = utils::clean_error_message(&message);
                error!(url = %url, error = %message, "yt-dlp download error");
                return Err(JsonError::bad_request(format!(
                    "Could not process the URL: {}",
                    message
                )));
            }
            Err(error) => {
                error!(url = %url, error = ?error, "Failed to get metadata");
                return Err(JsonError::internal_server_error(
                    "An unexpected server error occurred.",
                ));
            }
        };

        let media = utils::build_media_info(raw, url);
        info!(
            url = %url,
            video = media.formats.video.len(),
            audio = media.formats.audio.len(),
            "Extracted media info"
        );

        Ok(Json(media))
    }

    /// Download the chosen video and audio streams merged into one mp4
    #[oai(path = "/download", method = "post", operation_id = "media::download")]
    async fn download(
        &self,
        payload: Json<DownloadRequest>,
    ) -> Result<DownloadResponse, JsonError> {
        let (url, video_id, audio_id) = match (
            required(&payload.original_url),
            required(&payload.video_format_id),
            required(&payload.audio_format_id),
        ) {
            (Some(url), Some(video_id), Some(audio_id)) => (url, video_id, audio_id),
            _ => return Err(JsonError::bad_request("Missing required parameters")),
        };
        let filename = utils::sanitize_filename(payload.filename.as_deref());

        let temp_dir = match tempfile::Builder::new()
            .prefix("linkdrop-")
            .tempdir_in(get_download_dir())
        {
            Ok(temp_dir) => temp_dir,
            Err(error) => {
                error!(url = %url, error = ?error, "Failed to create download directory");
                return Err(JsonError::internal_server_error(
                    "Failed to download or process the media.",
                ));
            }
        };

        let format = format!("{}+{}", video_id, audio_id);
        // temp_dir is dropped, and the directory removed, on every early return
        if let Err(error) = self
            .extractor
            .download(url, &format, temp_dir.path())
            .await
        {
            error!(url = %url, format = %format, error = ?error, "Failed to download media");
            return Err(JsonError::internal_server_error(
                "Failed to download or process the media.",
            ));
        }

        let file_path = temp_dir.path().join("media.mp4");
        if !file_path.exists() {
            error!(url = %url, format = %format, "Merged file is missing");
            return Err(JsonError::internal_server_error(
                "File could not be created on the server.",
            ));
        }

        let file = match DownloadedFile::open(temp_dir, &file_path).await {
            Ok(file) => file,
            Err(error) => {
                error!(url = %url, error = ?error, "Failed to open merged file");
                return Err(JsonError::internal_server_error(
                    "File could not be created on the server.",
                ));
            }
        };

        let length = file.len();
        info!(url = %url, format = %format, filename = %filename, length, "Streaming download");

        Ok(DownloadResponse::Ok(
            Binary(Body::from_async_read(file)),
            utils::content_disposition(&filename),
            length,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yt_dlp::extractor::testing::FakeExtractor;
    use poem::{http::StatusCode, test::TestClient, Endpoint};
    use serde_json::json;
    use std::sync::Arc;

    fn client(extractor: Arc<FakeExtractor>) -> TestClient<impl Endpoint> {
        TestClient::new(crate::routes(extractor))
    }

    fn header(resp: &poem::test::TestResponse, name: &str) -> String {
        resp.0
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    fn sample_info() -> serde_json::Value {
        json!({
            "title": "Big Buck Bunny",
            "duration": 596,
            "thumbnail": "https://i.ytimg.com/vi/x/hq.jpg",
            "formats": [
                {"format_id": "a64", "ext": "m4a", "vcodec": "none", "acodec": "mp4a", "abr": 64, "url": "https://cdn/a64"},
                {"format_id": "a128", "ext": "m4a", "vcodec": "none", "acodec": "mp4a", "abr": 128, "url": "https://cdn/a128"},
                {"format_id": "anull", "ext": "m4a", "vcodec": "none", "acodec": "mp4a", "url": "https://cdn/anull"},
                {"format_id": "160", "ext": "mp4", "vcodec": "avc1", "acodec": "none", "format_note": "144p", "url": "https://cdn/160"},
                {"format_id": "394", "ext": "mp4", "vcodec": "av01", "acodec": "none", "format_note": "144p", "url": "https://cdn/394"},
                {"format_id": "136", "ext": "mp4", "vcodec": "avc1", "acodec": "none", "format_note": "720p", "url": "https://cdn/136"},
                {"format_id": "135", "ext": "mp4", "vcodec": "avc1", "acodec": "none", "format_note": "480p", "url": "https://cdn/135"},
                {"format_id": "18", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a", "format_note": "360p", "url": "https://cdn/18"}
            ]
        })
    }

    #[tokio::test]
    async fn media_requires_url() {
        let extractor = Arc::new(FakeExtractor::default());
        let cli = client(extractor.clone());

        let resp = cli.post("/media/").body_json(&json!({})).send().await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        resp.assert_json(json!({"error": "URL is required"})).await;

        let resp = cli.post("/media/").body_json(&json!({"url": " "})).send().await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(*extractor.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn media_rejects_non_http_url() {
        let extractor = Arc::new(FakeExtractor::default());
        let cli = client(extractor.clone());

        let resp = cli
            .post("/media/")
            .body_json(&json!({"url": "file:///etc/passwd"}))
            .send()
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(*extractor.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn media_accepts_url_without_scheme() {
        let extractor = Arc::new(FakeExtractor {
            info: Some(sample_info()),
            ..Default::default()
        });
        let cli = client(extractor.clone());

        let resp = cli
            .post("/media/")
            .body_json(&json!({"url": "www.youtube.com/watch?v=aqz-KE-bpKQ"}))
            .send()
            .await;
        resp.assert_status_is_ok();
        assert_eq!(*extractor.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn media_is_served_with_and_without_trailing_slash() {
        let extractor = Arc::new(FakeExtractor {
            info: Some(sample_info()),
            ..Default::default()
        });
        let cli = client(extractor);

        for path in ["/media/", "/media"] {
            cli.post(path)
                .body_json(&json!({"url": "https://www.youtube.com/watch?v=x"}))
                .send()
                .await
                .assert_status_is_ok();
        }
    }

    #[tokio::test]
    async fn media_returns_reshaped_info() {
        let extractor = Arc::new(FakeExtractor {
            info: Some(sample_info()),
            ..Default::default()
        });
        let cli = client(extractor);

        let resp = cli
            .post("/media/")
            .body_json(&json!({"url": "https://www.youtube.com/watch?v=aqz-KE-bpKQ"}))
            .send()
            .await;
        resp.assert_status_is_ok();

        let json = resp.json().await;
        let body = json.value().object();
        body.get("title").assert_string("Big Buck Bunny");
        body.get("duration").assert_string("09:56");
        body.get("original_url")
            .assert_string("https://www.youtube.com/watch?v=aqz-KE-bpKQ");
        body.get("preview_url").assert_string("https://cdn/18");
        body.get("preview_audio_url").assert_string("https://cdn/a128");
        body.get("best_audio_id").assert_string("a128");

        let formats = body.get("formats").object();
        let video = formats.get("video").array();
        video.assert_len(4);
        for (i, quality) in ["720p", "480p", "360p", "144p"].iter().enumerate() {
            video.get(i).object().get("quality").assert_string(quality);
        }
        video.get(3).object().get("format_id").assert_string("160");

        let audio = formats.get("audio").array();
        audio.assert_len(3);
        audio.get(0).object().get("format_id").assert_string("a128");
    }

    #[tokio::test]
    async fn media_cleans_extractor_errors() {
        let extractor = Arc::new(FakeExtractor {
            error: Some("ERROR: [youtube] x: Private video; sign in to view".to_string()),
            ..Default::default()
        });
        let cli = client(extractor);

        let resp = cli
            .post("/media/")
            .body_json(&json!({"url": "https://www.youtube.com/watch?v=x"}))
            .send()
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        resp.assert_json(json!({
            "error": "Could not process the URL: [youtube] x: Private video"
        }))
        .await;
    }

    #[tokio::test]
    async fn media_hides_unexpected_errors() {
        // no info configured: the fake fails like a missing binary
        let extractor = Arc::new(FakeExtractor::default());
        let cli = client(extractor);

        let resp = cli
            .post("/media/")
            .body_json(&json!({"url": "https://www.youtube.com/watch?v=x"}))
            .send()
            .await;
        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        resp.assert_json(json!({"error": "An unexpected server error occurred."}))
            .await;
    }

    #[tokio::test]
    async fn media_rejects_malformed_body() {
        let cli = client(Arc::new(FakeExtractor::default()));

        let resp = cli
            .post("/media/")
            .content_type("application/json")
            .body("{not json")
            .send()
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn download_requires_all_fields() {
        let extractor = Arc::new(FakeExtractor::default());
        let cli = client(extractor.clone());

        let resp = cli
            .post("/download/")
            .body_json(&json!({"original_url": "https://x.test/v", "video_format_id": "136"}))
            .send()
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        resp.assert_json(json!({"error": "Missing required parameters"}))
            .await;
        assert_eq!(*extractor.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn download_streams_file_and_removes_directory() {
        let extractor = Arc::new(FakeExtractor {
            file: Some(b"merged mp4".to_vec()),
            ..Default::default()
        });
        let cli = client(extractor.clone());

        let resp = cli
            .post("/download/")
            .body_json(&json!({
                "original_url": "https://x.test/v",
                "video_format_id": "136",
                "audio_format_id": "a128",
                "filename": "bunny.mp4"
            }))
            .send()
            .await;
        resp.assert_status_is_ok();
        assert_eq!(header(&resp, "content-type"), "video/mp4");
        assert_eq!(header(&resp, "content-length"), "10");
        let disposition = header(&resp, "content-disposition");
        assert!(disposition.starts_with("attachment; filename=\"bunny.mp4\""));

        let dir = extractor.download_dir.lock().unwrap().clone().unwrap();
        assert!(dir.exists());

        resp.assert_bytes(b"merged mp4").await;
        assert!(!dir.exists());
        assert_eq!(
            extractor.requested_format.lock().unwrap().as_deref(),
            Some("136+a128")
        );
    }

    #[tokio::test]
    async fn download_failure_removes_directory() {
        let extractor = Arc::new(FakeExtractor {
            error: Some("ERROR: Requested format is not available".to_string()),
            ..Default::default()
        });
        let cli = client(extractor.clone());

        let resp = cli
            .post("/download/")
            .body_json(&json!({
                "original_url": "https://x.test/v",
                "video_format_id": "136",
                "audio_format_id": "a128"
            }))
            .send()
            .await;
        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        resp.assert_json(json!({"error": "Failed to download or process the media."}))
            .await;

        let dir = extractor.download_dir.lock().unwrap().clone().unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn download_without_output_removes_directory() {
        let extractor = Arc::new(FakeExtractor::default());
        let cli = client(extractor.clone());

        let resp = cli
            .post("/download/")
            .body_json(&json!({
                "original_url": "https://x.test/v",
                "video_format_id": "136",
                "audio_format_id": "a128"
            }))
            .send()
            .await;
        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        resp.assert_json(json!({"error": "File could not be created on the server."}))
            .await;

        let dir = extractor.download_dir.lock().unwrap().clone().unwrap();
        assert!(!dir.exists());
    }
}
