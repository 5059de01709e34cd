use poem_openapi::Object;
use serde::Deserialize;

/// The subset of `yt-dlp -J` output the service reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMediaInfo {
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

/// One entry of the `formats` array reported by yt-dlp.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub url: Option<String>,
    pub format_note: Option<String>,
    pub resolution: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub abr: Option<f64>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
}

impl RawFormat {
    /// yt-dlp writes the literal `"none"` for a missing stream; an absent
    /// codec field is not treated as missing.
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref() != Some("none")
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref() != Some("none")
    }

    pub fn is_audio_only(&self) -> bool {
        !self.has_video() && self.has_audio()
    }
}

/// Lookup request
#[derive(Debug, Object, Clone)]
pub struct MediaRequest {
    /// Page URL of the media, e.g. a YouTube watch link
    pub url: Option<String>,
}

/// Download request
#[derive(Debug, Object, Clone)]
pub struct DownloadRequest {
    /// The URL that was passed to `/media/`
    pub original_url: Option<String>,
    /// `format_id` of the chosen video stream
    pub video_format_id: Option<String>,
    /// `format_id` of the chosen audio stream
    pub audio_format_id: Option<String>,
    /// Name of the attachment (defaults to `download.mp4`)
    pub filename: Option<String>,
}

/// Media details and the formats that can be downloaded
#[derive(Debug, Object, Clone, PartialEq)]
pub struct MediaInfo {
    pub title: String,
    /// `H:MM:SS`, `MM:SS` or `N/A`
    pub duration: String,
    pub thumbnail: String,
    pub original_url: String,
    /// Stream with both audio and video, playable as-is
    pub preview_url: Option<String>,
    pub preview_audio_url: Option<String>,
    pub formats: FormatList,
    /// Format id to pair with the chosen video stream
    pub best_audio_id: Option<String>,
}

#[derive(Debug, Object, Clone, PartialEq, Default)]
pub struct FormatList {
    pub video: Vec<VideoFormat>,
    pub audio: Vec<AudioFormat>,
}

#[derive(Debug, Object, Clone, PartialEq)]
pub struct VideoFormat {
    pub format_id: Option<String>,
    /// Container extension
    pub format: Option<String>,
    /// Label such as `720p`
    pub quality: String,
    pub size: String,
    pub url: String,
    /// `width:height` or `N/A`
    pub aspect: String,
}

#[derive(Debug, Object, Clone, PartialEq)]
pub struct AudioFormat {
    pub format_id: Option<String>,
    pub format: Option<String>,
    pub quality: String,
    pub size: String,
    pub url: String,
    /// Average bitrate in kbit/s
    pub abr: Option<f64>,
}
