use super::model::{AudioFormat, FormatList, MediaInfo, RawFormat, RawMediaInfo, VideoFormat};
use lazy_static::lazy_static;
use regex::Regex;
use std::{
    cmp::Ordering,
    collections::HashSet,
    io,
    path::Path,
    pin::Pin,
    task::{Context, Poll},
};
use tempfile::TempDir;
use tokio::{
    fs::File,
    io::{AsyncRead, ReadBuf},
};
use url::{ParseError, Url};

lazy_static! {
    static ref RESOLUTION_RE: Regex = Regex::new(r"(\d+)p").unwrap();
    static ref ERROR_RE: Regex = Regex::new(r"ERROR: (.*)").unwrap();
}

pub const DEFAULT_FILENAME: &str = "download.mp4";

/// Formats seconds as `H:MM:SS`, or `MM:SS` below one hour.
pub fn format_duration(seconds: Option<f64>) -> String {
    let seconds = match seconds {
        Some(s) if s.is_finite() && s != 0.0 => s.trunc().max(0.0) as u64,
        _ => return "N/A".to_string(),
    };
    let (minutes, seconds) = (seconds / 60, seconds % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

pub fn format_filesize(size: Option<f64>) -> String {
    let size = match size {
        Some(s) if s.is_finite() && s.trunc() > 0.0 => s.trunc(),
        _ => return "N/A".to_string(),
    };
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if size < MB {
        format!("{:.2} KB", size / KB)
    } else if size < GB {
        format!("{:.2} MB", size / MB)
    } else {
        format!("{:.2} GB", size / GB)
    }
}

/// `720` for `"720p60"`, 0 when the label has no `<n>p` in it.
pub fn resolution_key(quality: &str) -> u32 {
    RESOLUTION_RE
        .captures(quality)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Pulls the human readable part out of a yt-dlp error dump.
pub fn clean_error_message(error_text: &str) -> String {
    match ERROR_RE.captures(error_text).and_then(|c| c.get(1)) {
        Some(m) => m
            .as_str()
            .trim()
            .split(';')
            .next()
            .unwrap_or_default()
            .to_string(),
        None => "Could not process this URL.".to_string(),
    }
}

/// Accepts http(s) URLs and scheme-less links such as
/// `www.youtube.com/watch?v=..`, which yt-dlp resolves itself.
pub fn is_http_url(url: &str) -> bool {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(ParseError::RelativeUrlWithoutBase) => match Url::parse(&format!("https://{}", url)) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        },
        Err(_) => return false,
    };
    matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some()
}

/// Strips anything that could break out of a `Content-Disposition` value
/// or name a path.
pub fn sanitize_filename(filename: Option<&str>) -> String {
    let cleaned: String = filename
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '/' | '\\' | '"'))
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        cleaned
    }
}

/// `Content-Disposition` value with an ASCII fallback name and the
/// RFC 5987 encoded original.
pub fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}

fn abr_desc(a: &Option<f64>, b: &Option<f64>) -> Ordering {
    b.unwrap_or(0.0).total_cmp(&a.unwrap_or(0.0))
}

fn filesize(f: &RawFormat) -> Option<f64> {
    f.filesize.filter(|s| *s != 0.0).or(f.filesize_approx)
}

fn aspect(f: &RawFormat) -> String {
    match (f.width, f.height) {
        (Some(w), Some(h)) if w != 0.0 && h != 0.0 => format!("{}:{}", w, h),
        _ => "N/A".to_string(),
    }
}

/// Splits formats into mp4 video streams (one per quality label, highest
/// resolution first) and m4a/mp3 audio streams (highest bitrate first).
pub fn extract_formats(formats: &[RawFormat]) -> FormatList {
    let mut video = Vec::new();
    let mut audio = Vec::new();

    for f in formats {
        let url = match &f.url {
            Some(url) => url.clone(),
            None => continue,
        };
        let size = format_filesize(filesize(f));
        let ext = f.ext.as_deref();

        if f.has_video() && ext == Some("mp4") {
            let quality = match f.format_note.clone().or_else(|| f.resolution.clone()) {
                Some(quality) if !quality.is_empty() => quality,
                _ => continue,
            };
            video.push(VideoFormat {
                format_id: f.format_id.clone(),
                format: f.ext.clone(),
                quality,
                size,
                url,
                aspect: aspect(f),
            });
        } else if f.is_audio_only() && matches!(ext, Some("m4a") | Some("mp3")) {
            let quality = match &f.format_note {
                Some(note) if !note.is_empty() => note.clone(),
                _ => format!("{}k", f.abr.unwrap_or(0.0)),
            };
            audio.push(AudioFormat {
                format_id: f.format_id.clone(),
                format: f.ext.clone(),
                quality,
                size,
                url,
                abr: f.abr,
            });
        }
    }

    video.sort_by(|a, b| resolution_key(&b.quality).cmp(&resolution_key(&a.quality)));
    let mut seen = HashSet::new();
    video.retain(|f| seen.insert(f.quality.clone()));

    audio.sort_by(|a, b| abr_desc(&a.abr, &b.abr));

    FormatList { video, audio }
}

/// Highest bitrate audio-only stream, in any container. Ties keep the
/// earliest.
pub fn best_audio(formats: &[RawFormat]) -> Option<&RawFormat> {
    let mut audio: Vec<&RawFormat> = formats.iter().filter(|f| f.is_audio_only()).collect();
    audio.sort_by(|a, b| abr_desc(&a.abr, &b.abr));
    audio.into_iter().next()
}

pub fn preview_url(formats: &[RawFormat]) -> Option<String> {
    formats
        .iter()
        .find(|f| f.has_video() && f.has_audio())
        .and_then(|f| f.url.clone())
}

pub fn build_media_info(info: RawMediaInfo, original_url: &str) -> MediaInfo {
    let best_audio = best_audio(&info.formats);

    MediaInfo {
        title: info.title.clone().unwrap_or("No Title".to_string()),
        duration: format_duration(info.duration),
        thumbnail: info.thumbnail.clone().unwrap_or_default(),
        original_url: original_url.to_string(),
        preview_url: preview_url(&info.formats),
        preview_audio_url: best_audio.and_then(|f| f.url.clone()),
        formats: extract_formats(&info.formats),
        best_audio_id: best_audio.and_then(|f| f.format_id.clone()),
    }
}

/// Merged download streamed back to the client. Owns the job directory, so
/// the directory is removed once the response body is dropped.
pub struct DownloadedFile {
    file: File,
    len: u64,
    _dir: TempDir,
}

impl DownloadedFile {
    pub async fn open(dir: TempDir, path: &Path) -> io::Result<Self> {
        let file = File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok(Self {
            file,
            len,
            _dir: dir,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }
}

impl AsyncRead for DownloadedFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}
