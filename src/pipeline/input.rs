//! Input resolution: turn a user-supplied path or URL into an [`ImageBlob`].
//!
//! The media type is sniffed from magic bytes with the `image` crate and
//! falls back to the file extension. No format is rejected locally; the
//! remote Space enforces its own rules.

use crate::config::is_http_url;
use crate::error::Img2MeshError;
use image::ImageFormat;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const FALLBACK_MIME: &str = "application/octet-stream";

/// Raw image bytes plus their declared media type.
///
/// Cloning is cheap: the bytes are shared.
#[derive(Clone, PartialEq)]
pub struct ImageBlob {
    data: Arc<[u8]>,
    mime_type: String,
    file_name: Option<String>,
}

impl ImageBlob {
    pub fn new(data: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            data: Arc::from(data.into()),
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    /// Build a blob whose media type is sniffed from the bytes.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let mime = sniff_mime(&data, None);
        Self::new(data, mime)
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File name sent with uploads; derived from the media type when unset.
    pub fn file_name(&self) -> String {
        if let Some(ref name) = self.file_name {
            return name.clone();
        }
        let ext = ImageFormat::from_mime_type(&self.mime_type)
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("bin");
        format!("image.{ext}")
    }
}

impl fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBlob")
            .field("len", &self.data.len())
            .field("mime_type", &self.mime_type)
            .field("file_name", &self.file_name)
            .finish()
    }
}

/// Guess a media type from magic bytes, then from the path extension.
pub fn sniff_mime(data: &[u8], path: Option<&Path>) -> String {
    if let Ok(fmt) = image::guess_format(data) {
        return fmt.to_mime_type().to_string();
    }
    path.and_then(|p| ImageFormat::from_path(p).ok())
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

/// Resolve a local path or HTTP/HTTPS URL to an [`ImageBlob`].
pub async fn resolve_image(input: &str, timeout_secs: u64) -> Result<ImageBlob, Img2MeshError> {
    if is_http_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<ImageBlob, Img2MeshError> {
    let path = PathBuf::from(path_str);

    let data = match tokio::fs::read(&path).await {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Img2MeshError::PermissionDenied { path });
        }
        Err(_) => return Err(Img2MeshError::FileNotFound { path }),
    };

    let mime = sniff_mime(&data, Some(path.as_path()));
    debug!("Read local image: {} ({} bytes, {})", path.display(), data.len(), mime);

    let mut blob = ImageBlob::new(data, mime);
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        blob = blob.with_file_name(name);
    }
    Ok(blob)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ImageBlob, Img2MeshError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Img2MeshError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Img2MeshError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Img2MeshError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(Img2MeshError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let header_mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| v.starts_with("image/"));
    let filename = extract_filename(url);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Img2MeshError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let mime = match image::guess_format(&bytes) {
        Ok(fmt) => fmt.to_mime_type().to_string(),
        Err(_) => header_mime
            .unwrap_or_else(|| sniff_mime(&bytes, filename.as_deref().map(Path::new))),
    };
    info!("Downloaded {} bytes ({})", bytes.len(), mime);

    let mut blob = ImageBlob::new(bytes.to_vec(), mime);
    if let Some(name) = filename {
        blob = blob.with_file_name(name);
    }
    Ok(blob)
}

/// Last path segment of the URL, when it looks like a file name.
fn extract_filename(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty() && last.contains('.')).then(|| last.to_string())
}
