//! Error types for the edgequake-img2mesh library.
//!
//! Two error types cover two layers:
//!
//! * [`TransportError`]: **raw** failure text from the remote service or the
//!   HTTP layer underneath it. Produced by [`crate::pipeline::remote`]
//!   implementations and never shown to end users directly.
//!
//! * [`Img2MeshError`]: **classified** failure returned from the top-level
//!   `convert*` functions. Its `Display` output is the human-readable message
//!   a UI can show as-is.
//!
//! Classification happens exactly once, in [`classify`], at the single
//! failure boundary that wraps the connection and all four stage calls.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-img2mesh library.
///
/// The first seven variants form the conversion taxonomy. The remaining ones
/// only come from input resolution, asset download or configuration, which
/// happen outside the remote pipeline.
#[derive(Debug, Error)]
pub enum Img2MeshError {
    // ── Conversion taxonomy ───────────────────────────────────────────────
    /// No image was supplied, or the image has no bytes.
    #[error("No file uploaded")]
    MissingInput,

    /// A remote call exceeded the transport timeout.
    #[error("The model processing timed out. Try with a simpler image or try again later.")]
    Timeout { detail: String },

    /// The Space rejected the credential (403).
    #[error("Authentication failed. Please check your API key.")]
    AuthFailure { detail: String },

    /// The Space is throttling requests (429).
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited { detail: String },

    /// The Space queue is full or backed up.
    #[error("The service is currently busy. Please try again in a few minutes.")]
    ServiceBusy { detail: String },

    /// Every stage completed but the reconstruction output had no GLB URL.
    #[error("Failed to retrieve the GLB model URL.")]
    AssetMissing,

    /// Any other remote failure.
    #[error("Failed to process the image. Please try again.")]
    Unknown { detail: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but the download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output GLB file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Img2MeshError {
    /// The raw transport text behind a classified remote failure, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Img2MeshError::Timeout { detail }
            | Img2MeshError::AuthFailure { detail }
            | Img2MeshError::RateLimited { detail }
            | Img2MeshError::ServiceBusy { detail }
            | Img2MeshError::Unknown { detail } => Some(detail),
            _ => None,
        }
    }
}

/// Raw failure from the remote service or the HTTP transport.
///
/// Only the message text matters downstream: [`classify`] inspects it for
/// known substrings. `status` and `url` are informational and never part of
/// the message, so request paths and random query ids cannot trip the
/// classifier.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub status: Option<u16>,
    pub url: Option<String>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            url: None,
        }
    }

    /// Record the request URL alongside the message.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// An HTTP failure, rendered as `HTTP <code> <reason>: <body>`.
    pub fn http(status: reqwest::StatusCode, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        };
        Self {
            message,
            status: Some(status.as_u16()),
            url: None,
        }
    }

    /// Wrap a reqwest error, making timeouts recognisable by their text.
    ///
    /// The URL is moved out of the error text into [`TransportError::url`].
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        let url = err.url().map(|u| u.to_string());
        let status = err.status().map(|s| s.as_u16());
        let timed_out = err.is_timeout();
        let err = err.without_url();
        let message = if timed_out {
            format!("request timeout after {timeout_secs}s: {err}")
        } else {
            err.to_string()
        };
        Self {
            message,
            status,
            url,
        }
    }
}

/// Map a transport failure onto the conversion taxonomy.
///
/// Case-sensitive substring matching, first hit wins:
/// `timeout` → `403` → `429` → `queue` → unknown.
pub fn classify(err: &TransportError) -> Img2MeshError {
    let msg = err.message.as_str();
    let detail = msg.to_string();
    if msg.contains("timeout") {
        Img2MeshError::Timeout { detail }
    } else if msg.contains("403") {
        Img2MeshError::AuthFailure { detail }
    } else if msg.contains("429") {
        Img2MeshError::RateLimited { detail }
    } else if msg.contains("queue") {
        Img2MeshError::ServiceBusy { detail }
    } else {
        Img2MeshError::Unknown { detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_rate_limit() {
        let e = classify(&TransportError::new("HTTP 429 Too Many Requests"));
        assert!(matches!(e, Img2MeshError::RateLimited { .. }));
        assert_eq!(e.to_string(), "Rate limit exceeded. Please try again later.");
    }

    #[test]
    fn classify_auth_failure() {
        let e = classify(&TransportError::new("HTTP 403 Forbidden: invalid token"));
        assert!(matches!(e, Img2MeshError::AuthFailure { .. }));
        assert_eq!(e.detail(), Some("HTTP 403 Forbidden: invalid token"));
    }

    #[test]
    fn classify_queue_full() {
        let e = classify(&TransportError::new("queue full"));
        assert!(matches!(e, Img2MeshError::ServiceBusy { .. }));
    }

    #[test]
    fn timeout_wins_over_status_codes() {
        // A message carrying several signals is classified by the first rule.
        let e = classify(&TransportError::new("request timeout after 30s (last status 429)"));
        assert!(matches!(e, Img2MeshError::Timeout { .. }));
    }

    #[test]
    fn classification_is_case_sensitive() {
        let e = classify(&TransportError::new("Gateway Timeout"));
        assert!(matches!(e, Img2MeshError::Unknown { .. }));
        assert_eq!(e.to_string(), "Failed to process the image. Please try again.");
    }

    #[test]
    fn http_error_text_carries_status() {
        let e = TransportError::http(reqwest::StatusCode::FORBIDDEN, "  ");
        assert_eq!(e.message, "HTTP 403 Forbidden");
        assert_eq!(e.status, Some(403));
    }

    #[test]
    fn url_is_kept_out_of_classified_text() {
        let e = TransportError::new("malformed response: error decoding response body")
            .with_url("http://127.0.0.1:7860/queue/join?upload_id=4290403");
        assert!(matches!(classify(&e), Img2MeshError::Unknown { .. }));
        assert_eq!(e.to_string(), "malformed response: error decoding response body");
    }

    #[test]
    fn missing_input_display() {
        assert_eq!(Img2MeshError::MissingInput.to_string(), "No file uploaded");
        assert!(Img2MeshError::MissingInput.detail().is_none());
    }
}
