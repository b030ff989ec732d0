//! Observer trait for connection-status and per-stage events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator moves through the pipeline. Events are purely
//! observational: nothing the callback does changes control flow.
//!
//! # Example
//!
//! ```rust
//! use edgequake_img2mesh::{ConnectionStatus, ConversionConfig, ConversionProgressCallback};
//! use std::sync::Arc;
//!
//! struct LogStatus;
//!
//! impl ConversionProgressCallback for LogStatus {
//!     fn on_status(&self, status: &ConnectionStatus) {
//!         eprintln!("connection status: {status}");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(LogStatus) as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::stages::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Connection-level status reported while a session is established and used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Resolving the Space host and fetching its config.
    Connecting { space: String },
    /// Session established against `host`.
    Connected { host: String },
    /// A stage request is waiting in the remote queue.
    Queued {
        position: Option<u64>,
        queue_size: Option<u64>,
    },
    /// The remote worker picked the request up.
    Processing,
    /// The connection attempt failed.
    Failed { message: String },
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting { space } => write!(f, "connecting to {space}"),
            ConnectionStatus::Connected { host } => write!(f, "connected to {host}"),
            ConnectionStatus::Queued {
                position: Some(p), ..
            } => write!(f, "queued at position {p}"),
            ConnectionStatus::Queued { .. } => write!(f, "queued"),
            ConnectionStatus::Processing => write!(f, "processing"),
            ConnectionStatus::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

/// Called by the orchestrator as the conversion progresses.
///
/// Implementations must be `Send + Sync`. All methods have default no-op
/// implementations so callers only override what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Connection status changed.
    fn on_status(&self, status: &ConnectionStatus) {
        let _ = status;
    }

    /// A stage request is about to be sent.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// A stage returned successfully after `duration_ms`.
    fn on_stage_complete(&self, stage: Stage, duration_ms: u64) {
        let _ = (stage, duration_ms);
    }

    /// The whole pipeline finished with the cache-busted asset URL.
    fn on_conversion_complete(&self, url: &str) {
        let _ = url;
    }

    /// The pipeline was aborted with a classified, human-readable error.
    fn on_conversion_error(&self, message: &str) {
        let _ = message;
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
