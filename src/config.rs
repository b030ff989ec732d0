//! Configuration for image-to-3D conversion.
//!
//! All knobs live in [`ConversionConfig`], built via its
//! [`ConversionConfigBuilder`]. The stage arguments themselves (background
//! removal, sample steps, seed) are fixed constants in
//! [`crate::pipeline::stages`] and deliberately not configurable here.
//!
//! The library never reads the process environment: the access token is an
//! explicit field. The CLI is the only place that binds `HF_API_KEY`.

use crate::error::Img2MeshError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Default Space hosting the image-to-3D model.
pub const DEFAULT_SPACE: &str = "TencentARC/InstantMesh";

/// Default Hugging Face Hub base URL, used to resolve a Space id to its host.
pub const DEFAULT_HUB_URL: &str = "https://huggingface.co";

/// Configuration for a single conversion.
///
/// # Example
/// ```rust
/// use edgequake_img2mesh::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .space("TencentARC/InstantMesh")
///     .hf_token("hf_example")
///     .request_timeout_secs(600)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Space id (`owner/name`) or a direct `http(s)://` Gradio app URL.
    /// Default: [`DEFAULT_SPACE`].
    pub space: String,

    /// Hub base URL used for Space host resolution. Default: [`DEFAULT_HUB_URL`].
    pub hub_url: String,

    /// Optional bearer token. `None` means anonymous (rate-limited) access.
    pub hf_token: Option<String>,

    /// Transport timeout per HTTP request in seconds. Default: 300.
    ///
    /// Multi-view generation can take minutes on a busy Space; this is the
    /// only deadline the pipeline has.
    pub request_timeout_secs: u64,

    /// Download timeout for URL inputs and GLB downloads in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional observer for status and stage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            space: DEFAULT_SPACE.to_string(),
            hub_url: DEFAULT_HUB_URL.to_string(),
            hf_token: None,
            request_timeout_secs: 300,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("space", &self.space)
            .field("hub_url", &self.hub_url)
            .field("hf_token", &self.hf_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn space(mut self, space: impl Into<String>) -> Self {
        self.config.space = space.into();
        self
    }

    pub fn hub_url(mut self, url: impl Into<String>) -> Self {
        self.config.hub_url = url.into();
        self
    }

    /// Set the access token. Empty strings are treated as "no token".
    pub fn hf_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.config.hf_token = if token.trim().is_empty() {
            None
        } else {
            Some(token)
        };
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Img2MeshError> {
        let c = &self.config;
        if c.space.trim().is_empty() {
            return Err(Img2MeshError::InvalidConfig(
                "Space id must not be empty".into(),
            ));
        }
        if !is_http_url(&c.space) && !c.space.contains('/') {
            return Err(Img2MeshError::InvalidConfig(format!(
                "Space must be 'owner/name' or an http(s) URL, got '{}'",
                c.space
            )));
        }
        if !is_http_url(&c.hub_url) {
            return Err(Img2MeshError::InvalidConfig(format!(
                "Hub URL must start with http:// or https://, got '{}'",
                c.hub_url
            )));
        }
        if c.request_timeout_secs == 0 || c.download_timeout_secs == 0 {
            return Err(Img2MeshError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

pub(crate) fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}
