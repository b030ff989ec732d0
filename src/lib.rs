//! # edgequake-img2mesh
//!
//! Turn a single image into a GLB 3D asset through a hosted image-to-3D
//! Gradio Space (`TencentARC/InstantMesh` by default).
//!
//! ## Pipeline Overview
//!
//! ```text
//! image
//!  │
//!  ├─ 0. Input      local file or URL → ImageBlob (bytes + media type)
//!  ├─ 1. Connect    one Gradio session per invocation (optional HF token)
//!  ├─ 2. Validate   /check_input_image   (result logged, never gates)
//!  ├─ 3. Preprocess /preprocess          (background removal on)
//!  ├─ 4. Views      /generate_mvs        (50 steps, seed 42)
//!  ├─ 5. Mesh       /make3d              → [obj, glb]
//!  └─ 6. Output     glb url + ?t=<unix millis>
//! ```
//!
//! Stages are strictly sequential and never retried. Failures are mapped to a
//! small set of user-facing messages; see [`Img2MeshError`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_img2mesh::{convert_file, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .hf_token(std::env::var("HF_API_KEY").unwrap_or_default())
//!         .build()?;
//!     let output = convert_file("chair.png", &config).await?;
//!     println!("{}", output.url);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `img2mesh` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, DEFAULT_HUB_URL, DEFAULT_SPACE};
pub use convert::{
    convert, convert_file, convert_sync, convert_to_file, convert_with_service, download_asset,
};
pub use error::{classify, Img2MeshError, TransportError};
pub use output::{ConversionOutput, StageReport};
pub use pipeline::gradio::GradioService;
pub use pipeline::input::ImageBlob;
pub use pipeline::remote::{InferenceService, RemoteSession, StageArg, StageResult};
pub use pipeline::stages::Stage;
pub use progress::{
    ConnectionStatus, ConversionProgressCallback, NoopProgressCallback, ProgressCallback,
};
