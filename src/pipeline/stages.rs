//! The fixed four-stage remote pipeline.
//!
//! The order and argument shapes are a contract owned by the remote Space:
//!
//! | # | Endpoint | Arguments |
//! |---|----------|-----------|
//! | 1 | `/check_input_image` | image |
//! | 2 | `/preprocess` | image, remove background (`true`) |
//! | 3 | `/generate_mvs` | image, sample steps (`50`), seed (`42`) |
//! | 4 | `/make3d` | none; works on server-side session state |

use crate::pipeline::input::ImageBlob;
use crate::pipeline::remote::StageArg;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Background removal flag sent to `/preprocess`.
pub const REMOVE_BACKGROUND: bool = true;

/// Diffusion sample steps for `/generate_mvs` (the "medium" quality level).
pub const SAMPLE_STEPS: i64 = 50;

/// Seed for `/generate_mvs`; fixed so repeated runs on one image are reproducible.
pub const SEED: i64 = 42;

/// One remote stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CheckInput,
    Preprocess,
    GenerateViews,
    Reconstruct,
}

impl Stage {
    /// All stages in execution order.
    pub const ORDER: [Stage; 4] = [
        Stage::CheckInput,
        Stage::Preprocess,
        Stage::GenerateViews,
        Stage::Reconstruct,
    ];

    /// The Gradio endpoint name, with leading slash.
    pub fn endpoint(self) -> &'static str {
        match self {
            Stage::CheckInput => "/check_input_image",
            Stage::Preprocess => "/preprocess",
            Stage::GenerateViews => "/generate_mvs",
            Stage::Reconstruct => "/make3d",
        }
    }

    /// Short human label, used in logs and the CLI spinner.
    pub fn label(self) -> &'static str {
        match self {
            Stage::CheckInput => "Checking image",
            Stage::Preprocess => "Preprocessing image",
            Stage::GenerateViews => "Generating multi-view images",
            Stage::Reconstruct => "Creating 3D model",
        }
    }

    /// Build the argument list this stage is always called with.
    pub fn args(self, image: &ImageBlob) -> Vec<StageArg> {
        match self {
            Stage::CheckInput => vec![StageArg::Image(image.clone())],
            Stage::Preprocess => vec![
                StageArg::Image(image.clone()),
                StageArg::Bool(REMOVE_BACKGROUND),
            ],
            Stage::GenerateViews => vec![
                StageArg::Image(image.clone()),
                StageArg::Int(SAMPLE_STEPS),
                StageArg::Int(SEED),
            ],
            Stage::Reconstruct => Vec::new(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}
