//! Output types returned by a successful conversion.

use crate::pipeline::stages::Stage;
use serde::{Deserialize, Serialize};

/// The result of one successful conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// GLB URL with the `?t=<millis>` cache-busting parameter appended.
    /// This is the value viewers should load.
    pub url: String,

    /// The GLB URL exactly as the reconstruction stage returned it.
    pub glb_url: String,

    /// Unix time in milliseconds at completion (the `t` parameter value).
    pub completed_at_ms: u64,

    /// Timing for each stage, in execution order.
    pub stages: Vec<StageReport>,

    /// Wall-clock time for the whole invocation, connection included.
    pub total_duration_ms: u64,
}

/// Timing for one completed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub endpoint: String,
    pub duration_ms: u64,
}
