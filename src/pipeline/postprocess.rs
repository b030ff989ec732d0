//! Final-stage post-processing: pick the GLB URL and cache-bust it.
//!
//! The reconstruction stage answers with two assets, `[generic, glb]`. Only
//! the GLB one is used because browser viewers load GLB. Each element is
//! either a plain URL string or a Gradio `FileData` object with a `url`.

use crate::pipeline::remote::StageResult;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Position of the GLB asset in the reconstruction output.
pub const GLB_INDEX: usize = 1;

/// Extract the GLB URL, or `None` when the element is absent, null or empty.
pub fn extract_glb_url(result: &StageResult) -> Option<String> {
    let url = match result.get(GLB_INDEX)? {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("url").and_then(Value::as_str)?,
        _ => return None,
    };
    let url = url.trim();
    (!url.is_empty()).then(|| url.to_string())
}

/// Append `?t=<millis>` so loaders and intermediate caches fetch fresh bytes.
///
/// The parameter is appended verbatim, even if `url` already carries a query.
pub fn cache_bust(url: &str, millis: u64) -> String {
    format!("{url}?t={millis}")
}

/// Current Unix time in milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
