//! Seams between the orchestrator and the remote inference service.
//!
//! [`InferenceService`] opens a session; [`RemoteSession`] runs named stage
//! calls on it. Both are object-safe via `async_trait` so the orchestrator can
//! take `&dyn InferenceService` and tests can substitute a scripted double.

use crate::error::TransportError;
use crate::pipeline::input::ImageBlob;
use crate::progress::ConversionProgressCallback;
use async_trait::async_trait;
use serde_json::Value;

/// One positional argument of a stage call.
#[derive(Debug, Clone, PartialEq)]
pub enum StageArg {
    Image(ImageBlob),
    Bool(bool),
    Int(i64),
}

impl StageArg {
    /// JSON form for non-file arguments. Images need an upload first and
    /// return `None`.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            StageArg::Image(_) => None,
            StageArg::Bool(b) => Some(Value::Bool(*b)),
            StageArg::Int(n) => Some(Value::from(*n)),
        }
    }
}

/// Opaque payload returned by one stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageResult {
    pub data: Vec<Value>,
}

impl StageResult {
    pub fn new(data: Vec<Value>) -> Self {
        Self { data }
    }

    /// Element `index`, treating JSON `null` as absent.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.data.get(index).filter(|v| !v.is_null())
    }
}

/// A remote service able to open sessions.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Open a new session, authenticated with `credential` when present.
    ///
    /// Connection-status changes are reported to `observer`.
    async fn connect(
        &self,
        credential: Option<&str>,
        observer: &dyn ConversionProgressCallback,
    ) -> Result<Box<dyn RemoteSession>, TransportError>;
}

/// One established session. Stage calls share server-side state through it.
#[async_trait]
pub trait RemoteSession: Send {
    /// Invoke `endpoint` (e.g. `/preprocess`) with positional `args`.
    async fn predict(
        &mut self,
        endpoint: &str,
        args: Vec<StageArg>,
        observer: &dyn ConversionProgressCallback,
    ) -> Result<StageResult, TransportError>;
}
