//! Pipeline building blocks for image-to-3D conversion.
//!
//! Each submodule owns one concern, so the orchestrator in
//! [`crate::convert`] reads as a straight list of steps and the transport can
//! be swapped for a test double.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ remote::connect ──▶ stages (×4) ──▶ postprocess
//! (path/URL) (Gradio session)   (queue calls)   (GLB url + ?t=)
//! ```
//!
//! 1. [`input`]       — turn a path or URL into an [`input::ImageBlob`]
//! 2. [`stages`]      — the fixed stage table: endpoint names and arguments
//! 3. [`remote`]      — object-safe service/session traits the orchestrator drives
//! 4. [`gradio`]      — the real transport: Gradio queue protocol over reqwest
//! 5. [`postprocess`] — pick the GLB URL and append the cache-busting parameter

pub mod gradio;
pub mod input;
pub mod postprocess;
pub mod remote;
pub mod stages;
