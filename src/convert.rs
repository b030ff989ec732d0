//! Conversion entry points and the orchestrator itself.
//!
//! [`convert_with_service`] is the core: one session, four stage calls in
//! fixed order, one outcome. Everything else here is a convenience wrapper
//! that builds the real [`GradioService`], resolves inputs, or writes the
//! resulting GLB to disk.

use crate::config::ConversionConfig;
use crate::error::{classify, Img2MeshError, TransportError};
use crate::output::{ConversionOutput, StageReport};
use crate::pipeline::gradio::GradioService;
use crate::pipeline::input::{self, ImageBlob};
use crate::pipeline::postprocess::{cache_bust, extract_glb_url, unix_millis};
use crate::pipeline::remote::{InferenceService, StageResult};
use crate::pipeline::stages::Stage;
use crate::progress::{ConversionProgressCallback, NoopProgressCallback};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Convert an image into a GLB asset URL using the Space named in `config`.
///
/// # Errors
/// `MissingInput` when `image` is `None` or empty (no network I/O happens);
/// otherwise one of the classified remote failures or `AssetMissing`.
pub async fn convert(
    image: Option<&ImageBlob>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Img2MeshError> {
    if image.is_none_or(ImageBlob::is_empty) {
        return Err(Img2MeshError::MissingInput);
    }
    let service = GradioService::new(config)?;
    convert_with_service(&service, image, config).await
}

/// Run the conversion pipeline against any [`InferenceService`].
///
/// ```text
/// connect ─▶ /check_input_image ─▶ /preprocess ─▶ /generate_mvs ─▶ /make3d ─▶ GLB ?t=
/// ```
///
/// Stages run strictly in sequence; none is skipped or retried. The
/// validation result is logged but never gates later stages. Any transport
/// failure, including during connect, aborts the remaining stages and is
/// classified once.
pub async fn convert_with_service(
    service: &dyn InferenceService,
    image: Option<&ImageBlob>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Img2MeshError> {
    let image = match image {
        Some(img) if !img.is_empty() => img,
        _ => return Err(Img2MeshError::MissingInput),
    };

    let noop = NoopProgressCallback;
    let observer: &dyn ConversionProgressCallback = match config.progress_callback {
        Some(ref cb) => cb.as_ref(),
        None => &noop,
    };

    let start_ms = unix_millis();
    let total_start = Instant::now();
    info!(
        "Starting conversion: {} bytes ({})",
        image.len(),
        image.mime_type()
    );

    let result = match run_stages(service, image, config, observer).await {
        Ok(r) => r,
        Err(e) => {
            error!("Remote conversion failed: {}", e);
            let classified = classify(&e);
            observer.on_conversion_error(&classified.to_string());
            return Err(classified);
        }
    };
    let (reconstruction, stages) = result;

    let Some(glb_url) = extract_glb_url(&reconstruction) else {
        error!("Reconstruction returned no GLB URL: {:?}", reconstruction.data);
        let e = Img2MeshError::AssetMissing;
        observer.on_conversion_error(&e.to_string());
        return Err(e);
    };

    let completed_at_ms = unix_millis().max(start_ms);
    let url = cache_bust(&glb_url, completed_at_ms);
    let total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!("3D model generated in {}ms: {}", total_duration_ms, url);
    observer.on_conversion_complete(&url);

    Ok(ConversionOutput {
        url,
        glb_url,
        completed_at_ms,
        stages,
        total_duration_ms,
    })
}

/// The failure boundary: connect plus all four stages.
async fn run_stages(
    service: &dyn InferenceService,
    image: &ImageBlob,
    config: &ConversionConfig,
    observer: &dyn ConversionProgressCallback,
) -> Result<(StageResult, Vec<StageReport>), TransportError> {
    let mut session = service
        .connect(config.hf_token.as_deref(), observer)
        .await?;

    let mut reports = Vec::with_capacity(Stage::ORDER.len());
    let mut last = StageResult::default();
    for stage in Stage::ORDER {
        info!("{}...", stage.label());
        observer.on_stage_start(stage);
        let stage_start = Instant::now();

        last = session
            .predict(stage.endpoint(), stage.args(image), observer)
            .await?;

        let duration_ms = stage_start.elapsed().as_millis() as u64;
        debug!("{} result: {:?}", stage.endpoint(), last.data);
        info!("{} complete in {}ms", stage.endpoint(), duration_ms);
        observer.on_stage_complete(stage, duration_ms);
        reports.push(StageReport {
            stage,
            endpoint: stage.endpoint().to_string(),
            duration_ms,
        });
    }

    Ok((last, reports))
}

/// Resolve a local path or URL into an image, then convert it.
pub async fn convert_file(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Img2MeshError> {
    let image = input::resolve_image(input_str.as_ref(), config.download_timeout_secs).await?;
    convert(Some(&image), config).await
}

/// Convert an image file or URL and write the resulting GLB to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Img2MeshError> {
    let output = convert_file(input_str, config).await?;
    download_asset(&output.url, output_path, config.download_timeout_secs).await?;
    Ok(output)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    image: Option<&ImageBlob>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Img2MeshError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Img2MeshError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(image, config))
}

/// Download an asset URL to `path`, writing atomically. Returns the byte count.
pub async fn download_asset(
    url: &str,
    path: impl AsRef<Path>,
    timeout_secs: u64,
) -> Result<u64, Img2MeshError> {
    let path = path.as_ref();
    let download_err = |reason: String| Img2MeshError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| download_err(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Img2MeshError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            download_err(e.to_string())
        }
    })?;
    if !response.status().is_success() {
        return Err(download_err(format!("HTTP {}", response.status())));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| download_err(e.to_string()))?;

    write_atomic(path, &bytes).await?;

    info!("Saved {} bytes to {}", bytes.len(), path.display());
    Ok(bytes.len() as u64)
}

/// Write through a sibling `*.glb.tmp` file, then rename into place.
/// The temp file is removed again if either step fails.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Img2MeshError> {
    let write_err = |e: std::io::Error| Img2MeshError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("glb.tmp");
    let written = match tokio::fs::write(&tmp_path, bytes).await {
        Ok(()) => tokio::fs::rename(&tmp_path, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
            debug!("Could not remove {}: {}", tmp_path.display(), cleanup);
        }
        return Err(write_err(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/chair.glb");

        write_atomic(&path, b"old").await.unwrap();
        write_atomic(&path, b"glTF").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"glTF");
        assert!(!dir.path().join("nested/chair.glb.tmp").exists());
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the target path makes the rename fail.
        let path = dir.path().join("chair.glb");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let err = write_atomic(&path, b"glTF").await.unwrap_err();

        assert!(matches!(err, Img2MeshError::OutputWriteFailed { .. }));
        assert!(!dir.path().join("chair.glb.tmp").exists());
        assert!(path.join("keep").exists());
    }

    #[tokio::test]
    async fn failed_download_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chair.glb");

        let err = download_asset("http://127.0.0.1:9/chair.glb", &path, 2)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Img2MeshError::DownloadFailed { .. } | Img2MeshError::DownloadTimeout { .. }
        ));
        assert!(!path.exists());
        assert!(!dir.path().join("chair.glb.tmp").exists());
    }
}
