//! CLI binary for edgequake-img2mesh.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints the resulting asset URL.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_img2mesh::{
    convert_file, convert_to_file, ConnectionStatus, ConversionConfig, ConversionProgressCallback,
    ProgressCallback, Stage, DEFAULT_HUB_URL, DEFAULT_SPACE,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal callback: one spinner whose message follows the current stage,
/// plus a log line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Connecting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_status(&self, status: &ConnectionStatus) {
        match status {
            ConnectionStatus::Connected { host } => {
                self.bar
                    .println(format!("  {} Connected  {}", green("✓"), dim(host)));
            }
            ConnectionStatus::Failed { .. } => {}
            other => self.bar.set_message(other.to_string()),
        }
    }

    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix(stage.label());
        self.bar.set_message(String::new());
    }

    fn on_stage_complete(&self, stage: Stage, duration_ms: u64) {
        self.bar.println(format!(
            "  {} {:<30}  {}",
            green("✓"),
            stage.label(),
            dim(&format!("{:.1}s", duration_ms as f64 / 1000.0)),
        ));
    }

    fn on_conversion_complete(&self, _url: &str) {
        self.bar.finish_and_clear();
    }

    // The error itself is reported once, by `main`'s `anyhow` report.
    fn on_conversion_error(&self, _message: &str) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Print a viewer-ready GLB URL
  img2mesh chair.png

  # Save the GLB locally
  img2mesh chair.png -o chair.glb

  # Image from a URL, JSON output with per-stage timings
  img2mesh https://example.com/chair.png --json

  # Authenticated access (higher rate limits)
  HF_API_KEY=hf_... img2mesh chair.png

  # A self-hosted copy of the Space
  img2mesh --space http://127.0.0.1:7860 chair.png

ENVIRONMENT VARIABLES:
  HF_API_KEY              Hugging Face access token (optional)
  IMG2MESH_SPACE          Space id or Gradio app URL
  IMG2MESH_TIMEOUT        Per-request transport timeout in seconds
"#;

/// Turn an image into a GLB 3D model using a hosted image-to-3D Space.
#[derive(Parser, Debug)]
#[command(
    name = "img2mesh",
    version,
    about = "Turn an image into a GLB 3D model using a hosted image-to-3D Space",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local image path or HTTP/HTTPS URL.
    input: String,

    /// Download the generated GLB to this file.
    #[arg(short, long, env = "IMG2MESH_OUTPUT")]
    output: Option<PathBuf>,

    /// Space id (owner/name) or a direct Gradio app URL.
    #[arg(long, env = "IMG2MESH_SPACE", default_value = DEFAULT_SPACE)]
    space: String,

    /// Hugging Face Hub base URL used to resolve Space hosts.
    #[arg(long, env = "IMG2MESH_HUB_URL", default_value = DEFAULT_HUB_URL)]
    hub_url: String,

    /// Hugging Face access token. Anonymous access when unset.
    #[arg(long, env = "HF_API_KEY", hide_env_values = true)]
    hf_token: Option<String>,

    /// Per-request transport timeout in seconds.
    #[arg(long, env = "IMG2MESH_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// HTTP download timeout in seconds (image URLs and GLB downloads).
    #[arg(long, env = "IMG2MESH_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output structured JSON (ConversionOutput) instead of the bare URL.
    #[arg(long, env = "IMG2MESH_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "IMG2MESH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMG2MESH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "IMG2MESH_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs; verbose mode always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let output = match cli.output {
        Some(ref path) => convert_to_file(&cli.input, path, &config)
            .await
            .context("Conversion failed")?,
        None => convert_file(&cli.input, &config)
            .await
            .context("Conversion failed")?,
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        println!("{}", output.url);
    }

    if !cli.quiet && !cli.json {
        let saved = cli
            .output
            .as_ref()
            .map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default();
        eprintln!(
            "{} 3D model ready in {}{}",
            if show_progress { cyan("◆") } else { green("✔") },
            dim(&format!("{:.1}s", output.total_duration_ms as f64 / 1000.0)),
            saved,
        );
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .space(cli.space.clone())
        .hub_url(cli.hub_url.clone())
        .request_timeout_secs(cli.timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref token) = cli.hf_token {
        builder = builder.hf_token(token.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
