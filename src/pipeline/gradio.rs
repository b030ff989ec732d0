//! Gradio queue client: the real transport behind [`InferenceService`].
//!
//! ## Protocol
//!
//! ```text
//! GET  {hub}/api/spaces/{owner}/{name}/host    → {"host": "https://….hf.space"}
//! GET  {host}/config                           → api_prefix + dependencies[api_name]
//! POST {root}/upload                           → ["/tmp/gradio/…/image.png"]   (per image arg)
//! POST {root}/queue/join                       → {"event_id": "…"}
//! GET  {root}/queue/data?session_hash=…        → text/event-stream of JSON messages
//! ```
//!
//! `root` is `host + api_prefix`. Every call in one session shares a
//! `session_hash`, which is how `/make3d` finds the state left behind by the
//! earlier stages.
//!
//! Failures are reported as [`TransportError`] text that keeps the signals
//! the classifier looks for: `HTTP 403 …`, `HTTP 429 …`, `request timeout …`,
//! `queue full`.

use crate::config::{is_http_url, ConversionConfig};
use crate::error::{Img2MeshError, TransportError};
use crate::pipeline::input::ImageBlob;
use crate::pipeline::remote::{InferenceService, RemoteSession, StageArg, StageResult};
use crate::progress::{ConnectionStatus, ConversionProgressCallback};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, multipart, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// [`InferenceService`] backed by a hosted Gradio app.
#[derive(Debug, Clone)]
pub struct GradioService {
    client: Client,
    space: String,
    hub_url: String,
    timeout_secs: u64,
}

impl GradioService {
    /// Build a service from the conversion config. No network I/O happens here.
    pub fn new(config: &ConversionConfig) -> Result<Self, Img2MeshError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("edgequake-img2mesh/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Img2MeshError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            space: config.space.clone(),
            hub_url: config.hub_url.trim_end_matches('/').to_string(),
            timeout_secs: config.request_timeout_secs,
        })
    }

    async fn resolve_host(&self, token: Option<&str>) -> Result<String, TransportError> {
        if is_http_url(&self.space) {
            return Ok(self.space.trim_end_matches('/').to_string());
        }
        let url = format!("{}/api/spaces/{}/host", self.hub_url, self.space);
        let info: HostInfo = self
            .fetch_json(authorized(self.client.get(&url), token), &url)
            .await?;
        Ok(info.host.trim_end_matches('/').to_string())
    }

    async fn open(&self, token: Option<&str>) -> Result<GradioSession, TransportError> {
        let host = self.resolve_host(token).await?;
        let config_url = format!("{host}/config");
        let app: AppConfig = self
            .fetch_json(authorized(self.client.get(&config_url), token), &config_url)
            .await?;

        let prefix = app.api_prefix.as_deref().unwrap_or("").trim_end_matches('/');
        let endpoints = endpoint_map(&app);
        debug!(
            "Space config: gradio {}, {} named endpoints",
            app.version.as_deref().unwrap_or("?"),
            endpoints.len()
        );

        Ok(GradioSession {
            client: self.client.clone(),
            host,
            root_prefix: prefix.to_string(),
            token: token.map(str::to_string),
            session_hash: Uuid::new_v4().simple().to_string(),
            endpoints,
            timeout_secs: self.timeout_secs,
        })
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        url: &str,
    ) -> Result<T, TransportError> {
        send_json(req, url, self.timeout_secs).await
    }
}

#[async_trait]
impl InferenceService for GradioService {
    async fn connect(
        &self,
        credential: Option<&str>,
        observer: &dyn ConversionProgressCallback,
    ) -> Result<Box<dyn RemoteSession>, TransportError> {
        observer.on_status(&ConnectionStatus::Connecting {
            space: self.space.clone(),
        });
        match self.open(credential).await {
            Ok(session) => {
                info!("Connected to {} ({})", self.space, session.host);
                observer.on_status(&ConnectionStatus::Connected {
                    host: session.host.clone(),
                });
                Ok(Box::new(session))
            }
            Err(e) => {
                observer.on_status(&ConnectionStatus::Failed {
                    message: e.message.clone(),
                });
                Err(e)
            }
        }
    }
}

/// One Gradio session: a fixed `session_hash` against one host.
pub struct GradioSession {
    client: Client,
    host: String,
    root_prefix: String,
    token: Option<String>,
    session_hash: String,
    endpoints: HashMap<String, usize>,
    timeout_secs: u64,
}

impl GradioSession {
    fn root(&self) -> String {
        format!("{}{}", self.host, self.root_prefix)
    }

    fn request(&self, req: RequestBuilder) -> RequestBuilder {
        authorized(req, self.token.as_deref())
    }

    fn fn_index(&self, endpoint: &str) -> Result<usize, TransportError> {
        let name = endpoint.trim_start_matches('/');
        self.endpoints.get(name).copied().ok_or_else(|| {
            TransportError::new(format!("endpoint {endpoint} is not exposed by this Space"))
        })
    }

    /// Upload an image and return the `FileData` object that references it.
    async fn upload(&self, blob: &ImageBlob) -> Result<Value, TransportError> {
        let file_name = blob.file_name();
        let part = multipart::Part::bytes(blob.data().to_vec())
            .file_name(file_name.clone())
            .mime_str(blob.mime_type())
            .map_err(|e| TransportError::new(format!("invalid media type: {e}")))?;
        let form = multipart::Form::new().part("files", part);

        let url = format!("{}/upload?upload_id={}", self.root(), Uuid::new_v4().simple());
        let paths: Vec<String> =
            send_json(self.request(self.client.post(&url)).multipart(form), &url, self.timeout_secs)
                .await?;
        let path = paths
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::new("upload returned no file path"))?;
        debug!("Uploaded {} bytes as {}", blob.len(), path);

        Ok(json!({
            "path": path,
            "orig_name": file_name,
            "mime_type": blob.mime_type(),
            "size": blob.len(),
            "meta": { "_type": "gradio.FileData" },
        }))
    }

    async fn join(&self, fn_index: usize, data: Vec<Value>) -> Result<String, TransportError> {
        let url = format!("{}/queue/join", self.root());
        let body = json!({
            "data": data,
            "fn_index": fn_index,
            "session_hash": self.session_hash,
            "event_data": null,
            "trigger_id": null,
        });
        let joined: JoinResponse =
            send_json(self.request(self.client.post(&url)).json(&body), &url, self.timeout_secs)
                .await?;
        Ok(joined.event_id)
    }

    /// Follow the session's event stream until `event_id` completes.
    async fn await_result(
        &self,
        event_id: &str,
        observer: &dyn ConversionProgressCallback,
    ) -> Result<StageResult, TransportError> {
        let url = format!("{}/queue/data", self.root());
        let req = self
            .request(self.client.get(&url))
            .query(&[("session_hash", self.session_hash.as_str())])
            .header(header::ACCEPT, "text/event-stream");
        let resp = req.send().await.map_err(|e| {
            debug!("Request to {url} failed: {e}");
            TransportError::from_reqwest(e, self.timeout_secs)
        })?;
        let resp = check_status(resp).await?;

        let mut stream = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransportError::from_reqwest(e, self.timeout_secs))?;
            buf.extend_from_slice(&chunk);
            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                let Some(event) = parse_sse_line(line.trim_end()) else {
                    continue;
                };
                if let Some(mut result) = step(event, event_id, observer)? {
                    normalize_files(&mut result.data, &self.root());
                    return Ok(result);
                }
            }
        }
        Err(TransportError::new("event stream ended before the stage completed").with_url(url))
    }
}

#[async_trait]
impl RemoteSession for GradioSession {
    async fn predict(
        &mut self,
        endpoint: &str,
        args: Vec<StageArg>,
        observer: &dyn ConversionProgressCallback,
    ) -> Result<StageResult, TransportError> {
        let fn_index = self.fn_index(endpoint)?;

        let mut data = Vec::with_capacity(args.len());
        for arg in &args {
            match arg {
                StageArg::Image(blob) => data.push(self.upload(blob).await?),
                other => data.push(other.to_json().unwrap_or(Value::Null)),
            }
        }

        let event_id = self.join(fn_index, data).await?;
        debug!("{endpoint}: joined queue as event {event_id}");
        self.await_result(&event_id, observer).await
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct HostInfo {
    host: String,
}

#[derive(Debug, Default, Deserialize)]
struct AppConfig {
    #[serde(default)]
    api_prefix: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: Vec<Dependency>,
}

#[derive(Debug, Deserialize)]
struct Dependency {
    /// A string, or `false`/`null` for unnamed event handlers.
    #[serde(default)]
    api_name: Value,
    /// Present on newer Gradio releases; otherwise the list position is the index.
    #[serde(default)]
    id: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct JoinResponse {
    event_id: String,
}

/// One JSON message on the `/queue/data` event stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
enum QueueEvent {
    Estimation {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        rank: Option<u64>,
        #[serde(default)]
        queue_size: Option<u64>,
    },
    ProcessStarts {
        #[serde(default)]
        event_id: Option<String>,
    },
    QueueFull {
        #[serde(default)]
        event_id: Option<String>,
    },
    ProcessCompleted {
        #[serde(default)]
        event_id: Option<String>,
        #[serde(default)]
        success: bool,
        #[serde(default)]
        output: Value,
    },
    UnexpectedError {
        #[serde(default)]
        message: Option<String>,
    },
    CloseStream,
    #[serde(other)]
    Other,
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn authorized(req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(t) => req.bearer_auth(t),
        None => req,
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().to_string();
    let body = resp.text().await.unwrap_or_default();
    debug!("HTTP {status} from {url}");
    Err(TransportError::http(status, &body).with_url(url))
}

/// Send `req` and decode a JSON body. `url` is recorded on failures but
/// never written into the error message.
async fn send_json<T: DeserializeOwned>(
    req: RequestBuilder,
    url: &str,
    timeout_secs: u64,
) -> Result<T, TransportError> {
    let resp = req.send().await.map_err(|e| {
        debug!("Request to {url} failed: {e}");
        TransportError::from_reqwest(e, timeout_secs)
    })?;
    let resp = check_status(resp).await?;
    resp.json::<T>().await.map_err(|e| {
        debug!("Malformed response from {url}: {e}");
        TransportError::new(format!("malformed response: {}", e.without_url())).with_url(url)
    })
}

fn endpoint_map(app: &AppConfig) -> HashMap<String, usize> {
    app.dependencies
        .iter()
        .enumerate()
        .filter_map(|(i, dep)| {
            dep.api_name
                .as_str()
                .map(|name| (name.to_string(), dep.id.unwrap_or(i)))
        })
        .collect()
}

/// Parse one SSE line; only `data:` lines carrying valid JSON produce events.
fn parse_sse_line(line: &str) -> Option<QueueEvent> {
    let payload = line.strip_prefix("data:")?.trim_start();
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Ignoring unparseable queue message: {e}");
            None
        }
    }
}

/// Advance the wait for `ours` by one event. `Ok(Some)` means the stage is done.
fn step(
    event: QueueEvent,
    ours: &str,
    observer: &dyn ConversionProgressCallback,
) -> Result<Option<StageResult>, TransportError> {
    let is_ours = |id: &Option<String>| id.as_deref().is_none_or(|id| id == ours);
    match event {
        QueueEvent::Estimation {
            event_id,
            rank,
            queue_size,
        } if is_ours(&event_id) => {
            observer.on_status(&ConnectionStatus::Queued {
                position: rank,
                queue_size,
            });
            Ok(None)
        }
        QueueEvent::ProcessStarts { event_id } if is_ours(&event_id) => {
            observer.on_status(&ConnectionStatus::Processing);
            Ok(None)
        }
        QueueEvent::QueueFull { event_id } if is_ours(&event_id) => {
            Err(TransportError::new("queue full"))
        }
        QueueEvent::ProcessCompleted {
            event_id,
            success,
            output,
        } if is_ours(&event_id) => {
            if success {
                let data = match output.get("data") {
                    Some(Value::Array(items)) => items.clone(),
                    _ => Vec::new(),
                };
                Ok(Some(StageResult::new(data)))
            } else {
                let message = output
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("process failed on the remote worker");
                Err(TransportError::new(message))
            }
        }
        QueueEvent::UnexpectedError { message } => Err(TransportError::new(
            message.unwrap_or_else(|| "unexpected error from the Space".to_string()),
        )),
        QueueEvent::CloseStream => Err(TransportError::new(
            "event stream closed before the stage completed",
        )),
        _ => Ok(None),
    }
}

/// Give every `FileData` object that only has a server `path` a fetchable `url`.
fn normalize_files(values: &mut [Value], root: &str) {
    for value in values {
        match value {
            Value::Array(items) => normalize_files(items, root),
            Value::Object(map) => {
                let has_url = map.get("url").is_some_and(|u| u.is_string());
                if let (false, Some(path)) = (has_url, map.get("path").and_then(Value::as_str)) {
                    let url = format!("{root}/file={path}");
                    map.insert("url".to_string(), Value::String(url));
                }
            }
            _ => {}
        }
    }
}
