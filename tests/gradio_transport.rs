//! Gradio transport tests against a local fake Space.
//!
//! `FakeSpace` is a tiny HTTP/1.1 server on a `TcpListener`. It serves
//! `/config`, `/upload`, `/queue/join` and a chunked `/queue/data` event
//! stream under an `api_prefix`, and records every request it receives.

use edgequake_img2mesh::{
    classify, ConnectionStatus, ConversionConfig, ConversionProgressCallback, GradioService,
    Img2MeshError, ImageBlob, InferenceService, RemoteSession, StageArg,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const CONFIG: &str = r#"{
    "version": "4.36.1",
    "api_prefix": "/gradio_api",
    "dependencies": [
        {"api_name": "check_input_image"},
        {"api_name": false},
        {"api_name": "make3d"}
    ]
}"#;

const UPLOADED_PATH: &str = "/tmp/gradio/abc/chair.png";

/// The completion message is split mid-JSON across two writes.
const SSE_FIRST: &str = concat!(
    "data: {\"msg\":\"estimation\",\"event_id\":\"evt-1\",\"rank\":0,\"queue_size\":1}\n\n",
    "data: {\"msg\":\"process_starts\",\"event_id\":\"evt-1\"}\n\n",
    "data: {\"msg\":\"process_comp",
);
const SSE_SECOND: &str = concat!(
    "leted\",\"event_id\":\"evt-1\",\"success\":true,\"output\":{\"data\":[",
    "{\"path\":\"/tmp/gradio/out/mesh.obj\",\"url\":null},",
    "{\"path\":\"/tmp/gradio/out/mesh.glb\"}",
    "]}}\n\n",
);

#[derive(Debug, Clone)]
struct Recorded {
    request_line: String,
    authorization: Option<String>,
    body: Vec<u8>,
}

struct FakeSpace {
    base: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeSpace {
    /// Start the server; `join_reply` is the raw body returned by `/queue/join`.
    async fn start(join_reply: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let log = Arc::clone(&log);
                tokio::spawn(serve(stream, log, join_reply));
            }
        });

        Self { base, requests }
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn config(&self) -> ConversionConfig {
        ConversionConfig::builder()
            .space(self.base.clone())
            .request_timeout_secs(10)
            .build()
            .unwrap()
    }
}

async fn serve(mut stream: TcpStream, log: Arc<Mutex<Vec<Recorded>>>, join_reply: &'static str) {
    let Some(req) = read_request(&mut stream).await else {
        return;
    };
    log.lock().unwrap().push(req.clone());

    let path = req
        .request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string();

    if path == "/config" {
        respond(&mut stream, "200 OK", "application/json", CONFIG).await;
    } else if path.starts_with("/gradio_api/upload") {
        let body = format!(r#"["{UPLOADED_PATH}"]"#);
        respond(&mut stream, "200 OK", "application/json", &body).await;
    } else if path == "/gradio_api/queue/join" {
        let content_type = if join_reply.starts_with('{') {
            "application/json"
        } else {
            "text/html"
        };
        respond(&mut stream, "200 OK", content_type, join_reply).await;
    } else if path.starts_with("/gradio_api/queue/data") {
        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
        let _ = stream.write_all(head.as_bytes()).await;
        write_chunk(&mut stream, SSE_FIRST).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        write_chunk(&mut stream, SSE_SECOND).await;
        let _ = stream.write_all(b"0\r\n\r\n").await;
        let _ = stream.shutdown().await;
    } else {
        respond(&mut stream, "404 Not Found", "text/plain", "not found").await;
    }
}

async fn respond(stream: &mut TcpStream, status: &str, content_type: &str, body: &str) {
    let resp = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(resp.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn write_chunk(stream: &mut TcpStream, data: &str) {
    let framed = format!("{:x}\r\n{data}\r\n", data.len());
    let _ = stream.write_all(framed.as_bytes()).await;
    let _ = stream.flush().await;
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn read_request(stream: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let header = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };

    let mut body = buf[head_end..].to_vec();
    if let Some(len) = header("content-length").and_then(|v| v.parse::<usize>().ok()) {
        while body.len() < len {
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        body.truncate(len);
    } else if header("transfer-encoding").is_some_and(|v| v.contains("chunked")) {
        while find(&body, b"0\r\n\r\n").is_none() {
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
    }

    Some(Recorded {
        request_line,
        authorization: header("authorization"),
        body,
    })
}

#[derive(Default)]
struct StatusLog(Mutex<Vec<ConnectionStatus>>);

impl ConversionProgressCallback for StatusLog {
    fn on_status(&self, status: &ConnectionStatus) {
        self.0.lock().unwrap().push(status.clone());
    }
}

fn chair() -> ImageBlob {
    ImageBlob::new(b"\x89PNG\r\n\x1a\nchair".to_vec(), "image/png").with_file_name("chair.png")
}

#[tokio::test]
async fn stage_call_runs_upload_join_and_split_event_stream() {
    let space = FakeSpace::start(r#"{"event_id":"evt-1"}"#).await;
    let service = GradioService::new(&space.config()).unwrap();
    let log = StatusLog::default();

    let mut session = service.connect(Some("hf_test"), &log).await.unwrap();
    let result = session
        .predict("/make3d", vec![StageArg::Image(chair())], &log)
        .await
        .expect("stage should complete");

    let root = format!("{}/gradio_api", space.base);
    assert_eq!(result.data.len(), 2);
    assert_eq!(
        result.data[0]["url"],
        json!(format!("{root}/file=/tmp/gradio/out/mesh.obj"))
    );
    assert_eq!(
        result.data[1]["url"],
        json!(format!("{root}/file=/tmp/gradio/out/mesh.glb"))
    );

    let requests = space.requests();
    let lines: Vec<_> = requests.iter().map(|r| r.request_line.as_str()).collect();
    assert!(lines[0].starts_with("GET /config "), "got: {lines:?}");
    assert!(lines[1].starts_with("POST /gradio_api/upload?upload_id="), "got: {lines:?}");
    assert!(lines[2].starts_with("POST /gradio_api/queue/join "), "got: {lines:?}");
    assert!(lines[3].starts_with("GET /gradio_api/queue/data?session_hash="), "got: {lines:?}");
    for r in &requests {
        assert_eq!(r.authorization.as_deref(), Some("Bearer hf_test"), "{}", r.request_line);
    }

    let join: Value = serde_json::from_slice(&requests[2].body).unwrap();
    assert_eq!(join["fn_index"], json!(2));
    assert_eq!(join["data"][0]["path"], json!(UPLOADED_PATH));
    assert_eq!(join["data"][0]["meta"]["_type"], json!("gradio.FileData"));
    let hash = join["session_hash"].as_str().unwrap();
    assert!(lines[3].contains(hash));

    let seen = log.0.lock().unwrap();
    assert!(matches!(seen[0], ConnectionStatus::Connecting { .. }));
    assert_eq!(
        seen[1],
        ConnectionStatus::Connected {
            host: space.base.clone()
        }
    );
    assert!(seen.contains(&ConnectionStatus::Queued {
        position: Some(0),
        queue_size: Some(1)
    }));
    assert!(seen.contains(&ConnectionStatus::Processing));
}

#[tokio::test]
async fn anonymous_session_sends_no_authorization() {
    let space = FakeSpace::start(r#"{"event_id":"evt-1"}"#).await;
    let service = GradioService::new(&space.config()).unwrap();
    let log = StatusLog::default();

    let mut session = service.connect(None, &log).await.unwrap();
    session
        .predict("/check_input_image", vec![StageArg::Image(chair())], &log)
        .await
        .unwrap();

    assert!(space.requests().iter().all(|r| r.authorization.is_none()));
}

#[tokio::test]
async fn malformed_join_reply_is_unknown_not_busy() {
    let space = FakeSpace::start("<html>upstream error</html>").await;
    let service = GradioService::new(&space.config()).unwrap();
    let log = StatusLog::default();

    let mut session = service.connect(None, &log).await.unwrap();
    let err = session
        .predict("/check_input_image", vec![StageArg::Image(chair())], &log)
        .await
        .unwrap_err();

    assert!(!err.message.contains("queue"), "message: {}", err.message);
    assert!(!err.message.contains(&space.base), "message: {}", err.message);
    assert!(err.url.as_deref().is_some_and(|u| u.ends_with("/gradio_api/queue/join")));

    let classified = classify(&err);
    assert!(matches!(classified, Img2MeshError::Unknown { .. }));
    assert_eq!(
        classified.to_string(),
        "Failed to process the image. Please try again."
    );
}

#[tokio::test]
async fn unknown_endpoint_fails_without_network_calls() {
    let space = FakeSpace::start(r#"{"event_id":"evt-1"}"#).await;
    let service = GradioService::new(&space.config()).unwrap();
    let log = StatusLog::default();

    let mut session = service.connect(None, &log).await.unwrap();
    let err = session
        .predict("/preprocess", vec![StageArg::Bool(true)], &log)
        .await
        .unwrap_err();

    assert!(err.message.contains("/preprocess"));
    assert_eq!(space.requests().len(), 1, "only /config should have been fetched");
}
