//! Test harness for end-to-end gateway tests: a mock inference backend
//! speaking the Ollama newline-delimited JSON protocol, plus helpers to run
//! a real gateway against it.

use std::{
    collections::BTreeSet,
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use config::BackendConfig;
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// How the mock backend answers `POST /api/chat`.
#[derive(Debug, Clone)]
pub enum BackendBehavior {
    /// Reply normally: `chunks` streamed one line each when the request asks
    /// for streaming, their concatenation as one body otherwise.
    Reply { chunks: Vec<String>, usage: Value },
    /// Stream the given lines verbatim followed by nothing else. For
    /// exercising garbled input.
    ReplyRaw { lines: Vec<String> },
    /// Answer with an HTTP error status and a plain-text message.
    Error { status: u16, message: String },
    /// Stream `chunks`, then break the connection without a done chunk.
    AbortMidStream { chunks: Vec<String> },
}

#[derive(Clone)]
struct MockState {
    behavior: BackendBehavior,
    calls: Arc<AtomicUsize>,
}

/// Mock inference backend.
pub struct TestBackend {
    behavior: BackendBehavior,
    calls: Arc<AtomicUsize>,
}

impl TestBackend {
    /// Create a mock with the given behavior. It does not accept requests
    /// until [`TestBackend::spawn`] is called.
    pub fn new(behavior: BackendBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of chat calls the backend has received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Serve the mock on an ephemeral port, returning its address.
    pub async fn spawn(&self) -> SocketAddr {
        let state = MockState {
            behavior: self.behavior.clone(),
            calls: self.calls.clone(),
        };

        let app = Router::new().route("/api/chat", post(chat)).with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        addr
    }
}

async fn chat(State(state): State<MockState>, Json(request): Json<Value>) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);

    let streaming = request["stream"].as_bool().unwrap_or(false);

    match &state.behavior {
        BackendBehavior::Error { status, message } => {
            (StatusCode::from_u16(*status).unwrap(), message.clone()).into_response()
        }
        BackendBehavior::Reply { chunks, usage } => {
            if streaming {
                let mut lines: Vec<String> = chunks.iter().map(|content| content_line(content)).collect();
                lines.push(done_line(usage.clone()));

                ndjson(Body::from(lines.concat()))
            } else {
                Json(json!({
                    "message": { "role": "assistant", "content": chunks.concat() },
                    "usage": usage,
                }))
                .into_response()
            }
        }
        BackendBehavior::ReplyRaw { lines } => {
            let mut body = lines.join("\n");
            body.push('\n');

            ndjson(Body::from(body))
        }
        BackendBehavior::AbortMidStream { chunks } => {
            let lines: Vec<Result<String, io::Error>> =
                chunks.iter().map(|content| Ok(content_line(content))).collect();

            let broken = futures::stream::iter(lines).chain(futures::stream::once(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "backend dropped"))
            }));

            ndjson(Body::from_stream(broken))
        }
    }
}

fn content_line(content: &str) -> String {
    let mut line = json!({
        "message": { "role": "assistant", "content": content },
        "done": false,
    })
    .to_string();

    line.push('\n');
    line
}

fn done_line(usage: Value) -> String {
    let mut line = json!({
        "message": { "role": "assistant", "content": "" },
        "done": true,
        "usage": usage,
    })
    .to_string();

    line.push('\n');
    line
}

fn ndjson(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .unwrap()
}

/// Backend configuration pointing at a spawned mock, with a small allow-list
/// and context window so tests can hit the limits.
pub fn backend_config(addr: SocketAddr) -> BackendConfig {
    BackendConfig {
        url: format!("http://{addr}").parse().unwrap(),
        default_model: "llama3.1:8b".to_string(),
        models: BTreeSet::from(["llama3.1:8b".to_string(), "llama3.1:70b".to_string()]),
        context_length: 4096,
        timeout: Duration::from_secs(5),
    }
}

/// Serve a gateway router for the given backend on an ephemeral port.
pub async fn spawn_gateway(config: BackendConfig) -> TestClient {
    let app = gateway::router(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestClient::new(format!("http://{addr}"))
}

/// Serve the full server stack (CORS, health, access log, gateway routes) on
/// an ephemeral port.
pub async fn spawn_server(config: config::Config) -> TestClient {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    tokio::spawn(server::serve(server::ServeConfig {
        listen_address: addr,
        config,
    }));

    // The server binds asynchronously; wait until the port accepts.
    for _ in 0..50 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            break;
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    TestClient::new(format!("http://{addr}"))
}

/// Test client for making HTTP requests to a spawned gateway.
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    /// Create a new test client for the given base URL.
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Send a POST request to the given path with a JSON body.
    pub async fn post<T: serde::Serialize>(&self, path: &str, body: &T) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    /// Send a GET request to the given path.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }
}

/// Split an SSE body into its `data:` payloads.
pub fn sse_frames(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .map(|frame| frame.trim_start().strip_prefix("data: ").unwrap_or(frame).to_string())
        .collect()
}
