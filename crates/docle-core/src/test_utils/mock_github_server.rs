// src/test_utils/mock_github_server.rs
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// One entry in the mocked repository listing.
#[derive(Debug, Clone)]
pub struct MockFile {
    pub name: String,
    pub content: String,
    /// Reported size; defaults to the content length.
    pub size: Option<u64>,
    pub is_dir: bool,
}

impl MockFile {
    pub fn new(name: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            content: content.to_string(),
            size: None,
            is_dir: false,
        }
    }

    pub fn dir(name: &str) -> Self {
        Self {
            is_dir: true,
            ..Self::new(name, "")
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

#[derive(Clone)]
struct MockServerState {
    base_url: String,
    repo: String,
    files: Arc<Vec<MockFile>>,
    refs: Arc<Mutex<Vec<String>>>,
}

async fn contents_handler(
    State(state): State<MockServerState>,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if format!("{}/{}", owner, repo) != state.repo {
        log::debug!("Mock GitHub server: unknown repository {}/{}", owner, repo);
        return Err(StatusCode::NOT_FOUND);
    }
    state
        .refs
        .lock()
        .unwrap()
        .push(query.get("ref").cloned().unwrap_or_default());

    let listing: Vec<Value> = state
        .files
        .iter()
        .map(|file| {
            let (kind, download_url) = if file.is_dir {
                ("dir", Value::Null)
            } else {
                (
                    "file",
                    json!(format!("{}/raw/{}/{}", state.base_url, state.repo, file.name)),
                )
            };
            json!({
                "name": file.name,
                "path": file.name,
                "type": kind,
                "size": file.size.unwrap_or(file.content.len() as u64),
                "download_url": download_url,
            })
        })
        .collect();
    Ok(Json(Value::Array(listing)))
}

async fn raw_handler(
    State(state): State<MockServerState>,
    Path((_owner, _repo, name)): Path<(String, String, String)>,
) -> Result<String, StatusCode> {
    state
        .files
        .iter()
        .find(|f| f.name == name && !f.is_dir)
        .map(|f| f.content.clone())
        .ok_or(StatusCode::NOT_FOUND)
}

/// Serves a single repository through a contents API and raw downloads.
pub struct MockGitHubServer {
    addr: SocketAddr,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
    refs: Arc<Mutex<Vec<String>>>,
}

impl MockGitHubServer {
    pub async fn start(repo: &str, files: Vec<MockFile>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap_or_else(|e| {
            panic!("Failed to bind mock server to 127.0.0.1:0. Error: {}", e);
        });
        let addr = listener.local_addr().unwrap();
        log::info!("Mock GitHub server listening on {}", addr);

        let state = MockServerState {
            base_url: format!("http://{}", addr),
            repo: repo.to_string(),
            files: Arc::new(files),
            refs: Arc::new(Mutex::new(Vec::new())),
        };
        let refs = state.refs.clone();

        let app = Router::new()
            .route("/repos/{owner}/{repo}/contents", get(contents_handler))
            .route("/raw/{owner}/{repo}/{name}", get(raw_handler))
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap_or_else(|e| {
                    log::error!("Mock GitHub server error: {}", e);
                });
        });

        MockGitHubServer {
            addr,
            shutdown_tx,
            refs,
        }
    }

    pub fn address(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// `ref` query values seen by the listing endpoint, in order.
    pub fn listed_refs(&self) -> Vec<String> {
        self.refs.lock().unwrap().clone()
    }

    pub async fn shutdown(self) {
        if self.shutdown_tx.send(()).is_err() {
            log::warn!("Mock GitHub server shutdown signal already sent or receiver dropped.");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }
}
