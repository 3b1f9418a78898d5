//! HTTP and WebSocket server for overlays and the control page.
//!
//! ```text
//! capture threads ──▶ Notifier ──▶ dispatcher ──▶ BroadcastHub ──▶ GET /ws (overlays)
//!                                                       ▲
//! control page ──▶ /api/* ──▶ AppState ─────────────────┘
//! ```

use crate::config::ConfigError;
use crate::hub::{spawn_dispatcher, PushMessage, SUBSCRIBER_QUEUE_CAPACITY};
use crate::state::AppState;
use crate::target::{TargetConfig, TargetError};
use crate::window::{ForegroundInfo, WindowSummary};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Directory holding `index.html` (overlay) and `control.html`
    pub web_dir: PathBuf,
}

impl ServerConfig {
    pub fn new(port: u16, web_dir: PathBuf) -> Self {
        Self { port, web_dir }
    }
}

struct ServerState {
    app: Arc<AppState>,
    web_dir: PathBuf,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub capture: String,
    pub subscribers: usize,
}

#[derive(Debug, Deserialize)]
struct TargetRequest {
    mode: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FocusRequest {
    hwnd: Option<Value>,
}

/// Error returned to the control page as `{ok: false, message}`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        let status = match e {
            ConfigError::InvalidField { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<TargetError> for ApiError {
    fn from(e: TargetError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "ok": false, "message": self.message }));
        (self.status, body).into_response()
    }
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        capture: state.app.capture_status().to_string(),
        subscribers: state.app.hub().len(),
    })
}

/// GET /ws
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.app.clone()))
}

/// Serve one overlay connection until either side goes away.
async fn handle_socket(socket: WebSocket, app: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Arc<str>>(SUBSCRIBER_QUEUE_CAPACITY);
    let (id, initial) = app.subscribe(tx);

    if sink.send(Message::Text(initial.to_json())).await.is_ok() {
        loop {
            tokio::select! {
                outgoing = rx.recv() => {
                    // None: the hub dropped this subscriber
                    let Some(payload) = outgoing else { break };
                    if sink.send(Message::Text(payload.to_string())).await.is_err() {
                        break;
                    }
                }
                incoming = stream.next() => {
                    // Client messages are ignored; only closure matters.
                    match incoming {
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    app.hub().disconnect(&id);
}

/// GET /api/keys
async fn get_keys(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({ "keys": state.app.keys() }))
}

/// GET /api/target
async fn get_target(State(state): State<Arc<ServerState>>) -> Json<TargetConfig> {
    Json(state.app.target())
}

/// POST /api/target
async fn set_target(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<TargetRequest>,
) -> Result<Json<TargetConfig>, ApiError> {
    let target = state
        .app
        .set_target(request.mode.as_deref(), request.value)?;
    Ok(Json(target))
}

/// GET /api/config
async fn get_config(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({ "port": state.app.port() }))
}

/// POST /api/config
async fn set_config(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let port = match body.get("port") {
        None => i64::from(state.app.port()),
        Some(value) => integer(value)
            .ok_or_else(|| ApiError::bad_request("port must be an integer"))?,
    };

    let port = state.app.set_port(port)?;
    Ok(Json(json!({
        "ok": true,
        "message": "Saved. Restart the server to apply.",
        "port": port,
    })))
}

/// GET /api/overlay-config
async fn get_overlay(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!(state.app.overlay()))
}

/// POST /api/overlay-config
async fn set_overlay(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let update = body
        .as_object()
        .ok_or_else(|| ApiError::bad_request("expected a JSON object"))?;
    state.app.set_overlay(update)?;
    Ok(Json(json!({ "ok": true })))
}

/// GET /api/foreground
async fn get_foreground(State(state): State<Arc<ServerState>>) -> Json<ForegroundInfo> {
    Json(state.app.foreground())
}

/// GET /api/windows
async fn get_windows(State(state): State<Arc<ServerState>>) -> Json<Vec<WindowSummary>> {
    Json(state.app.windows())
}

/// POST /api/focus
async fn focus_window(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<FocusRequest>,
) -> Result<Json<Value>, ApiError> {
    let hwnd = match request.hwnd.as_ref().and_then(integer) {
        Some(hwnd) if hwnd > 0 => hwnd.to_string(),
        _ => return Err(ApiError::bad_request("invalid hwnd")),
    };

    if state.app.focus_window(&hwnd) {
        Ok(Json(json!({ "ok": true })))
    } else {
        Err(ApiError::bad_request("could not focus window"))
    }
}

/// GET /
async fn root() -> Redirect {
    Redirect::to("/control")
}

/// GET /overlay
async fn overlay_page(State(state): State<Arc<ServerState>>) -> Html<String> {
    page(&state, "index.html", "Overlay not found").await
}

/// GET /control
async fn control_page(State(state): State<Arc<ServerState>>) -> Html<String> {
    page(&state, "control.html", "Control not found").await
}

async fn page(state: &ServerState, file: &str, missing: &str) -> Html<String> {
    let path = state.web_dir.join(file);
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html),
        Err(e) => {
            tracing::debug!("Cannot read {:?}: {e}", path);
            Html(format!("<html><body>{missing}</body></html>"))
        }
    }
}

/// Accept JSON integers and numeric strings.
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Build the router for the given state.
///
/// Everything under `web_dir` is also served below `/static`, so the pages
/// can load their stylesheets and scripts.
pub fn router(app: Arc<AppState>, web_dir: PathBuf) -> Router {
    let static_files = ServeDir::new(&web_dir);
    let overlay_file = ServeFile::new(web_dir.join("index.html"));
    let control_file = ServeFile::new(web_dir.join("control.html"));
    let state = Arc::new(ServerState { app, web_dir });

    Router::new()
        .route("/", get(root))
        .route("/overlay", get(overlay_page))
        .route("/control", get(control_page))
        .route_service("/overlay.html", overlay_file)
        .route_service("/control.html", control_file)
        .nest_service("/static", static_files)
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade))
        .route("/api/keys", get(get_keys))
        .route("/api/target", get(get_target).post(set_target))
        .route("/api/config", get(get_config).post(set_config))
        .route("/api/overlay-config", get(get_overlay).post(set_overlay))
        .route("/api/foreground", get(get_foreground))
        .route("/api/windows", get(get_windows))
        .route("/api/focus", post(focus_window))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server.
///
/// `pushes` is the receiving end of the notifier held by `app`; it is drained
/// into the hub on this runtime until the notifier is dropped.
pub async fn run(
    config: ServerConfig,
    app: Arc<AppState>,
    pushes: mpsc::UnboundedReceiver<PushMessage>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    spawn_dispatcher(app.hub().clone(), pushes);
    let router = router(app, config.web_dir);

    tracing::info!("keyqueue listening on http://{}", actual_addr);
    tracing::info!("Overlay: http://{}/overlay", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_parsing() {
        assert_eq!(integer(&json!(9001)), Some(9001));
        assert_eq!(integer(&json!("9001")), Some(9001));
        assert_eq!(integer(&json!(" 42 ")), Some(42));
        assert_eq!(integer(&json!(1.5)), None);
        assert_eq!(integer(&json!(true)), None);
    }

    #[test]
    fn test_config_errors_map_to_status() {
        let invalid = ApiError::from(ConfigError::InvalidField {
            field: "cols".to_string(),
            reason: "expected an integer".to_string(),
        });
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

        let io = ApiError::from(ConfigError::IoError("disk full".to_string()));
        assert_eq!(io.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
