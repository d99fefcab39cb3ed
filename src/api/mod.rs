//! HTTP control surface
//!
//! Lets the platform services (and operators) drive the panel: presence,
//! error logs, boot progress, display text, lamp test, navigation and
//! function enablement. Handlers only enqueue [`InboundEvent`]s for the panel
//! loop; nothing here touches the bus directly.
//! Default port: 8126

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::inbound::{ErrorLogEntry, InboundEvent, Severity, BOOT_PROGRESS_LEN};
use crate::state::{NavEvent, StateSnapshot};

/// Shared state for API handlers
pub struct ApiState {
    /// Sender into the panel loop
    pub events: mpsc::Sender<InboundEvent>,
}

#[derive(Debug, Deserialize)]
pub struct DisplayRequest {
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: String,
}

#[derive(Debug, Deserialize)]
pub struct LampTestRequest {
    pub on: bool,
}

#[derive(Debug, Deserialize)]
pub struct ButtonRequest {
    pub event: NavEvent,
}

#[derive(Debug, Deserialize)]
pub struct PresenceRequest {
    pub panel: String,
    pub present: bool,
}

#[derive(Debug, Deserialize)]
pub struct ErrorLogRequest {
    pub severity: Severity,
    pub id: u32,
    #[serde(default)]
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct BootProgressRequest {
    /// Eight ASCII characters
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct OperatingModeRequest {
    pub manual: bool,
}

#[derive(Debug, Deserialize)]
pub struct EnableRequest {
    pub ids: Vec<u8>,
}

/// API error response
#[derive(Debug, Serialize)]
struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

impl ApiError {
    fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
        }
    }

    fn unavailable() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            error: "panel loop is not running".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Build the API router
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/state", get(get_state))
        .route("/api/display", post(set_display))
        .route("/api/lamp-test", post(lamp_test))
        .route("/api/button", post(press_button))
        .route("/api/presence", post(set_presence))
        .route("/api/error-log", post(add_error_log))
        .route("/api/boot-progress", post(set_boot_progress))
        .route("/api/functions/enable", post(enable_functions))
        .route("/api/operating-mode", post(set_operating_mode))
        .with_state(state)
}

async fn enqueue(state: &ApiState, event: InboundEvent) -> Result<StatusCode, ApiError> {
    debug!(?event, "Enqueueing API event");
    state.events.send(event).await.map_err(|_| {
        warn!("Panel loop closed, rejecting API request");
        ApiError::unavailable()
    })?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /api/health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// GET /api/state - Current navigation position
async fn get_state(State(state): State<Arc<ApiState>>) -> Result<Json<StateSnapshot>, ApiError> {
    let (tx, rx) = oneshot::channel();
    state
        .events
        .send(InboundEvent::QueryState(tx))
        .await
        .map_err(|_| ApiError::unavailable())?;
    let snapshot = rx.await.map_err(|_| ApiError::unavailable())?;
    Ok(Json(snapshot))
}

/// POST /api/display - Show two lines of text
async fn set_display(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<DisplayRequest>,
) -> Result<StatusCode, ApiError> {
    enqueue(
        &state,
        InboundEvent::Display {
            line1: req.line1.into_bytes(),
            line2: req.line2.into_bytes(),
        },
    )
    .await
}

/// POST /api/lamp-test - Start or end a lamp test
async fn lamp_test(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<LampTestRequest>,
) -> Result<StatusCode, ApiError> {
    enqueue(&state, InboundEvent::LampTest(req.on)).await
}

/// POST /api/button - Inject a navigation event
async fn press_button(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<ButtonRequest>,
) -> Result<StatusCode, ApiError> {
    enqueue(&state, InboundEvent::Navigate(req.event)).await
}

/// POST /api/presence - Report a panel appearing or disappearing
async fn set_presence(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<PresenceRequest>,
) -> Result<StatusCode, ApiError> {
    if req.panel.is_empty() {
        return Err(ApiError::bad_request("panel name is required"));
    }
    enqueue(
        &state,
        InboundEvent::PresenceChanged {
            panel: req.panel,
            present: req.present,
        },
    )
    .await
}

/// POST /api/error-log - Report a new error log entry
async fn add_error_log(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<ErrorLogRequest>,
) -> Result<StatusCode, ApiError> {
    enqueue(
        &state,
        InboundEvent::ErrorLogAdded(ErrorLogEntry {
            severity: req.severity,
            id: req.id,
            reference: req.reference,
        }),
    )
    .await
}

/// POST /api/boot-progress - Report a boot progress code
async fn set_boot_progress(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<BootProgressRequest>,
) -> Result<StatusCode, ApiError> {
    let code = parse_boot_progress(&req.code)?;
    enqueue(&state, InboundEvent::BootProgressChanged(code)).await
}

/// POST /api/functions/enable - Enable panel functions
async fn enable_functions(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<EnableRequest>,
) -> Result<StatusCode, ApiError> {
    if req.ids.is_empty() {
        return Err(ApiError::bad_request("ids must not be empty"));
    }
    enqueue(&state, InboundEvent::EnableFunctions(req.ids)).await
}

/// POST /api/operating-mode - Enter or leave manual operating mode
async fn set_operating_mode(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<OperatingModeRequest>,
) -> Result<StatusCode, ApiError> {
    enqueue(&state, InboundEvent::OperatingModeChanged { manual: req.manual }).await
}

fn parse_boot_progress(code: &str) -> Result<[u8; BOOT_PROGRESS_LEN], ApiError> {
    if !code.is_ascii() {
        return Err(ApiError::bad_request("boot progress code must be ASCII"));
    }
    code.as_bytes().try_into().map_err(|_| {
        ApiError::bad_request(format!(
            "boot progress code must be {} characters, got {}",
            BOOT_PROGRESS_LEN,
            code.len()
        ))
    })
}

/// Start the API server
pub async fn start_server(state: Arc<ApiState>, bind: &str, port: u16) -> Result<()> {
    let router = build_router(state);

    let addr: std::net::SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid API bind address {}:{}", bind, port))?;
    info!("Starting panel API server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
