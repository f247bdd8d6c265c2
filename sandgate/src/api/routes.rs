use crate::api::server::AppState;
use crate::mcp::handler::{PROTOCOL_VERSION, SERVER_NAME};
use crate::mcp::{FailureKind, ToolOutcome};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

fn outcome_status(outcome: &ToolOutcome) -> StatusCode {
    match outcome {
        ToolOutcome::Ok(_) => StatusCode::OK,
        ToolOutcome::Error { kind, .. } => match kind {
            FailureKind::InvalidArguments => StatusCode::BAD_REQUEST,
            FailureKind::Denied => StatusCode::FORBIDDEN,
            FailureKind::NotFound => StatusCode::NOT_FOUND,
            FailureKind::Backend => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "status": "error", "error": message }))).into_response()
}

/// POST /api/tools/:name - invoke a capability without the protocol envelope
pub async fn call_tool(
    Path(name): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let arguments: Value = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => {
                return error_body(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e))
            }
        }
    };

    match state.handler.invoker().invoke(&name, &arguments).await {
        Ok(outcome) => (outcome_status(&outcome), Json(outcome.to_json())).into_response(),
        Err(e) => error_body(StatusCode::NOT_FOUND, e.to_string()),
    }
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "name": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "protocolVersion": PROTOCOL_VERSION,
        "root": state.root.display().to_string(),
    }))
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
