//! Response delivery for the two protocol transports
//!
//! Session-bound requests are acknowledged immediately and answered later on
//! the session's SSE stream. Direct requests are answered in the same HTTP
//! exchange. Both go through [`McpHandler::handle`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::handler::{
    JsonRpcRequest, JsonRpcResponse, McpHandler, INVALID_REQUEST, PARSE_ERROR, SESSION_NOT_FOUND,
};
use super::session::{SessionError, SessionRegistry, SseEvent};

/// Failures reported to the immediate HTTP caller
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Missing sessionId query parameter")]
    MissingSessionId,

    #[error("Parse error: {0}")]
    Malformed(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl TransportError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::MissingSessionId | Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::Session(SessionError::TooManySessions) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn rpc_code(&self) -> i32 {
        match self {
            Self::SessionNotFound(_) => SESSION_NOT_FOUND,
            Self::MissingSessionId => INVALID_REQUEST,
            Self::Malformed(_) => PARSE_ERROR,
            Self::Session(_) => -32000,
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = JsonRpcResponse::error(None, self.rpc_code(), self.to_string());
        (status, axum::Json(body)).into_response()
    }
}

/// What happened to a session-bound response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Written to the session's stream
    Delivered,
    /// The session was gone at write-back time
    Dropped,
    /// Notification or serialization failure: nothing to write
    NoResponse,
}

/// Parse a raw request body into an envelope
pub fn parse_request(body: &[u8]) -> Result<JsonRpcRequest, TransportError> {
    serde_json::from_slice(body).map_err(|e| TransportError::Malformed(e.to_string()))
}

/// Accept a request addressed to an SSE session.
///
/// Fails synchronously when the session does not exist. Otherwise the
/// request is handled on a spawned task and the response is written to the
/// session as resolved at write-back time. Callers may drop the handle.
pub fn deliver_to_session(
    handler: Arc<McpHandler>,
    registry: SessionRegistry,
    session_id: &str,
    request: JsonRpcRequest,
) -> Result<JoinHandle<DeliveryStatus>, TransportError> {
    if registry.resolve(session_id).is_none() {
        return Err(TransportError::SessionNotFound(session_id.to_string()));
    }

    crate::metrics::record_rpc_request(&request.method, "sse");
    let session_id = session_id.to_string();
    let delivery = tokio::spawn(async move {
        let Some(response) = handler.handle(request).await else {
            return DeliveryStatus::NoResponse;
        };

        let payload = match serde_json::to_string(&response) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("Failed to serialize MCP response: {}", e);
                return DeliveryStatus::NoResponse;
            }
        };

        let delivered = match registry.resolve(&session_id) {
            Some(sender) => sender.send(SseEvent::Message(payload)).await.is_ok(),
            None => false,
        };
        if delivered {
            DeliveryStatus::Delivered
        } else {
            tracing::warn!(session_id = %session_id, "session gone, dropping response");
            crate::metrics::record_dropped_delivery();
            DeliveryStatus::Dropped
        }
    });

    Ok(delivery)
}

/// Handle a request and return its response in the same exchange
pub async fn dispatch_direct(
    handler: &McpHandler,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    crate::metrics::record_rpc_request(&request.method, "direct");
    handler.handle(request).await
}
