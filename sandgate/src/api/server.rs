use crate::config::{Config, CorsConfig};
use crate::mcp::delivery::{deliver_to_session, dispatch_direct, parse_request, TransportError};
use crate::mcp::{CapabilityInvoker, McpHandler, SessionRegistry, SseEvent};
use crate::Result;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<McpHandler>,
    pub sessions: SessionRegistry,
    pub root: PathBuf,
    pub metrics: Option<PrometheusHandle>,
}

pub struct ApiServer {
    state: AppState,
    cors_config: CorsConfig,
    max_body_size: usize,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

impl ApiServer {
    pub fn new(config: &Config, invoker: CapabilityInvoker) -> Self {
        let state = AppState {
            handler: Arc::new(McpHandler::new(invoker)),
            sessions: SessionRegistry::new(&config.sessions),
            root: config.workspace.root.clone(),
            metrics: None,
        };

        Self {
            state,
            cors_config: config.server.cors.clone(),
            max_body_size: config.server.max_body_size,
        }
    }

    /// Serve `GET /metrics` from an installed Prometheus recorder
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.state.sessions
    }

    /// GET /sse - SSE stream for MCP
    async fn sse_handler(
        State(state): State<AppState>,
    ) -> std::result::Result<
        Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>,
        TransportError,
    > {
        let (id, mut rx) = state.sessions.open().map_err(|e| {
            tracing::warn!("Failed to open MCP session: {}", e);
            TransportError::from(e)
        })?;
        let guard = state.sessions.guard(id.clone());

        let stream = async_stream::stream! {
            // Dropping the stream closes the session
            let _guard = guard;

            yield Ok::<Event, Infallible>(
                Event::default()
                    .event("endpoint")
                    .data(format!("/messages?sessionId={}", id)),
            );

            while let Some(event) = rx.recv().await {
                match event {
                    SseEvent::Message(data) => {
                        yield Ok::<Event, Infallible>(Event::default().event("message").data(data));
                    }
                    SseEvent::Heartbeat => {
                        yield Ok::<Event, Infallible>(Event::default().comment("ping"));
                    }
                }
            }
        };

        Ok(Sse::new(stream))
    }

    /// POST /messages?sessionId=<id> - JSON-RPC requests answered over SSE
    async fn messages_handler(
        State(state): State<AppState>,
        Query(query): Query<MessagesQuery>,
        body: Bytes,
    ) -> std::result::Result<StatusCode, TransportError> {
        let session_id = query.session_id.ok_or(TransportError::MissingSessionId)?;
        let request = parse_request(&body)?;
        deliver_to_session(
            state.handler.clone(),
            state.sessions.clone(),
            &session_id,
            request,
        )?;
        Ok(StatusCode::ACCEPTED)
    }

    /// POST /mcp - JSON-RPC requests answered inline
    async fn mcp_handler(
        State(state): State<AppState>,
        body: Bytes,
    ) -> std::result::Result<Response, TransportError> {
        let request = parse_request(&body)?;
        Ok(match dispatch_direct(&state.handler, request).await {
            Some(response) => Json(response).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        })
    }

    /// Build CORS layer from configuration
    fn build_cors_layer(&self) -> CorsLayer {
        if !self.cors_config.enabled {
            return CorsLayer::new();
        }

        let origins: Vec<HeaderValue> = self
            .cors_config
            .origins
            .iter()
            .filter(|o| o.as_str() != "*")
            .filter_map(|o| o.parse().ok())
            .collect();

        let has_wildcard = self.cors_config.origins.iter().any(|o| o == "*");

        let cors = if has_wildcard {
            CorsLayer::new().allow_origin(tower_http::cors::Any)
        } else if origins.is_empty() {
            CorsLayer::new()
        } else {
            CorsLayer::new().allow_origin(origins)
        };

        cors.allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    }

    pub fn router(&self) -> Router {
        let mcp_routes = Router::new()
            .route("/sse", get(Self::sse_handler))
            .route("/messages", post(Self::messages_handler))
            .route("/mcp", post(Self::mcp_handler));

        let api_routes = Router::new()
            .route("/api/tools/:name", post(crate::api::routes::call_tool))
            .route("/health", get(crate::api::routes::health))
            .route("/metrics", get(crate::api::routes::metrics));

        let cors = self.build_cors_layer();

        Router::new()
            .merge(mcp_routes)
            .merge(api_routes)
            .with_state(self.state.clone())
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(self.max_body_size))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", addr);
        self.serve_listener(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_listener(self, listener: tokio::net::TcpListener) -> Result<()> {
        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Server(e.to_string()))?;

        Ok(())
    }
}
