//! MCP JSON-RPC 2.0 handler

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::catalog::list_capabilities;
use super::invoker::CapabilityInvoker;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "sandgate";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
/// Transport-level: the addressed session does not exist
pub const SESSION_NOT_FOUND: i32 = -32001;

/// JSON-RPC request. A request without `id` is a notification.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

fn default_version() -> String {
    "2.0".to_string()
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC error
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Either a result or an error, never both
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcOutcome {
    Result(Value),
    Error(JsonRpcError),
}

/// JSON-RPC response
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(flatten)]
    pub outcome: RpcOutcome,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            outcome: RpcOutcome::Result(result),
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            outcome: RpcOutcome::Error(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            RpcOutcome::Result(v) => Some(v),
            RpcOutcome::Error(_) => None,
        }
    }

    pub fn error_object(&self) -> Option<&JsonRpcError> {
        match &self.outcome {
            RpcOutcome::Result(_) => None,
            RpcOutcome::Error(e) => Some(e),
        }
    }
}

/// MCP protocol handler
///
/// Shared by the session-bound and the stateless transport: both call
/// [`McpHandler::handle`].
pub struct McpHandler {
    invoker: CapabilityInvoker,
}

impl McpHandler {
    pub fn new(invoker: CapabilityInvoker) -> Self {
        Self { invoker }
    }

    pub fn invoker(&self) -> &CapabilityInvoker {
        &self.invoker
    }

    /// Handle a JSON-RPC request. Returns `None` for notifications.
    pub async fn handle(&self, req: JsonRpcRequest) -> Option<JsonRpcResponse> {
        tracing::debug!(method = %req.method, id = ?req.id, "dispatching");

        let notification = req.is_notification();
        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(req.id),
            "notifications/initialized" | "initialized" => return None,
            "ping" => JsonRpcResponse::success(req.id, json!({})),
            "tools/list" => self.handle_tools_list(req.id),
            "tools/call" => self.handle_tools_call(req.id, req.params).await,
            _ => JsonRpcResponse::error(
                req.id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", req.method),
            ),
        };

        if notification {
            None
        } else {
            Some(response)
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": { "listChanged": false }
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools: Vec<Value> = list_capabilities()
            .iter()
            .map(|c| c.to_tool_definition())
            .collect();
        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params = match params {
            Some(Value::Object(p)) => p,
            Some(_) => return JsonRpcResponse::error(id, INVALID_PARAMS, "params must be an object"),
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params"),
        };

        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing tool name"),
        };

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        match self.invoker.invoke(name, &arguments).await {
            Ok(outcome) => JsonRpcResponse::success(
                id,
                json!({
                    "content": [{
                        "type": "text",
                        "text": outcome.to_json().to_string()
                    }],
                    "isError": !outcome.is_ok()
                }),
            ),
            Err(e) => JsonRpcResponse::error(id, METHOD_NOT_FOUND, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::invoker::tests::counting_invoker;
    use sandgate_storage::{GitRepository, LocalFileStore, SandboxRoot};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn request(id: Value, method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.to_string(),
            params,
        }
    }

    async fn workspace_handler() -> (TempDir, McpHandler) {
        let dir = TempDir::new().unwrap();
        let root = SandboxRoot::open(dir.path(), false).unwrap();
        let files = Arc::new(LocalFileStore::new(root));
        let vcs = Arc::new(GitRepository::open_or_init(dir.path()).unwrap());
        let handler = McpHandler::new(CapabilityInvoker::new(files, vcs));
        (dir, handler)
    }

    fn tool_text(response: &JsonRpcResponse) -> Value {
        let text = response.result().unwrap()["content"][0]["text"]
            .as_str()
            .unwrap();
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_response_serializes_one_of_result_or_error() {
        let ok = serde_json::to_value(JsonRpcResponse::success(Some(json!(1)), json!({}))).unwrap();
        assert_eq!(ok, json!({"jsonrpc": "2.0", "id": 1, "result": {}}));

        let err = serde_json::to_value(JsonRpcResponse::error(None, PARSE_ERROR, "bad")).unwrap();
        assert_eq!(
            err,
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "bad"}})
        );
    }

    #[tokio::test]
    async fn test_initialize() {
        let (_backend, invoker) = counting_invoker();
        let handler = McpHandler::new(invoker);
        let resp = handler
            .handle(request(json!(1), "initialize", Some(json!({}))))
            .await
            .unwrap();
        assert_eq!(resp.id, json!(1));
        let result = resp.result().unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "sandgate");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
    }

    #[tokio::test]
    async fn test_tools_list_matches_catalog() {
        let (_backend, invoker) = counting_invoker();
        let handler = McpHandler::new(invoker);
        let resp = handler
            .handle(request(json!("a"), "tools/list", None))
            .await
            .unwrap();
        let tools = resp.result().unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), list_capabilities().len());
        assert_eq!(tools[0]["name"], "read_file");
        assert!(tools[0]["inputSchema"]["properties"]["path"].is_object());
    }

    #[tokio::test]
    async fn test_list_files_scenario() {
        let (dir, handler) = workspace_handler().await;
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();

        let resp = handler
            .handle(request(
                json!(7),
                "tools/call",
                Some(json!({"name": "list_files", "arguments": {"path": "."}})),
            ))
            .await
            .unwrap();

        assert_eq!(resp.result().unwrap()["isError"], false);
        let outcome = tool_text(&resp);
        assert_eq!(outcome["status"], "ok");
        let files = outcome["files"].as_array().unwrap();
        assert!(files.contains(&json!({"name": "a.txt", "isDirectory": false})));
    }

    #[tokio::test]
    async fn test_outside_root_is_capability_error() {
        let (dir, handler) = workspace_handler().await;

        let resp = handler
            .handle(request(
                json!(2),
                "tools/call",
                Some(json!({"name": "write_file", "arguments": {"path": "../outside", "content": "x"}})),
            ))
            .await
            .unwrap();

        assert!(resp.error_object().is_none());
        assert_eq!(resp.result().unwrap()["isError"], true);
        let outcome = tool_text(&resp);
        assert_eq!(outcome["status"], "error");
        assert!(outcome["error"].as_str().unwrap().contains("outside"));
        assert!(!dir.path().parent().unwrap().join("outside").exists());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (_backend, invoker) = counting_invoker();
        let handler = McpHandler::new(invoker);
        let resp = handler
            .handle(request(json!(3), "bogus", None))
            .await
            .unwrap();
        let err = resp.error_object().unwrap();
        assert_eq!(err.code, METHOD_NOT_FOUND);
        assert!(err.message.contains("bogus"));
        assert_eq!(resp.id, json!(3));
    }

    #[tokio::test]
    async fn test_unknown_tool_does_not_reach_backend() {
        let (backend, invoker) = counting_invoker();
        let handler = McpHandler::new(invoker);
        let resp = handler
            .handle(request(
                json!(4),
                "tools/call",
                Some(json!({"name": "format_disk", "arguments": {}})),
            ))
            .await
            .unwrap();
        let err = resp.error_object().unwrap();
        assert_eq!(err.code, METHOD_NOT_FOUND);
        assert!(err.message.contains("format_disk"));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let (_backend, invoker) = counting_invoker();
        let handler = McpHandler::new(invoker);

        let missing = handler
            .handle(request(json!(5), "tools/call", None))
            .await
            .unwrap();
        assert_eq!(missing.error_object().unwrap().code, INVALID_PARAMS);

        let no_name = handler
            .handle(request(json!(6), "tools/call", Some(json!({"arguments": {}}))))
            .await
            .unwrap();
        assert_eq!(no_name.error_object().unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let (_backend, invoker) = counting_invoker();
        let handler = McpHandler::new(invoker);
        let note = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: "notifications/initialized".to_string(),
            params: None,
        };
        assert!(handler.handle(note).await.is_none());

        let ping = handler.handle(request(json!(9), "ping", None)).await.unwrap();
        assert_eq!(ping.result(), Some(&json!({})));
    }

    #[test]
    fn test_request_id_round_trips() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":{"k":[1,2]},"method":"ping"}"#).unwrap();
        assert_eq!(req.id, Some(json!({"k": [1, 2]})));
        assert!(!req.is_notification());
    }
}
