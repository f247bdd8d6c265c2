//! MCP (Model Context Protocol) support for sandgate
//!
//! This module provides the HTTP SSE-based MCP transport with:
//! - catalog: static capability descriptions and argument schemas
//! - CapabilityInvoker: routes a tool call to the storage backends
//! - SessionRegistry: one bounded channel and heartbeat per SSE client
//! - McpHandler: JSON-RPC 2.0 request handling
//! - delivery: session-bound and direct response paths

pub mod catalog;
pub mod delivery;
pub mod handler;
pub mod invoker;
pub mod session;

pub use catalog::{find_capability, list_capabilities, CapabilityDescriptor};
pub use delivery::{deliver_to_session, dispatch_direct, DeliveryStatus, TransportError};
pub use handler::{JsonRpcRequest, JsonRpcResponse, McpHandler};
pub use invoker::{CapabilityInvoker, FailureKind, ToolOutcome, UnknownCapability};
pub use session::{SessionError, SessionRegistry, SseEvent};
