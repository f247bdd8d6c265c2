//! Sandgate: a sandboxed workspace exposed to agents over MCP.
//!
//! File and git capabilities are served from a single confined directory
//! through three surfaces: an SSE session transport, a stateless JSON-RPC
//! endpoint and a plain REST route per tool.

pub mod api;
pub mod config;
pub mod error;
pub mod mcp;
pub mod metrics;

pub use config::Config;
pub use error::{Error, Result};
