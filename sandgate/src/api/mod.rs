//! HTTP front: MCP transports, REST tool surface, health and metrics

pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
