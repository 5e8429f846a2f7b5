//! MCP (Model Context Protocol) server for pvkg.
//!
//! Exposes the knowledge service operations as MCP tools so external
//! agents can ask grounded questions and manage the caches.
//!
//! # Feature Gate
//!
//! This module requires the `mcp` feature flag:
//! ```toml
//! [dependencies]
//! pvkg = { version = "...", features = ["mcp"] }
//! ```
//!
//! # Architecture
//!
//! ```text
//! MCP Client
//!   ↓ ask / ask_with_reasoning / cache_stats / cache_clear
//! PvkgMcpServer (one per session, cheap clone)
//!   ↓ Arc<KnowledgeService> shared by every session
//! GroundedAgent | ReasoningAgent + ProvenanceRecorder
//! ```

pub mod params;
pub mod server;
pub mod transport;

pub use params::{CacheClearParams, QueryParams};
pub use server::PvkgMcpServer;
pub use transport::{serve_http, serve_stdio};
