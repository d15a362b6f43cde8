//! Durandal - persistent memory for AI coding assistants
//!
//! A per-user memory service spoken to over line-delimited JSON (MCP) on
//! stdio: store natural-language memories with structured metadata, search
//! them with a conversation-aware relevance pipeline, and run maintenance.

pub mod analysis;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod selftest;
pub mod server;
pub mod storage;
pub mod types;
pub mod update;

pub use config::Config;
pub use error::{DurandalError, Result};
pub use server::DurandalHandler;
pub use storage::Store;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
