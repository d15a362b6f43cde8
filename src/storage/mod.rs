//! Durable memory store (SQLite)

pub mod connection;
pub mod migrations;
pub mod queries;

pub use connection::{QueryOutput, Store};
pub use migrations::SCHEMA_VERSION;
