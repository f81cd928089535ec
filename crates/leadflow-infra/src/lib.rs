//! Infrastructure layer for Leadflow.
//!
//! Contains implementations of the ports defined in `leadflow-core`: SQLite
//! repositories and the durable task queue, email/SMS transports, and
//! configuration loading.

pub mod config;
pub mod sqlite;
pub mod transport;
