//! Shared domain types for Leadflow.
//!
//! This crate contains the types used across the Leadflow platform: flow
//! graphs (nodes and edges), contacts, executions and their steps, scheduled
//! resumption tasks, configuration, and the repository error type.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, uuid, chrono, thiserror.

pub mod config;
pub mod contact;
pub mod error;
pub mod execution;
pub mod flow;
pub mod task;
