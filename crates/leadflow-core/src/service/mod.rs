//! Use cases on top of the engine and repository ports.
//!
//! Services depend on traits only; leadflow-infra supplies the SQLite and
//! HTTP implementations.

pub mod contact;
pub mod flow;
