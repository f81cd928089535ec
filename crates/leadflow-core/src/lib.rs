//! Flow execution engine and port definitions for Leadflow.
//!
//! This crate defines the "ports" (repository, queue and transport traits)
//! that the infrastructure layer implements. It depends only on
//! `leadflow-types` -- never on `leadflow-infra` or any database/IO crate.

pub mod engine;
pub mod notify;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod validation;

#[cfg(test)]
mod testing;
