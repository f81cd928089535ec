//! HTTP request handlers for the REST API.

pub mod contact;
pub mod execution;
pub mod flow;
