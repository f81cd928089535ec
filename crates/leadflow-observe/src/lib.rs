//! Observability setup for Leadflow: tracing subscriber with optional
//! OpenTelemetry export.

pub mod tracing_setup;
