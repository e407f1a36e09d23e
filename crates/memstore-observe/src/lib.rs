//! Observability setup for memstore: subscriber and dispatch construction.

pub mod tracing_setup;
