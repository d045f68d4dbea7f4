//! Logging for Tally.
//!
//! Installs the process-wide `tracing` subscriber and provides the spans
//! ledger operations run under.

pub mod spans;
pub mod tracer;

pub use spans::{grant_span, ledger_span};
pub use tracer::{LogFormat, TracerError, TracingConfig, init_tracing};
