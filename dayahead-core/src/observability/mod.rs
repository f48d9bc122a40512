//! Structured logging for the pipeline.
//!
//! Components never call `tracing` directly for pipeline events; they hand a
//! [`PipelineEvent`] to an injected [`EventSink`]. The default
//! [`TracingSink`] turns each event into a structured `tracing` event, and
//! subscriber setup is left to the binary.

pub mod messages;
pub mod sink;

pub use messages::{PipelineEvent, ProbeOutcome, StructuredLog};
pub use sink::{report, EventSink, LoggingError, MemorySink, NullSink, TracingSink};
