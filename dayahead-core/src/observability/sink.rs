//! Event sinks: where pipeline events go.

use std::sync::Mutex;
use thiserror::Error;

use super::messages::{PipelineEvent, StructuredLog};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("event sink lock poisoned")]
    Poisoned,

    #[error("event sink failed: {0}")]
    Sink(String),
}

/// Logging port injected into every pipeline component.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent) -> Result<(), LoggingError>;
}

/// Emit an event, discarding sink failures.
///
/// A broken sink must never replace the error being reported, so failures
/// only surface as a `tracing` warning.
pub fn report(sink: &dyn EventSink, event: PipelineEvent) {
    if let Err(e) = sink.emit(&event) {
        tracing::warn!(error = %e, event = %event, "event sink failed, event dropped");
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &PipelineEvent) -> Result<(), LoggingError> {
        event.log();
        Ok(())
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &PipelineEvent) -> Result<(), LoggingError> {
        Ok(())
    }
}

/// Keeps events in memory for inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<PipelineEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &PipelineEvent) -> Result<(), LoggingError> {
        let mut events = self.events.lock().map_err(|_| LoggingError::Poisoned)?;
        events.push(event.clone());
        Ok(())
    }
}
