//! Structured operator events (starter).
//!
//! Operators never log through a global; they are handed an `EventSink`.
//! `TracingSink` forwards to `tracing` when the feature is on.

use std::sync::Mutex;

use vproj_core::hash::Hash256;
use vproj_core::id::OpId;

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectEvent {
    Compiled {
        op: OpId,
        plan: Hash256,
        transfers: usize,
        evals: usize,
        wildcard: bool,
    },
    BatchEmitted {
        op: OpId,
        start: usize,
        rows: usize,
        complete: bool,
    },
    RemainderPending {
        op: OpId,
        offset: usize,
    },
    RemainderDiscarded {
        op: OpId,
        offset: usize,
    },
    Aborted {
        op: OpId,
        error: String,
    },
}

impl ProjectEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProjectEvent::Compiled { .. } => "project.compiled",
            ProjectEvent::BatchEmitted { .. } => "project.batch",
            ProjectEvent::RemainderPending { .. } => "project.remainder",
            ProjectEvent::RemainderDiscarded { .. } => "project.remainder_discarded",
            ProjectEvent::Aborted { .. } => "project.aborted",
        }
    }

    pub fn op(&self) -> OpId {
        match self {
            ProjectEvent::Compiled { op, .. }
            | ProjectEvent::BatchEmitted { op, .. }
            | ProjectEvent::RemainderPending { op, .. }
            | ProjectEvent::RemainderDiscarded { op, .. }
            | ProjectEvent::Aborted { op, .. } => *op,
        }
    }

    /// Flattened key/value view for text sinks.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut kv = vec![("op", self.op().get().to_string())];
        match self {
            ProjectEvent::Compiled {
                plan,
                transfers,
                evals,
                wildcard,
                ..
            } => {
                kv.push(("plan", plan.short()));
                kv.push(("transfers", transfers.to_string()));
                kv.push(("evals", evals.to_string()));
                kv.push(("wildcard", wildcard.to_string()));
            }
            ProjectEvent::BatchEmitted {
                start,
                rows,
                complete,
                ..
            } => {
                kv.push(("start", start.to_string()));
                kv.push(("rows", rows.to_string()));
                kv.push(("complete", complete.to_string()));
            }
            ProjectEvent::RemainderPending { offset, .. }
            | ProjectEvent::RemainderDiscarded { offset, .. } => {
                kv.push(("offset", offset.to_string()));
            }
            ProjectEvent::Aborted { error, .. } => kv.push(("error", error.clone())),
        }
        kv
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ProjectEvent);
}

/// Forwards events to `tracing` at TRACE/DEBUG level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &ProjectEvent) {
        emit_span(event.name(), &event.fields());
    }
}

#[cfg(feature = "tracing")]
fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::span!(tracing::Level::TRACE, "vproj", event);
    let _enter = span.enter();
    for (k, v) in key_values {
        tracing::debug!(%event, %k, %v, "event");
    }
}

#[cfg(not(feature = "tracing"))]
fn emit_span(_event: &str, _key_values: &[(&str, String)]) { /* no-op */
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &ProjectEvent) {}
}

/// Keeps every event in memory; handy in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProjectEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProjectEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name() == name).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &ProjectEvent) {
        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        events.push(event.clone());
    }
}
