//! Data-quality diagnostics. Reconciliation reports every fallback it takes to
//! a sink instead of logging directly, so the algorithm stays testable and
//! operators still get an audit trail.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    PayloadSuspect { entity: String, snippet: String },
    ContainerMissing { entity: String },
    PeriodsMissing { entity: String },
    GroupSelected { entity: String, group: String, score: usize },
    GroupMissing { entity: String, reason: String },
    FallbackUsed { entity: String, wanted: String, matched: String },
    PeriodMissing { entity: String, period: String },
    MetricMissing {
        entity: String,
        period: String,
        metric: String,
        keys: Vec<String>,
    },
}

impl DiagnosticEvent {
    pub fn entity(&self) -> &str {
        match self {
            DiagnosticEvent::PayloadSuspect { entity, .. }
            | DiagnosticEvent::ContainerMissing { entity }
            | DiagnosticEvent::PeriodsMissing { entity }
            | DiagnosticEvent::GroupSelected { entity, .. }
            | DiagnosticEvent::GroupMissing { entity, .. }
            | DiagnosticEvent::FallbackUsed { entity, .. }
            | DiagnosticEvent::PeriodMissing { entity, .. }
            | DiagnosticEvent::MetricMissing { entity, .. } => entity,
        }
    }

    /// Selections are informational; everything else is a data-quality gap.
    pub fn is_gap(&self) -> bool {
        !matches!(self, DiagnosticEvent::GroupSelected { .. })
    }
}

pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, event: DiagnosticEvent);

    fn payload_suspect(&self, entity: &str, snippet: &str) {
        self.record(DiagnosticEvent::PayloadSuspect {
            entity: entity.to_string(),
            snippet: snippet.to_string(),
        });
    }

    fn container_missing(&self, entity: &str) {
        self.record(DiagnosticEvent::ContainerMissing {
            entity: entity.to_string(),
        });
    }

    fn periods_missing(&self, entity: &str) {
        self.record(DiagnosticEvent::PeriodsMissing {
            entity: entity.to_string(),
        });
    }

    fn group_selected(&self, entity: &str, group: &str, score: usize) {
        self.record(DiagnosticEvent::GroupSelected {
            entity: entity.to_string(),
            group: group.to_string(),
            score,
        });
    }

    fn group_missing(&self, entity: &str, reason: &str) {
        self.record(DiagnosticEvent::GroupMissing {
            entity: entity.to_string(),
            reason: reason.to_string(),
        });
    }

    fn fallback_used(&self, entity: &str, wanted: &str, matched: &str) {
        self.record(DiagnosticEvent::FallbackUsed {
            entity: entity.to_string(),
            wanted: wanted.to_string(),
            matched: matched.to_string(),
        });
    }

    fn period_missing(&self, entity: &str, period: &str) {
        self.record(DiagnosticEvent::PeriodMissing {
            entity: entity.to_string(),
            period: period.to_string(),
        });
    }

    fn metric_missing(&self, entity: &str, period: &str, metric: &str, keys: &[String]) {
        self.record(DiagnosticEvent::MetricMissing {
            entity: entity.to_string(),
            period: period.to_string(),
            metric: metric.to_string(),
            keys: keys.to_vec(),
        });
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl DiagnosticsSink for NoopDiagnostics {
    fn record(&self, _event: DiagnosticEvent) {}
}

/// Emits each event as a structured tracing record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn record(&self, event: DiagnosticEvent) {
        match &event {
            DiagnosticEvent::PayloadSuspect { entity, snippet } => {
                warn!(entity, snippet, "payload does not start with a JSON token")
            }
            DiagnosticEvent::ContainerMissing { entity } => {
                warn!(entity, "payload has no container object; reading from root")
            }
            DiagnosticEvent::PeriodsMissing { entity } => {
                warn!(entity, "declared period sequence is empty")
            }
            DiagnosticEvent::GroupSelected { entity, group, score } => {
                debug!(entity, group, score, "metric group selected")
            }
            DiagnosticEvent::GroupMissing { entity, reason } => {
                warn!(entity, reason, "no usable metric group")
            }
            DiagnosticEvent::FallbackUsed { entity, wanted, matched } => {
                warn!(entity, wanted, matched, "period matched by fuzzy key")
            }
            DiagnosticEvent::PeriodMissing { entity, period } => {
                warn!(entity, period, "period missing from metric group")
            }
            DiagnosticEvent::MetricMissing {
                entity,
                period,
                metric,
                keys,
            } => warn!(entity, period, metric, ?keys, "metric keys missing"),
        }
    }
}

/// Keeps every event for later reporting and forwards it to tracing.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Hands over everything recorded so far and starts empty.
    pub fn drain(&self) -> Vec<DiagnosticEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn gaps(&self) -> Vec<DiagnosticEvent> {
        self.events().into_iter().filter(DiagnosticEvent::is_gap).collect()
    }
}

impl DiagnosticsSink for RecordingDiagnostics {
    fn record(&self, event: DiagnosticEvent) {
        TracingDiagnostics.record(event.clone());
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
