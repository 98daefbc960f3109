//! Activity logging: every management operation emits a structured event.
//!
//! Durable persistence is a deployment concern behind [`AuditSinkSync`]; the
//! built-in sinks cover tracing output and in-memory capture.

use crate::types::{KeyId, RotationCause};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Audit events
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AuditAction {
    KeyCreated { algorithm: String, purpose: String },
    KeyRotated { cause: RotationCause, new_key_id: String },
    RotationFailed { reason: String },
    UsageRecorded { operation: String },
    TriggersAssessed { due: bool, reasons: Vec<String> },
    ThreatRecorded { severity: u8, category: String },
    ThreatDeactivated { threat_id: String },
    ConfigUpdated { user_id: String },
    RecommendationServed { count: usize },
    UserRegistered { username: String },
    AuthSucceeded { username: String },
    AuthFailed { reason: String },
    SchedulerScan { rotated: usize, skipped: usize },
}

/// A structured activity event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    /// Which key was involved, if any.
    pub key_id: Option<KeyId>,
    /// Which organization the event belongs to, if any.
    pub organization_id: Option<String>,
    pub action: AuditAction,
    /// Who or what triggered this.
    pub actor: String,
    pub success: bool,
    pub detail: Option<String>,
}

impl AuditEvent {
    /// Event tied to a specific key.
    pub fn key_event(key_id: &KeyId, organization_id: &str, action: AuditAction) -> Self {
        Self {
            timestamp: Utc::now(),
            key_id: Some(key_id.clone()),
            organization_id: Some(organization_id.to_string()),
            action,
            actor: "system".into(),
            success: true,
            detail: None,
        }
    }

    /// System-level event (no specific key).
    pub fn system_event(action: AuditAction) -> Self {
        Self {
            timestamp: Utc::now(),
            key_id: None,
            organization_id: None,
            action,
            actor: "system".into(),
            success: true,
            detail: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.success = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Audit sink trait
// ---------------------------------------------------------------------------

/// Where activity events go. Implement this for your SIEM/log pipeline.
///
/// Synchronous so it can be called from any context without an executor.
pub trait AuditSinkSync: Send + Sync {
    fn record(&self, event: AuditEvent);
}

// ---------------------------------------------------------------------------
// Built-in sinks
// ---------------------------------------------------------------------------

/// Logs events via the `tracing` crate.
pub struct TracingAuditSink;

impl AuditSinkSync for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            timestamp = %event.timestamp,
            key_id = ?event.key_id,
            organization = ?event.organization_id,
            action = ?event.action,
            actor = %event.actor,
            success = event.success,
            detail = ?event.detail,
            "activity"
        );
    }
}

/// Collects events in memory (tests and the activity endpoint).
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self { events: Mutex::new(Vec::new()) }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for_key(&self, key_id: &KeyId) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.key_id.as_ref() == Some(key_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSinkSync for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Fans one event out to several sinks.
pub struct FanoutAuditSink {
    sinks: Vec<std::sync::Arc<dyn AuditSinkSync>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn AuditSinkSync>>) -> Self {
        Self { sinks }
    }
}

impl AuditSinkSync for FanoutAuditSink {
    fn record(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.record(event.clone());
        }
    }
}
