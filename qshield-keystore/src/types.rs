//! Core types: managed keys, rotation schedules, triggers, usage statistics,
//! system configurations, and rotation history records.

use chrono::{DateTime, Utc};
use qshield_catalog::KeyPurpose;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Rolling performance-sample window size per key.
pub const USAGE_WINDOW: usize = 100;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique key identifier (hex-encoded random bytes).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(String);

impl KeyId {
    /// Create a new random KeyId.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand_core::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Create from a specific string (for testing/deterministic use).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short random identifier for rotation history rows.
pub fn rotation_record_id() -> String {
    let mut bytes = [0u8; 8];
    rand_core::OsRng.fill_bytes(&mut bytes);
    format!("rot_{}", hex::encode(bytes))
}

// ---------------------------------------------------------------------------
// Rotation triggers
// ---------------------------------------------------------------------------

/// What kind of condition can force a rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
    /// The configured rotation interval has elapsed.
    TimeBased,
    /// The key has performed more operations than its budget.
    UsageCount,
    /// The global threat level exceeds the threshold.
    ThreatLevel,
    /// A compliance issue was flagged for the organization.
    ComplianceRequirement,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::TimeBased => write!(f, "time-based"),
            TriggerKind::UsageCount => write!(f, "usage-count"),
            TriggerKind::ThreatLevel => write!(f, "threat-level"),
            TriggerKind::ComplianceRequirement => write!(f, "compliance-requirement"),
        }
    }
}

/// One rotation condition attached to a key's schedule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RotationTrigger {
    pub kind: TriggerKind,
    /// Threshold in the trigger's own unit: hours for time-based, operation
    /// count for usage, level in [0, 1] for threat.
    pub threshold: f64,
    pub enabled: bool,
}

/// When and why a key rotates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RotationSchedule {
    /// Base rotation interval in hours.
    pub interval_hours: i64,
    /// Next scheduled rotation. Never earlier than the key's creation.
    pub next_rotation: DateTime<Utc>,
    pub auto_rotate: bool,
    /// Whether the schedule was tightened for a non-quantum algorithm.
    pub adaptive: bool,
    pub triggers: Vec<RotationTrigger>,
}

impl RotationSchedule {
    pub fn trigger(&self, kind: TriggerKind) -> Option<&RotationTrigger> {
        self.triggers.iter().find(|t| t.kind == kind)
    }
}

// ---------------------------------------------------------------------------
// Usage statistics
// ---------------------------------------------------------------------------

/// One recorded operation against a key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub recorded_at: DateTime<Utc>,
    pub operation: String,
    pub data_size_bytes: u64,
}

/// Per-key usage counters with a capped rolling sample window.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub operation_count: u64,
    pub data_volume_bytes: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub samples: VecDeque<PerformanceSample>,
}

impl UsageStats {
    /// Record one operation, evicting the oldest sample past [`USAGE_WINDOW`].
    pub fn record(&mut self, operation: &str, data_size_bytes: u64, at: DateTime<Utc>) {
        self.operation_count += 1;
        self.data_volume_bytes += data_size_bytes;
        self.last_used = Some(at);
        self.samples.push_back(PerformanceSample {
            recorded_at: at,
            operation: operation.to_string(),
            data_size_bytes,
        });
        while self.samples.len() > USAGE_WINDOW {
            self.samples.pop_front();
        }
    }
}

// ---------------------------------------------------------------------------
// Managed key
// ---------------------------------------------------------------------------

/// A key under management. Superseded keys are kept (soft decommission with a
/// grace expiration), never deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManagedKey {
    pub id: KeyId,
    /// Canonical algorithm name from the catalog, e.g. `CRYSTALS-Dilithium`.
    pub algorithm: String,
    pub key_size: u32,
    pub purpose: KeyPurpose,
    pub organization_id: String,
    pub quantum_resistant: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub schedule: RotationSchedule,
    pub usage: UsageStats,
    /// Set when a rotation produced a successor.
    pub superseded_by: Option<KeyId>,
    pub rotated_at: Option<DateTime<Utc>>,
}

impl ManagedKey {
    /// A key is active while it has no successor and has not expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.superseded_by.is_none() && now < self.expires_at
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

// ---------------------------------------------------------------------------
// System configuration
// ---------------------------------------------------------------------------

/// Per-user record driving the background rotation scheduler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemConfiguration {
    pub user_id: String,
    pub organization_id: String,
    pub current_algorithm: String,
    pub backup_algorithm: Option<String>,
    pub rotation_interval_hours: i64,
    /// 1 (relaxed) to 5 (paranoid); scales which threats count as actionable.
    pub threat_sensitivity: u8,
    pub auto_rotate: bool,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Rotation history
// ---------------------------------------------------------------------------

/// Why a rotation ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationCause {
    Manual,
    Scheduled,
    ThreatDetected,
    UsageLimit,
    TimeElapsed,
    Compliance,
}

impl fmt::Display for RotationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationCause::Manual => write!(f, "manual"),
            RotationCause::Scheduled => write!(f, "scheduled"),
            RotationCause::ThreatDetected => write!(f, "threat_detected"),
            RotationCause::UsageLimit => write!(f, "usage_limit"),
            RotationCause::TimeElapsed => write!(f, "time_elapsed"),
            RotationCause::Compliance => write!(f, "compliance"),
        }
    }
}

/// Where a rotation run currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStatus {
    Initiated,
    InProgress,
    Completed,
    Failed,
}

/// Synthesized performance-impact payload, for display only. Nothing reads
/// these numbers back into a decision.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PerformanceImpact {
    pub duration_ms: u64,
    pub cpu_spike_pct: f64,
    pub memory_mb: f64,
    pub network_overhead_kb: f64,
}

/// One row in the append-only rotation history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RotationRecord {
    pub id: String,
    pub organization_id: String,
    pub key_id: KeyId,
    pub new_key_id: Option<KeyId>,
    pub old_algorithm: String,
    pub new_algorithm: Option<String>,
    pub cause: RotationCause,
    pub status: RotationStatus,
    pub reason: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub performance_impact: Option<PerformanceImpact>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ids_are_unique_and_hex() {
        let a = KeyId::generate();
        let b = KeyId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn usage_window_is_capped() {
        let mut usage = UsageStats::default();
        let now = Utc::now();
        for i in 0..250u64 {
            usage.record("encrypt", i, now);
        }
        assert_eq!(usage.operation_count, 250);
        assert_eq!(usage.samples.len(), USAGE_WINDOW);
        // Oldest samples were evicted.
        assert_eq!(usage.samples.front().unwrap().data_size_bytes, 150);
    }

    #[test]
    fn data_volume_accumulates() {
        let mut usage = UsageStats::default();
        let now = Utc::now();
        usage.record("sign", 100, now);
        usage.record("sign", 250, now);
        assert_eq!(usage.data_volume_bytes, 350);
        assert!(usage.last_used.is_some());
    }
}
