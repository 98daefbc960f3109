//! Per-purpose lifetime and rotation-schedule tables.
//!
//! Non-quantum algorithms get half the lifetime and a quarter of the rotation
//! interval: the schedule itself is the first line of defense while the key
//! is still classical.

use crate::types::{RotationSchedule, RotationTrigger, TriggerKind};
use chrono::{DateTime, Duration, Utc};
use qshield_catalog::KeyPurpose;

/// How long a superseded key stays decryptable after rotation.
pub fn rotation_grace() -> Duration {
    Duration::days(7)
}

/// Global threat level at which the threat trigger fires.
pub const THREAT_TRIGGER_LEVEL: f64 = 0.7;

/// Base key lifetime by purpose.
pub fn base_lifetime(purpose: KeyPurpose) -> Duration {
    match purpose {
        KeyPurpose::Encryption => Duration::days(365),
        KeyPurpose::Signing => Duration::days(730),
        KeyPurpose::KeyExchange => Duration::days(30),
    }
}

/// Base rotation interval in hours by purpose.
pub fn base_interval_hours(purpose: KeyPurpose) -> i64 {
    match purpose {
        KeyPurpose::Encryption => 168,
        KeyPurpose::Signing => 720,
        KeyPurpose::KeyExchange => 24,
    }
}

/// Operation budget before the usage trigger fires.
pub fn usage_threshold(purpose: KeyPurpose) -> u64 {
    match purpose {
        KeyPurpose::Encryption => 10_000,
        KeyPurpose::Signing => 5_000,
        KeyPurpose::KeyExchange => 1_000,
    }
}

/// Effective lifetime: halved when the algorithm is not quantum-resistant.
pub fn lifetime(purpose: KeyPurpose, quantum_resistant: bool) -> Duration {
    let base = base_lifetime(purpose);
    if quantum_resistant {
        base
    } else {
        base / 2
    }
}

/// Effective rotation interval in hours: quartered for non-quantum algorithms.
pub fn interval_hours(purpose: KeyPurpose, quantum_resistant: bool) -> i64 {
    let base = base_interval_hours(purpose);
    if quantum_resistant {
        base
    } else {
        (base / 4).max(1)
    }
}

/// Build the adaptive rotation schedule for a new key.
///
/// Triggers: time-based always; usage-count with the purpose budget;
/// threat-level at [`THREAT_TRIGGER_LEVEL`]; compliance only for
/// organizations whose id names an enterprise tenant.
pub fn build_schedule(
    purpose: KeyPurpose,
    quantum_resistant: bool,
    organization_id: &str,
    now: DateTime<Utc>,
) -> RotationSchedule {
    let hours = interval_hours(purpose, quantum_resistant);
    let mut triggers = vec![
        RotationTrigger {
            kind: TriggerKind::TimeBased,
            threshold: hours as f64,
            enabled: true,
        },
        RotationTrigger {
            kind: TriggerKind::UsageCount,
            threshold: usage_threshold(purpose) as f64,
            enabled: true,
        },
        RotationTrigger {
            kind: TriggerKind::ThreatLevel,
            threshold: THREAT_TRIGGER_LEVEL,
            enabled: true,
        },
    ];
    if organization_id.to_ascii_lowercase().contains("enterprise") {
        triggers.push(RotationTrigger {
            kind: TriggerKind::ComplianceRequirement,
            threshold: 1.0,
            enabled: true,
        });
    }

    RotationSchedule {
        interval_hours: hours,
        next_rotation: now + Duration::hours(hours),
        auto_rotate: true,
        adaptive: !quantum_resistant,
        triggers,
    }
}
