//! Background jobs: the consolidated rotation scheduler, the threat monitor,
//! and the periodic status broadcaster.
//!
//! One scheduler task replaces the pair of overlapping polling jobs the
//! platform started with: each tick performs both the elapsed-time scan and
//! the severe-threat scan, under a per-system lease so a system is never
//! rotated twice for the same window. Per-iteration errors are logged and
//! swallowed; one bad scan never stops the next tick.

use crate::state::Shared;
use crate::ws::WsEvent;
use chrono::{Duration as ChronoDuration, Utc};
use qshield_keystore::{
    AuditAction, AuditEvent, AuditSinkSync, ConfigStore, KeystoreError, PerformanceImpact,
    RotationCause, RotationHistoryStore, SystemConfiguration, ThreatSignal, ThreatStore,
};
use rand::Rng;
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct JobConfig {
    /// Rotation scan cadence.
    pub scan_interval: Duration,
    /// Threat monitor cadence.
    pub threat_interval: Duration,
    /// Status broadcast cadence.
    pub status_interval: Duration,
    /// Simulated rotation processing latency bounds, milliseconds.
    pub latency_ms: (u64, u64),
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(300),
            threat_interval: Duration::from_secs(3600),
            status_interval: Duration::from_secs(30),
            latency_ms: (1000, 3000),
        }
    }
}

/// How far back the severe-threat scan looks.
const THREAT_SCAN_WINDOW_HOURS: i64 = 24;

pub fn spawn_background_jobs(state: Shared, config: JobConfig) {
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.scan_interval);
            // The first tick fires immediately; skip it so startup stays quiet.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = rotation_scan(&state, config).await {
                    tracing::warn!(error = %e, "rotation scan failed");
                }
            }
        });
    }

    {
        let state = state.clone();
        tokio::spawn(async move {
            // Initial delayed probe shortly after startup, then the steady cadence.
            tokio::time::sleep(Duration::from_secs(5)).await;
            threat_probe(&state);
            let mut ticker = tokio::time::interval(config.threat_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                threat_probe(&state);
            }
        });
    }

    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.status_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = broadcast_status(&state).await {
                    tracing::debug!(error = %e, "status broadcast failed");
                }
            }
        });
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            state.rate_limiter.cleanup().await;
        }
    });
}

// ---------------------------------------------------------------------------
// Rotation scan
// ---------------------------------------------------------------------------

/// One scheduler tick: scan every auto-rotate system once.
pub async fn rotation_scan(state: &Shared, config: JobConfig) -> Result<(), KeystoreError> {
    let systems = state.configs.list_auto_rotate()?;
    let mut rotated = 0usize;
    let mut skipped = 0usize;

    for system in systems {
        if !state.try_acquire_rotation_lease(&system.user_id) {
            tracing::debug!(user = %system.user_id, "rotation already in flight, skipping");
            skipped += 1;
            continue;
        }

        let outcome = scan_one_system(state, &system, config).await;
        state.release_rotation_lease(&system.user_id);

        match outcome {
            Ok(true) => rotated += 1,
            Ok(false) => skipped += 1,
            Err(e) => {
                skipped += 1;
                tracing::warn!(user = %system.user_id, error = %e, "system rotation failed");
            }
        }
    }

    state
        .audit
        .record(AuditEvent::system_event(AuditAction::SchedulerScan { rotated, skipped }));
    Ok(())
}

/// Decide whether one system is due, and rotate it if so. Returns whether a
/// rotation ran.
async fn scan_one_system(
    state: &Shared,
    system: &SystemConfiguration,
    config: JobConfig,
) -> Result<bool, KeystoreError> {
    let now = Utc::now();

    // Elapsed-time check against the last completed rotation.
    let last_completed = state
        .history
        .last_completed_for(&system.organization_id)?
        .and_then(|r| r.completed_at)
        .unwrap_or(system.updated_at);
    let elapsed = now - last_completed;
    let interval = ChronoDuration::hours(system.rotation_interval_hours);

    let cause = if elapsed >= interval {
        Some((
            RotationCause::Scheduled,
            format!(
                "configured interval of {}h elapsed ({}h since last completed rotation)",
                system.rotation_interval_hours,
                elapsed.num_hours()
            ),
        ))
    } else {
        // Severe-threat check: recent active threats naming the system's
        // current algorithm. Sensitivity lowers the severity bar.
        let min_severity = (6i16 - system.threat_sensitivity as i16).clamp(1, 5) as u8;
        let threats = state
            .threats
            .list_recent_severe(min_severity, ChronoDuration::hours(THREAT_SCAN_WINDOW_HOURS))?;
        threats
            .iter()
            .find(|t| t.affects(&system.current_algorithm))
            .map(|t| {
                (
                    RotationCause::ThreatDetected,
                    format!("active threat '{}' affects {}", t.title, system.current_algorithm),
                )
            })
    };

    let Some((cause, reason)) = cause else {
        return Ok(false);
    };

    perform_system_rotation(state, system, cause, &reason, config).await
}

/// Rotate every active key of the system's organization, with simulated
/// processing latency and a synthesized performance-impact payload.
async fn perform_system_rotation(
    state: &Shared,
    system: &SystemConfiguration,
    cause: RotationCause,
    reason: &str,
    config: JobConfig,
) -> Result<bool, KeystoreError> {
    let latency_ms = rand::thread_rng().gen_range(config.latency_ms.0..=config.latency_ms.1);
    tokio::time::sleep(Duration::from_millis(latency_ms)).await;

    let keys = state.lifecycle.list_organization_keys(&system.organization_id).await?;
    let now = Utc::now();
    let mut last_algorithm = None;
    let mut any = false;

    for key in keys.iter().filter(|k| k.is_active(now)) {
        match state.lifecycle.rotate_key(&key.id, cause, reason).await {
            Ok(outcome) => {
                let impact = synthesize_impact(latency_ms);
                if let Err(e) = state.lifecycle.attach_impact(&outcome.record.id, impact).await {
                    tracing::warn!(record = %outcome.record.id, error = %e, "could not attach impact");
                }
                state.broadcast(WsEvent::RotationCompleted { record: outcome.record.clone() });
                last_algorithm = Some(outcome.new_key.algorithm.clone());
                any = true;
            }
            Err(e) if e.is_already_superseded() => {
                tracing::debug!(key = %key.id, "key already superseded during scan");
            }
            Err(e) => {
                tracing::warn!(key = %key.id, error = %e, "key rotation failed during scan");
            }
        }
    }

    // Keep the configuration pointing at what the system actually runs now.
    if let Some(algorithm) = last_algorithm {
        let mut updated = system.clone();
        updated.backup_algorithm = Some(system.current_algorithm.clone());
        updated.current_algorithm = algorithm;
        updated.updated_at = Utc::now();
        state.configs.put(&updated)?;
    }

    Ok(any)
}

/// Display-only numbers; nothing feeds them back into any decision.
fn synthesize_impact(latency_ms: u64) -> PerformanceImpact {
    let mut rng = rand::thread_rng();
    PerformanceImpact {
        duration_ms: latency_ms,
        cpu_spike_pct: rng.gen_range(5.0..40.0),
        memory_mb: rng.gen_range(8.0..128.0),
        network_overhead_kb: rng.gen_range(2.0..64.0),
    }
}

// ---------------------------------------------------------------------------
// Threat monitor
// ---------------------------------------------------------------------------

/// One monitor poll: maybe record a newly detected threat.
pub fn threat_probe(state: &Shared) {
    let Some(threat) = state.signal.sample_threat() else {
        return;
    };
    match state.threats.insert(&threat) {
        // First-write-wins: a duplicate id is silently ignored.
        Ok(false) => {}
        Ok(true) => {
            tracing::info!(
                id = %threat.id,
                severity = threat.severity,
                title = %threat.title,
                "threat detected"
            );
            state.audit.record(AuditEvent::system_event(AuditAction::ThreatRecorded {
                severity: threat.severity,
                category: threat.category.to_string(),
            }));
            state.broadcast(WsEvent::SecurityAlert { threat });
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not persist detected threat");
        }
    }
}

// ---------------------------------------------------------------------------
// Status broadcast
// ---------------------------------------------------------------------------

async fn broadcast_status(state: &Shared) -> Result<(), KeystoreError> {
    let now = Utc::now();
    let keys = state.lifecycle.list_keys().await?;
    let threats = state.threats.list_active()?;
    let threat_level = state.signal.global_threat_level();

    state.broadcast(WsEvent::SystemStatus {
        threat_level,
        total_keys: keys.len(),
        active_keys: keys.iter().filter(|k| k.is_active(now)).count(),
        active_threats: threats.len(),
        timestamp: now,
    });

    // Organization-scoped dashboard pushes.
    for system in state.configs.list()? {
        let org_keys: Vec<_> = keys
            .iter()
            .filter(|k| k.organization_id == system.organization_id)
            .collect();
        let mut due = 0usize;
        for key in org_keys.iter().filter(|k| k.is_active(now)) {
            if let Ok(assessment) = state.lifecycle.check_rotation_triggers(&key.id).await {
                if assessment.due {
                    due += 1;
                }
            }
        }
        state.broadcast(WsEvent::DashboardData {
            organization: system.organization_id.clone(),
            keys: org_keys.len(),
            keys_due: due,
            threat_level,
            timestamp: now,
        });
    }

    Ok(())
}
