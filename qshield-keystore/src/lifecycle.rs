//! The key lifecycle manager: creation, trigger assessment, rotation, and
//! usage tracking.
//!
//! Rotation is atomic per key: a per-key async mutex serializes concurrent
//! rotations, and the loser observes [`KeystoreError::AlreadySuperseded`]
//! instead of producing a second successor.

use crate::audit::{AuditAction, AuditEvent, AuditSinkSync};
use crate::error::{CreateError, KeystoreError, RotateError};
use crate::schedule;
use crate::store::{KeyStore, RotationHistoryStore};
use crate::threat::ThreatSignal;
use crate::types::{
    rotation_record_id, KeyId, ManagedKey, PerformanceImpact, RotationCause, RotationRecord,
    RotationStatus, TriggerKind, UsageStats,
};
use chrono::{DateTime, Utc};
use qshield_catalog::{AlgorithmCatalog, KeyPurpose};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Assessment and outcome types
// ---------------------------------------------------------------------------

/// Result of evaluating a key's rotation triggers.
#[derive(Clone, Debug, Serialize)]
pub struct RotationAssessment {
    pub due: bool,
    /// Human-readable reason per fired trigger.
    pub reasons: Vec<String>,
    /// Global threat level observed during the assessment.
    pub threat_level: f64,
    /// Cause corresponding to the first fired trigger.
    pub cause: Option<RotationCause>,
}

/// A completed rotation: the superseded key, its successor, and the history
/// row that tracked it.
#[derive(Clone, Debug)]
pub struct RotationOutcome {
    pub old_key: ManagedKey,
    pub new_key: ManagedKey,
    pub record: RotationRecord,
}

/// Result of a usage update, including any rotation it triggered.
#[derive(Clone, Debug)]
pub struct UsageOutcome {
    pub key: ManagedKey,
    pub assessment: RotationAssessment,
    pub rotation: Option<RotationOutcome>,
}

// ---------------------------------------------------------------------------
// Lifecycle manager
// ---------------------------------------------------------------------------

pub struct KeyLifecycle {
    catalog: Arc<AlgorithmCatalog>,
    keys: Arc<dyn KeyStore>,
    history: Arc<dyn RotationHistoryStore>,
    threat: Arc<dyn ThreatSignal>,
    audit: Arc<dyn AuditSinkSync>,
    /// Per-key rotation guards. Entries are created on demand and kept for
    /// the process lifetime; superseded keys never rotate again.
    rotation_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLifecycle {
    pub fn new(
        catalog: Arc<AlgorithmCatalog>,
        keys: Arc<dyn KeyStore>,
        history: Arc<dyn RotationHistoryStore>,
        threat: Arc<dyn ThreatSignal>,
        audit: Arc<dyn AuditSinkSync>,
    ) -> Self {
        Self {
            catalog,
            keys,
            history,
            threat,
            audit,
            rotation_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &AlgorithmCatalog {
        &self.catalog
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create a new managed key.
    ///
    /// Lifetime and rotation interval come from the per-purpose tables,
    /// tightened for non-quantum algorithms. `key_size: None` picks the
    /// largest cataloged size.
    pub async fn create_key(
        &self,
        algorithm: &str,
        key_size: Option<u32>,
        purpose: KeyPurpose,
        organization_id: &str,
    ) -> Result<ManagedKey, CreateError> {
        let profile = self
            .catalog
            .get(algorithm)
            .ok_or_else(|| KeystoreError::UnknownAlgorithm(algorithm.to_string()))?;
        if !profile.suits_purpose(purpose) {
            return Err(KeystoreError::AlgorithmPurposeMismatch {
                algorithm: profile.name.clone(),
                purpose: purpose.to_string(),
            }
            .into());
        }
        let key_size = match key_size {
            Some(size) if profile.supports_key_size(size) => size,
            Some(size) => {
                return Err(KeystoreError::UnsupportedKeySize {
                    algorithm: profile.name.clone(),
                    size,
                }
                .into())
            }
            None => profile.max_key_size(),
        };

        let now = Utc::now();
        let key = ManagedKey {
            id: KeyId::generate(),
            algorithm: profile.name.clone(),
            key_size,
            purpose,
            organization_id: organization_id.to_string(),
            quantum_resistant: profile.quantum_resistant,
            created_at: now,
            expires_at: now + schedule::lifetime(purpose, profile.quantum_resistant),
            schedule: schedule::build_schedule(
                purpose,
                profile.quantum_resistant,
                organization_id,
                now,
            ),
            usage: UsageStats::default(),
            superseded_by: None,
            rotated_at: None,
        };

        self.keys.put(&key)?;
        self.audit.record(AuditEvent::key_event(
            &key.id,
            organization_id,
            AuditAction::KeyCreated {
                algorithm: key.algorithm.clone(),
                purpose: purpose.to_string(),
            },
        ));

        Ok(key)
    }

    // -----------------------------------------------------------------------
    // Retrieval
    // -----------------------------------------------------------------------

    pub async fn get_key(&self, id: &KeyId) -> Result<ManagedKey, KeystoreError> {
        self.keys
            .get(id)?
            .ok_or_else(|| KeystoreError::KeyNotFound(id.clone()))
    }

    pub async fn list_keys(&self) -> Result<Vec<ManagedKey>, KeystoreError> {
        self.keys.list()
    }

    pub async fn list_organization_keys(
        &self,
        organization_id: &str,
    ) -> Result<Vec<ManagedKey>, KeystoreError> {
        self.keys.list_by_organization(organization_id)
    }

    // -----------------------------------------------------------------------
    // Trigger assessment
    // -----------------------------------------------------------------------

    /// Evaluate every enabled trigger on a key.
    pub async fn check_rotation_triggers(
        &self,
        id: &KeyId,
    ) -> Result<RotationAssessment, KeystoreError> {
        let key = self.get_key(id).await?;
        let assessment = self.assess(&key, Utc::now());
        self.audit.record(AuditEvent::key_event(
            id,
            &key.organization_id,
            AuditAction::TriggersAssessed {
                due: assessment.due,
                reasons: assessment.reasons.clone(),
            },
        ));
        Ok(assessment)
    }

    fn assess(&self, key: &ManagedKey, now: DateTime<Utc>) -> RotationAssessment {
        let threat_level = self.threat.global_threat_level();
        let mut reasons = Vec::new();
        let mut cause = None;

        for trigger in &key.schedule.triggers {
            if !trigger.enabled {
                continue;
            }
            match trigger.kind {
                TriggerKind::TimeBased => {
                    if now >= key.schedule.next_rotation {
                        reasons.push(format!(
                            "rotation interval of {}h elapsed",
                            key.schedule.interval_hours
                        ));
                        cause.get_or_insert(RotationCause::TimeElapsed);
                    }
                }
                TriggerKind::UsageCount => {
                    if key.usage.operation_count as f64 >= trigger.threshold {
                        reasons.push(format!(
                            "operation count {} reached budget {}",
                            key.usage.operation_count, trigger.threshold as u64
                        ));
                        cause.get_or_insert(RotationCause::UsageLimit);
                    }
                }
                TriggerKind::ThreatLevel => {
                    if threat_level >= trigger.threshold {
                        reasons.push(format!(
                            "global threat level {:.2} at or above {:.2}",
                            threat_level, trigger.threshold
                        ));
                        cause.get_or_insert(RotationCause::ThreatDetected);
                    }
                }
                TriggerKind::ComplianceRequirement => {
                    if self.threat.compliance_issue() {
                        reasons.push("compliance issue flagged for organization".to_string());
                        cause.get_or_insert(RotationCause::Compliance);
                    }
                }
            }
        }

        RotationAssessment { due: !reasons.is_empty(), reasons, threat_level, cause }
    }

    // -----------------------------------------------------------------------
    // Rotation
    // -----------------------------------------------------------------------

    /// Rotate a key: create a successor on the preferred quantum-resistant
    /// algorithm for the purpose (largest cataloged key size), soft-decommission
    /// the old key with a grace expiration, and append a history row.
    pub async fn rotate_key(
        &self,
        id: &KeyId,
        cause: RotationCause,
        reason: &str,
    ) -> Result<RotationOutcome, RotateError> {
        let guard = self.rotation_guard(id);
        let _held = guard.lock().await;

        // Re-read under the lock: the previous holder may have rotated it.
        let old_key = self.get_key(id).await.map_err(RotateError)?;
        if old_key.superseded_by.is_some() {
            return Err(RotateError(KeystoreError::AlreadySuperseded(id.clone())));
        }

        let successor = self.successor_profile(&old_key)?;
        let now = Utc::now();

        let mut record = RotationRecord {
            id: rotation_record_id(),
            organization_id: old_key.organization_id.clone(),
            key_id: old_key.id.clone(),
            new_key_id: None,
            old_algorithm: old_key.algorithm.clone(),
            new_algorithm: None,
            cause,
            status: RotationStatus::Initiated,
            reason: reason.to_string(),
            started_at: now,
            completed_at: None,
            performance_impact: None,
        };
        self.history.append(&record).map_err(RotateError)?;

        record.status = RotationStatus::InProgress;
        self.history.update(&record).map_err(RotateError)?;

        let new_key = match self
            .create_key(&successor, None, old_key.purpose, &old_key.organization_id)
            .await
        {
            Ok(key) => key,
            Err(CreateError(e)) => {
                self.fail_record(&mut record, &e);
                return Err(RotateError(e));
            }
        };

        let mut superseded = old_key.clone();
        superseded.superseded_by = Some(new_key.id.clone());
        superseded.rotated_at = Some(now);
        superseded.expires_at = Utc::now() + schedule::rotation_grace();
        if let Err(e) = self.keys.put(&superseded) {
            self.fail_record(&mut record, &e);
            return Err(RotateError(e));
        }

        record.status = RotationStatus::Completed;
        record.completed_at = Some(Utc::now());
        record.new_key_id = Some(new_key.id.clone());
        record.new_algorithm = Some(new_key.algorithm.clone());
        self.history.update(&record).map_err(RotateError)?;

        self.audit.record(AuditEvent::key_event(
            id,
            &superseded.organization_id,
            AuditAction::KeyRotated { cause, new_key_id: new_key.id.to_string() },
        ));

        Ok(RotationOutcome { old_key: superseded, new_key, record })
    }

    /// The successor algorithm name: the purpose's preferred quantum-resistant
    /// profile, or the current algorithm when no quantum option is cataloged.
    fn successor_profile(&self, key: &ManagedKey) -> Result<String, RotateError> {
        if let Some(profile) = self.catalog.preferred_quantum(key.purpose) {
            return Ok(profile.name.clone());
        }
        self.catalog
            .get(&key.algorithm)
            .map(|p| p.name.clone())
            .ok_or_else(|| RotateError(KeystoreError::UnknownAlgorithm(key.algorithm.clone())))
    }

    fn fail_record(&self, record: &mut RotationRecord, error: &KeystoreError) {
        record.status = RotationStatus::Failed;
        record.completed_at = Some(Utc::now());
        record.reason = format!("{} (failed: {})", record.reason, error);
        if let Err(e) = self.history.update(record) {
            tracing::warn!(record = %record.id, error = %e, "could not mark rotation failed");
        }
        self.audit.record(
            AuditEvent::key_event(
                &record.key_id,
                &record.organization_id,
                AuditAction::RotationFailed { reason: error.to_string() },
            )
            .with_failure(),
        );
    }

    fn rotation_guard(&self, id: &KeyId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.rotation_locks.lock().unwrap();
        locks
            .entry(id.as_str().to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Attach a synthesized performance-impact payload to a history row.
    pub async fn attach_impact(
        &self,
        record_id: &str,
        impact: PerformanceImpact,
    ) -> Result<RotationRecord, KeystoreError> {
        let mut record = self
            .history
            .get(record_id)?
            .ok_or_else(|| KeystoreError::HistoryNotFound(record_id.to_string()))?;
        record.performance_impact = Some(impact);
        self.history.update(&record)?;
        Ok(record)
    }

    pub async fn rotation_history(&self) -> Result<Vec<RotationRecord>, KeystoreError> {
        self.history.list()
    }

    pub async fn organization_history(
        &self,
        organization_id: &str,
    ) -> Result<Vec<RotationRecord>, KeystoreError> {
        self.history.list_for_organization(organization_id)
    }

    // -----------------------------------------------------------------------
    // Usage
    // -----------------------------------------------------------------------

    /// Record one operation against a key and immediately re-check its
    /// triggers. A due verdict rotates synchronously.
    pub async fn update_key_usage(
        &self,
        id: &KeyId,
        operation: &str,
        data_size_bytes: u64,
    ) -> Result<UsageOutcome, KeystoreError> {
        let mut key = self.get_key(id).await?;
        let now = Utc::now();
        key.usage.record(operation, data_size_bytes, now);
        self.keys.put(&key)?;
        self.audit.record(AuditEvent::key_event(
            id,
            &key.organization_id,
            AuditAction::UsageRecorded { operation: operation.to_string() },
        ));

        let assessment = self.assess(&key, now);
        let rotation = if assessment.due && key.superseded_by.is_none() {
            let cause = assessment.cause.unwrap_or(RotationCause::Manual);
            let reason = assessment.reasons.join("; ");
            match self.rotate_key(id, cause, &reason).await {
                Ok(outcome) => Some(outcome),
                Err(e) if e.is_already_superseded() => {
                    tracing::warn!(key = %id, "usage-triggered rotation lost the race");
                    None
                }
                Err(RotateError(e)) => return Err(e),
            }
        } else {
            None
        };

        let key = self.get_key(id).await?;
        Ok(UsageOutcome { key, assessment, rotation })
    }
}
