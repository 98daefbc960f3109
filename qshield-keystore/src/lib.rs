//! # QuantumShield Keystore
//!
//! Adaptive key lifecycle management for the QuantumShield platform.
//!
//! Keys are created against the algorithm catalog with per-purpose lifetimes
//! and rotation schedules, tightened automatically for non-quantum
//! algorithms. Rotation always prefers a quantum-resistant successor, keeps
//! the superseded key on a 7-day grace expiration, and appends to an
//! append-only rotation history. Threat signals come from a pluggable
//! [`ThreatSignal`] source; repositories are injected via the store traits.
//!
//! ## Quick Start
//!
//! ```ignore
//! use qshield_keystore::*;
//! use qshield_catalog::{AlgorithmCatalog, KeyPurpose};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let lifecycle = KeyLifecycle::new(
//!     Arc::new(AlgorithmCatalog::builtin()),
//!     Arc::new(InMemoryKeyStore::new()),
//!     Arc::new(InMemoryHistoryStore::new()),
//!     Arc::new(SimulatedThreatFeed::from_entropy()),
//!     Arc::new(TracingAuditSink),
//! );
//!
//! let key = lifecycle
//!     .create_key("RSA-2048", None, KeyPurpose::Signing, "acme")
//!     .await
//!     .unwrap();
//! let outcome = lifecycle
//!     .rotate_key(&key.id, RotationCause::Manual, "migration test")
//!     .await
//!     .unwrap();
//! assert!(outcome.new_key.quantum_resistant);
//! # });
//! ```

pub mod audit;
pub mod error;
pub mod lifecycle;
pub mod schedule;
pub mod store;
pub mod threat;
pub mod types;

// Re-export main types for convenience
pub use audit::{AuditAction, AuditEvent, AuditSinkSync, FanoutAuditSink, InMemoryAuditSink, TracingAuditSink};
pub use error::{CreateError, KeystoreError, RotateError};
pub use lifecycle::{KeyLifecycle, RotationAssessment, RotationOutcome, UsageOutcome};
pub use store::{
    ConfigStore, FileKeyStore, InMemoryConfigStore, InMemoryHistoryStore, InMemoryKeyStore,
    InMemoryThreatStore, KeyStore, RotationHistoryStore, ThreatStore,
};
pub use threat::{
    FixedThreatSignal, SimulatedThreatFeed, ThreatCategory, ThreatIntelligence, ThreatSignal,
};
pub use types::{
    KeyId, ManagedKey, PerformanceImpact, PerformanceSample, RotationCause, RotationRecord,
    RotationSchedule, RotationStatus, RotationTrigger, SystemConfiguration, TriggerKind,
    UsageStats, USAGE_WINDOW,
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use qshield_catalog::{AlgorithmCatalog, KeyPurpose};
    use std::sync::Arc;

    struct Fixture {
        lifecycle: KeyLifecycle,
        keys: Arc<InMemoryKeyStore>,
        history: Arc<InMemoryHistoryStore>,
        audit: Arc<InMemoryAuditSink>,
    }

    fn fixture_with_signal(signal: Arc<dyn ThreatSignal>) -> Fixture {
        let keys = Arc::new(InMemoryKeyStore::new());
        let history = Arc::new(InMemoryHistoryStore::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let lifecycle = KeyLifecycle::new(
            Arc::new(AlgorithmCatalog::builtin()),
            keys.clone(),
            history.clone(),
            signal,
            audit.clone(),
        );
        Fixture { lifecycle, keys, history, audit }
    }

    fn fixture() -> Fixture {
        // A calm signal: below the 0.7 threat trigger, no compliance issues.
        fixture_with_signal(Arc::new(FixedThreatSignal { level: 0.2, compliance: false }))
    }

    // === Key creation ===

    #[tokio::test]
    async fn create_key_picks_largest_size_by_default() {
        let f = fixture();
        let key = f
            .lifecycle
            .create_key("CRYSTALS-Kyber", None, KeyPurpose::Encryption, "acme")
            .await
            .unwrap();
        assert_eq!(key.key_size, 1024);
        assert_eq!(key.algorithm, "CRYSTALS-Kyber");
        assert!(key.quantum_resistant);
    }

    #[tokio::test]
    async fn create_key_upholds_time_invariants() {
        let f = fixture();
        for purpose in [KeyPurpose::Encryption, KeyPurpose::Signing, KeyPurpose::KeyExchange] {
            let alg = match purpose {
                KeyPurpose::Signing => "CRYSTALS-Dilithium",
                _ => "CRYSTALS-Kyber",
            };
            let key = f.lifecycle.create_key(alg, None, purpose, "acme").await.unwrap();
            assert!(key.expires_at > key.created_at);
            assert!(key.schedule.next_rotation >= key.created_at);
        }
    }

    #[tokio::test]
    async fn quantum_keys_outlive_classical_keys() {
        let f = fixture();
        let quantum = f
            .lifecycle
            .create_key("CRYSTALS-Dilithium", None, KeyPurpose::Signing, "acme")
            .await
            .unwrap();
        let classical = f
            .lifecycle
            .create_key("RSA-2048", None, KeyPurpose::Signing, "acme")
            .await
            .unwrap();

        let quantum_lifetime = quantum.expires_at - quantum.created_at;
        let classical_lifetime = classical.expires_at - classical.created_at;
        assert!(quantum_lifetime > classical_lifetime);
        // And the classical schedule is tighter.
        assert!(classical.schedule.interval_hours < quantum.schedule.interval_hours);
        assert!(classical.schedule.adaptive);
    }

    #[tokio::test]
    async fn create_key_rejects_unknown_algorithm_and_bad_size() {
        let f = fixture();
        let err = f
            .lifecycle
            .create_key("ROT13", None, KeyPurpose::Encryption, "acme")
            .await
            .unwrap_err();
        assert!(matches!(err.0, KeystoreError::UnknownAlgorithm(_)));

        let err = f
            .lifecycle
            .create_key("CRYSTALS-Kyber", Some(4096), KeyPurpose::Encryption, "acme")
            .await
            .unwrap_err();
        assert!(matches!(err.0, KeystoreError::UnsupportedKeySize { .. }));
    }

    #[tokio::test]
    async fn create_key_rejects_purpose_mismatch() {
        let f = fixture();
        let err = f
            .lifecycle
            .create_key("CRYSTALS-Dilithium", None, KeyPurpose::KeyExchange, "acme")
            .await
            .unwrap_err();
        assert!(matches!(err.0, KeystoreError::AlgorithmPurposeMismatch { .. }));
    }

    #[tokio::test]
    async fn enterprise_organizations_carry_the_compliance_trigger() {
        let f = fixture();
        let key = f
            .lifecycle
            .create_key("CRYSTALS-Kyber", None, KeyPurpose::Encryption, "globex-enterprise")
            .await
            .unwrap();
        assert!(key.schedule.trigger(TriggerKind::ComplianceRequirement).is_some());
    }

    // === Rotation ===

    #[tokio::test]
    async fn rotating_a_classical_signing_key_lands_on_a_pq_signature_scheme() {
        let f = fixture();
        let key = f
            .lifecycle
            .create_key("RSA-2048", None, KeyPurpose::Signing, "acme")
            .await
            .unwrap();
        let outcome = f
            .lifecycle
            .rotate_key(&key.id, RotationCause::Manual, "operator request")
            .await
            .unwrap();

        let allowed = ["CRYSTALS-Dilithium", "FALCON", "SPHINCS+"];
        assert!(allowed.contains(&outcome.new_key.algorithm.as_str()));
        assert!(outcome.new_key.quantum_resistant);
        // Largest cataloged size for the successor.
        assert_eq!(outcome.new_key.key_size, 2592);
    }

    #[tokio::test]
    async fn rotation_soft_decommissions_the_old_key() {
        let f = fixture();
        let key = f
            .lifecycle
            .create_key("RSA-2048", None, KeyPurpose::Signing, "acme")
            .await
            .unwrap();
        let outcome = f.lifecycle.rotate_key(&key.id, RotationCause::Manual, "test").await.unwrap();

        let old = f.lifecycle.get_key(&key.id).await.unwrap();
        assert_eq!(old.superseded_by, Some(outcome.new_key.id.clone()));
        assert!(old.rotated_at.is_some());
        // Grace expiration: roughly a week out, well short of the original.
        let grace = old.expires_at - chrono::Utc::now();
        assert!(grace <= chrono::Duration::days(7));
        assert!(grace > chrono::Duration::days(6));
    }

    #[tokio::test]
    async fn rotation_history_is_append_only_with_increasing_timestamps() {
        let f = fixture();
        let key = f
            .lifecycle
            .create_key("RSA-2048", None, KeyPurpose::Signing, "acme")
            .await
            .unwrap();

        let mut current = key.id.clone();
        for _ in 0..3 {
            let outcome = f
                .lifecycle
                .rotate_key(&current, RotationCause::Manual, "chain")
                .await
                .unwrap();
            current = outcome.new_key.id;
        }

        let records = f.history.list().unwrap();
        assert_eq!(records.len(), 3);
        for r in &records {
            assert_eq!(r.status, RotationStatus::Completed);
            assert!(r.new_key_id.is_some());
        }
        for pair in records.windows(2) {
            assert!(pair[1].started_at > pair[0].started_at);
        }
    }

    #[tokio::test]
    async fn rotating_a_missing_key_fails() {
        let f = fixture();
        let err = f
            .lifecycle
            .rotate_key(&KeyId::new("does-not-exist"), RotationCause::Manual, "test")
            .await
            .unwrap_err();
        assert!(matches!(err.0, KeystoreError::KeyNotFound(_)));
    }

    #[tokio::test]
    async fn second_rotation_of_the_same_key_is_rejected() {
        let f = fixture();
        let key = f
            .lifecycle
            .create_key("RSA-2048", None, KeyPurpose::Signing, "acme")
            .await
            .unwrap();
        f.lifecycle.rotate_key(&key.id, RotationCause::Manual, "first").await.unwrap();
        let err = f
            .lifecycle
            .rotate_key(&key.id, RotationCause::Manual, "second")
            .await
            .unwrap_err();
        assert!(err.is_already_superseded());
    }

    #[tokio::test]
    async fn concurrent_rotations_serialize_to_one_successor() {
        let f = Arc::new(fixture());
        let key = f
            .lifecycle
            .create_key("RSA-2048", None, KeyPurpose::Signing, "acme")
            .await
            .unwrap();

        let a = {
            let f = f.clone();
            let id = key.id.clone();
            tokio::spawn(async move {
                f.lifecycle.rotate_key(&id, RotationCause::Manual, "racer a").await
            })
        };
        let b = {
            let f = f.clone();
            let id = key.id.clone();
            tokio::spawn(async move {
                f.lifecycle.rotate_key(&id, RotationCause::Manual, "racer b").await
            })
        };

        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        let successes = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one racer may win");
        let loser = if ra.is_err() { ra } else { rb };
        assert!(loser.unwrap_err().is_already_superseded());

        let completed = f
            .history
            .list()
            .unwrap()
            .into_iter()
            .filter(|r| r.status == RotationStatus::Completed)
            .count();
        assert_eq!(completed, 1);
    }

    #[tokio::test]
    async fn rotation_falls_back_to_the_current_algorithm_without_quantum_options() {
        // A catalog with only classical signature algorithms.
        let builtin = AlgorithmCatalog::builtin();
        let rsa = builtin.get("RSA-2048").unwrap().clone();
        let catalog = Arc::new(AlgorithmCatalog::new(vec![rsa]));

        let keys = Arc::new(InMemoryKeyStore::new());
        let lifecycle = KeyLifecycle::new(
            catalog,
            keys,
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(FixedThreatSignal { level: 0.1, compliance: false }),
            Arc::new(InMemoryAuditSink::new()),
        );

        let key = lifecycle
            .create_key("RSA-2048", None, KeyPurpose::Signing, "acme")
            .await
            .unwrap();
        let outcome =
            lifecycle.rotate_key(&key.id, RotationCause::Manual, "no pq available").await.unwrap();
        assert_eq!(outcome.new_key.algorithm, "RSA-2048");
    }

    // === Trigger assessment ===

    #[tokio::test]
    async fn calm_conditions_mean_no_rotation_due() {
        let f = fixture();
        let key = f
            .lifecycle
            .create_key("CRYSTALS-Kyber", None, KeyPurpose::Encryption, "acme")
            .await
            .unwrap();
        let assessment = f.lifecycle.check_rotation_triggers(&key.id).await.unwrap();
        assert!(!assessment.due);
        assert!(assessment.reasons.is_empty());
    }

    #[tokio::test]
    async fn high_threat_level_fires_the_threat_trigger() {
        let f = fixture_with_signal(Arc::new(FixedThreatSignal { level: 0.9, compliance: false }));
        let key = f
            .lifecycle
            .create_key("CRYSTALS-Kyber", None, KeyPurpose::Encryption, "acme")
            .await
            .unwrap();
        let assessment = f.lifecycle.check_rotation_triggers(&key.id).await.unwrap();
        assert!(assessment.due);
        assert_eq!(assessment.cause, Some(RotationCause::ThreatDetected));
    }

    #[tokio::test]
    async fn compliance_issues_only_fire_for_enterprise_tenants() {
        let f = fixture_with_signal(Arc::new(FixedThreatSignal { level: 0.1, compliance: true }));
        let plain = f
            .lifecycle
            .create_key("CRYSTALS-Kyber", None, KeyPurpose::Encryption, "acme")
            .await
            .unwrap();
        let assessment = f.lifecycle.check_rotation_triggers(&plain.id).await.unwrap();
        assert!(!assessment.due);

        let enterprise = f
            .lifecycle
            .create_key("CRYSTALS-Kyber", None, KeyPurpose::Encryption, "acme-enterprise")
            .await
            .unwrap();
        let assessment = f.lifecycle.check_rotation_triggers(&enterprise.id).await.unwrap();
        assert!(assessment.due);
        assert_eq!(assessment.cause, Some(RotationCause::Compliance));
    }

    // === Usage ===

    #[tokio::test]
    async fn usage_updates_accumulate_and_cap_the_window() {
        let f = fixture();
        let key = f
            .lifecycle
            .create_key("CRYSTALS-Kyber", None, KeyPurpose::Encryption, "acme")
            .await
            .unwrap();
        for i in 0..5u64 {
            f.lifecycle.update_key_usage(&key.id, "encrypt", 1024 * i).await.unwrap();
        }
        let key = f.lifecycle.get_key(&key.id).await.unwrap();
        assert_eq!(key.usage.operation_count, 5);
        assert_eq!(key.usage.samples.len(), 5);
        assert!(key.usage.last_used.is_some());
    }

    #[tokio::test]
    async fn crossing_the_usage_budget_rotates_synchronously() {
        let f = fixture();
        let key = f
            .lifecycle
            .create_key("CRYSTALS-Kyber", None, KeyPurpose::Encryption, "acme")
            .await
            .unwrap();

        // Shrink the budget so the third operation crosses it.
        let mut tight = f.keys.get(&key.id).unwrap().unwrap();
        for trigger in &mut tight.schedule.triggers {
            if trigger.kind == TriggerKind::UsageCount {
                trigger.threshold = 3.0;
            }
        }
        f.keys.put(&tight).unwrap();

        let first = f.lifecycle.update_key_usage(&key.id, "encrypt", 64).await.unwrap();
        assert!(first.rotation.is_none());
        f.lifecycle.update_key_usage(&key.id, "encrypt", 64).await.unwrap();
        let third = f.lifecycle.update_key_usage(&key.id, "encrypt", 64).await.unwrap();

        let rotation = third.rotation.expect("third operation crosses the budget");
        assert_eq!(rotation.record.cause, RotationCause::UsageLimit);
        assert_eq!(third.key.superseded_by, Some(rotation.new_key.id.clone()));
    }

    // === Audit ===

    #[tokio::test]
    async fn lifecycle_operations_leave_an_audit_trail() {
        let f = fixture();
        let key = f
            .lifecycle
            .create_key("RSA-2048", None, KeyPurpose::Signing, "acme")
            .await
            .unwrap();
        f.lifecycle.rotate_key(&key.id, RotationCause::Manual, "test").await.unwrap();

        let events = f.audit.events_for_key(&key.id);
        assert!(events.iter().any(|e| matches!(e.action, AuditAction::KeyCreated { .. })));
        assert!(events.iter().any(|e| matches!(e.action, AuditAction::KeyRotated { .. })));
    }

    // === File-backed store ===

    #[tokio::test]
    async fn file_key_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Arc::new(FileKeyStore::new(dir.path()).unwrap());
        let lifecycle = KeyLifecycle::new(
            Arc::new(AlgorithmCatalog::builtin()),
            keys.clone(),
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(FixedThreatSignal { level: 0.1, compliance: false }),
            Arc::new(InMemoryAuditSink::new()),
        );

        let key = lifecycle
            .create_key("CRYSTALS-Dilithium", Some(1952), KeyPurpose::Signing, "acme")
            .await
            .unwrap();
        let loaded = keys.get(&key.id).unwrap().unwrap();
        assert_eq!(loaded.algorithm, "CRYSTALS-Dilithium");
        assert_eq!(loaded.key_size, 1952);
        assert_eq!(keys.list_by_organization("acme").unwrap().len(), 1);
    }
}
