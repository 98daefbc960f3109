//! Shared application state.

use crate::auth::UserStore;
use crate::ratelimit::RateLimiter;
use crate::ws::WsEvent;
use chrono::{DateTime, Utc};
use qshield_catalog::{AlgorithmCatalog, Requirements, Scorecard};
use qshield_keystore::{
    AuditSinkSync, ConfigStore, InMemoryAuditSink, KeyLifecycle, RotationHistoryStore,
    ThreatSignal, ThreatStore,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, RwLock};

/// One persisted recommendation run.
#[derive(Clone, Debug, Serialize)]
pub struct StoredRecommendation {
    pub id: String,
    pub user_id: String,
    pub requirements: Requirements,
    pub results: Vec<Scorecard>,
    pub created_at: DateTime<Utc>,
}

pub struct AppState {
    pub catalog: Arc<AlgorithmCatalog>,
    pub lifecycle: Arc<KeyLifecycle>,
    pub threats: Arc<dyn ThreatStore>,
    pub configs: Arc<dyn ConfigStore>,
    pub history: Arc<dyn RotationHistoryStore>,
    pub signal: Arc<dyn ThreatSignal>,
    /// Fan-out sink every component records into.
    pub audit: Arc<dyn AuditSinkSync>,
    /// In-memory capture backing the activity endpoint.
    pub activity: Arc<InMemoryAuditSink>,
    pub users: RwLock<UserStore>,
    pub recommendations: RwLock<Vec<StoredRecommendation>>,
    pub events: broadcast::Sender<WsEvent>,
    pub rate_limiter: RateLimiter,
    pub jwt_secret: String,
    /// Per-system rotation leases: a user id present here has a rotation in
    /// flight, and the scheduler skips it.
    rotation_leases: Mutex<HashSet<String>>,
}

pub type Shared = Arc<AppState>;

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<AlgorithmCatalog>,
        lifecycle: Arc<KeyLifecycle>,
        threats: Arc<dyn ThreatStore>,
        configs: Arc<dyn ConfigStore>,
        history: Arc<dyn RotationHistoryStore>,
        signal: Arc<dyn ThreatSignal>,
        audit: Arc<dyn AuditSinkSync>,
        activity: Arc<InMemoryAuditSink>,
        rate_limiter: RateLimiter,
        jwt_secret: String,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            catalog,
            lifecycle,
            threats,
            configs,
            history,
            signal,
            audit,
            activity,
            users: RwLock::new(UserStore::new()),
            recommendations: RwLock::new(Vec::new()),
            events,
            rate_limiter,
            jwt_secret,
            rotation_leases: Mutex::new(HashSet::new()),
        }
    }

    /// Best-effort event broadcast; fine if nobody is listening.
    pub fn broadcast(&self, event: WsEvent) {
        let _ = self.events.send(event);
    }

    /// Take the rotation lease for a system. `false` means a rotation is
    /// already in flight and the caller must skip this tick.
    pub fn try_acquire_rotation_lease(&self, user_id: &str) -> bool {
        self.rotation_leases.lock().unwrap().insert(user_id.to_string())
    }

    pub fn release_rotation_lease(&self, user_id: &str) {
        self.rotation_leases.lock().unwrap().remove(user_id);
    }
}
