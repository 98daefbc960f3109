//! # QuantumShield API
//!
//! HTTP + WebSocket surface over the catalog and keystore: JWT-authenticated
//! REST routes, clearance-gated fields, the consolidated background rotation
//! scheduler, and the threat monitor.

pub mod auth;
pub mod ratelimit;
pub mod response;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod ws;

use axum::routing::{get, post};
use axum::{middleware, Router};
use qshield_catalog::AlgorithmCatalog;
use qshield_keystore::{
    AuditSinkSync, FanoutAuditSink, FileKeyStore, InMemoryAuditSink, InMemoryConfigStore,
    InMemoryHistoryStore, InMemoryKeyStore, InMemoryThreatStore, KeyLifecycle, KeyStore,
    SimulatedThreatFeed, ThreatSignal, TracingAuditSink,
};
use ratelimit::RateLimiter;
use state::{AppState, Shared};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Wiring options for [`build_state`].
pub struct ApiOptions {
    pub jwt_secret: String,
    pub rate_rps: f64,
    pub rate_burst: u32,
    /// Persist keys under this directory; in-memory when unset.
    pub data_dir: Option<String>,
    /// Seed the simulated threat feed for deterministic behavior (tests).
    pub threat_seed: Option<u64>,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            jwt_secret: "development-secret-do-not-deploy".into(),
            rate_rps: 20.0,
            rate_burst: 50,
            data_dir: None,
            threat_seed: None,
        }
    }
}

/// Assemble the full application state: catalog, stores, threat feed, audit
/// fan-out, lifecycle manager, and rate limiter.
pub fn build_state(options: ApiOptions) -> Shared {
    let catalog = Arc::new(AlgorithmCatalog::builtin());

    let keys: Arc<dyn KeyStore> = match &options.data_dir {
        Some(dir) => {
            let keys_dir = format!("{}/keys", dir);
            Arc::new(FileKeyStore::new(&keys_dir).expect("failed to init key storage"))
        }
        None => Arc::new(InMemoryKeyStore::new()),
    };
    let history = Arc::new(InMemoryHistoryStore::new());
    let threats = Arc::new(InMemoryThreatStore::new());
    let configs = Arc::new(InMemoryConfigStore::new());

    let signal: Arc<dyn ThreatSignal> = match options.threat_seed {
        Some(seed) => Arc::new(SimulatedThreatFeed::seeded(seed)),
        None => Arc::new(SimulatedThreatFeed::from_entropy()),
    };

    let activity = Arc::new(InMemoryAuditSink::new());
    let audit: Arc<dyn AuditSinkSync> = Arc::new(FanoutAuditSink::new(vec![
        Arc::new(TracingAuditSink),
        activity.clone(),
    ]));

    let lifecycle = Arc::new(KeyLifecycle::new(
        catalog.clone(),
        keys,
        history.clone(),
        signal.clone(),
        audit.clone(),
    ));

    Arc::new(AppState::new(
        catalog,
        lifecycle,
        threats,
        configs,
        history,
        signal,
        audit,
        activity,
        RateLimiter::new(options.rate_rps, options.rate_burst),
        options.jwt_secret,
    ))
}

/// Build the router with auth, rate limiting, and CORS layers applied.
pub fn build_router(state: Shared) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/whoami", get(auth::whoami))
        .route("/api/algorithms", get(routes::list_algorithms))
        .route("/api/algorithms/recommend", post(routes::recommend_algorithms))
        .route("/api/algorithms/compare", post(routes::compare_algorithms))
        .route("/api/algorithms/:id", get(routes::get_algorithm))
        .route("/api/keys", get(routes::list_keys).post(routes::create_key))
        .route("/api/keys/:id", get(routes::get_key))
        .route("/api/keys/:id/status", get(routes::key_status))
        .route("/api/keys/:id/rotate", post(routes::rotate_key))
        .route("/api/keys/:id/usage", post(routes::key_usage))
        .route("/api/threats", get(routes::list_threats).post(routes::report_threat))
        .route("/api/threats/:id/deactivate", post(routes::deactivate_threat))
        .route("/api/config", get(routes::get_config).put(routes::put_config))
        .route("/api/recommendations", get(routes::list_recommendations))
        .route("/api/rotations", get(routes::list_rotations))
        .route("/api/stats", get(routes::global_stats))
        .route("/api/activity", get(routes::list_activity))
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), ratelimit::rate_limit_middleware))
        .layer(cors)
        .with_state(state)
}
