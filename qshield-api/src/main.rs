//! QuantumShield API Server
//!
//! Management plane for post-quantum cryptography: algorithm catalog and
//! scoring, adaptive key rotation, threat monitoring, and a dashboard event
//! stream.
//!
//! Configuration (environment variables):
//!   QSHIELD_PORT                        - Listen port (default: 3000)
//!   QSHIELD_DATA_DIR                    - Key storage directory (in-memory when unset)
//!   QSHIELD_JWT_SECRET                  - HMAC secret for bearer tokens (random per-process when unset)
//!   QSHIELD_LOG_FORMAT                  - "json" for structured logging, "pretty" for dev
//!   QSHIELD_RATE_LIMIT_RPS              - Requests per second per IP (default: 20)
//!   QSHIELD_RATE_LIMIT_BURST            - Burst capacity per IP (default: 50)
//!   QSHIELD_SCHEDULER_INTERVAL_SECS     - Rotation scan cadence (default: 300)
//!   QSHIELD_THREAT_SCAN_INTERVAL_SECS   - Threat monitor cadence (default: 3600)
//!   QSHIELD_SEED_DEMO                   - Set to "true" to seed a demo tenant on startup

use qshield_api::scheduler::{spawn_background_jobs, JobConfig};
use qshield_api::{build_router, build_state, ApiOptions};
use qshield_catalog::KeyPurpose;
use qshield_keystore::{ConfigStore, KeyId};
use std::net::SocketAddr;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let log_format = std::env::var("QSHIELD_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "qshield_api=info,qshield_keystore=info,tower_http=info".into());
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let port: u16 = env_parse("QSHIELD_PORT", 3000);
    let rate_rps: f64 = env_parse("QSHIELD_RATE_LIMIT_RPS", 20.0);
    let rate_burst: u32 = env_parse("QSHIELD_RATE_LIMIT_BURST", 50);
    let scan_secs: u64 = env_parse("QSHIELD_SCHEDULER_INTERVAL_SECS", 300);
    let threat_secs: u64 = env_parse("QSHIELD_THREAT_SCAN_INTERVAL_SECS", 3600);
    let data_dir = std::env::var("QSHIELD_DATA_DIR").ok();
    let seed_demo = std::env::var("QSHIELD_SEED_DEMO").map(|v| v == "true").unwrap_or(false);

    let jwt_secret = match std::env::var("QSHIELD_JWT_SECRET") {
        Ok(secret) if !secret.trim().is_empty() => secret,
        _ => {
            tracing::warn!(
                "QSHIELD_JWT_SECRET not set — using a random per-process secret; \
                 tokens will not survive a restart"
            );
            KeyId::generate().to_string()
        }
    };

    let state = build_state(ApiOptions {
        jwt_secret,
        rate_rps,
        rate_burst,
        data_dir: data_dir.clone(),
        threat_seed: None,
    });

    if seed_demo {
        seed_demo_tenant(&state).await;
    }

    spawn_background_jobs(
        state.clone(),
        JobConfig {
            scan_interval: Duration::from_secs(scan_secs),
            threat_interval: Duration::from_secs(threat_secs),
            ..JobConfig::default()
        },
    );

    let app = build_router(state);

    tracing::info!(port, rate_rps, rate_burst, scan_secs, threat_secs, "starting QuantumShield API");
    if let Some(dir) = data_dir {
        tracing::info!(data_dir = %dir, "key storage directory");
    }

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("failed to bind listener");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server error");
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Seed one demo tenant: a couple of keys mid-migration and an auto-rotating
/// system configuration.
async fn seed_demo_tenant(state: &qshield_api::state::Shared) {
    let org = "demo-enterprise";

    let signing = state
        .lifecycle
        .create_key("RSA-2048", None, KeyPurpose::Signing, org)
        .await
        .expect("demo signing key");
    let encryption = state
        .lifecycle
        .create_key("CRYSTALS-Kyber", None, KeyPurpose::Encryption, org)
        .await
        .expect("demo encryption key");
    for i in 0..12u64 {
        let _ = state.lifecycle.update_key_usage(&encryption.id, "encrypt", 4096 * (i + 1)).await;
    }

    let config = qshield_keystore::SystemConfiguration {
        user_id: "demo".into(),
        organization_id: org.into(),
        current_algorithm: signing.algorithm.clone(),
        backup_algorithm: Some(encryption.algorithm.clone()),
        rotation_interval_hours: 24,
        threat_sensitivity: 3,
        auto_rotate: true,
        updated_at: chrono::Utc::now(),
    };
    state.configs.put(&config).expect("demo config");

    tracing::info!(organization = org, "seeded demo tenant with 2 keys");
}
