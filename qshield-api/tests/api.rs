//! Black-box tests over the assembled router: auth, clearance gating, the
//! catalog endpoints, key lifecycle flows, and the background scans.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use qshield_api::scheduler::{rotation_scan, JobConfig};
use qshield_api::state::Shared;
use qshield_api::{auth, build_router, build_state, ApiOptions};
use qshield_keystore::{ConfigStore, RotationHistoryStore, ThreatStore};
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "integration-test-secret";

fn test_state() -> Shared {
    build_state(ApiOptions {
        jwt_secret: SECRET.into(),
        rate_rps: 10_000.0,
        rate_burst: 10_000,
        data_dir: None,
        // Seeded feed: deterministic, and its level never reaches the 0.7
        // threat trigger, so only explicit actions rotate keys here.
        threat_seed: Some(11),
    })
}

fn test_app() -> (Router, Shared) {
    let state = test_state();
    (build_router(state.clone()), state)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn request(method: &str, path: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Register + login; returns the bearer token.
async fn login_as(app: &Router, username: &str, role: &str) -> String {
    let (status, _) = send(
        app,
        request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "a-long-enough-password",
                "role": role,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": username, "password": "a-long-enough-password" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["token"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_rejects_an_eleven_character_password() {
    let (app, _) = test_app();
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "username": "shortpw",
                "email": "shortpw@example.com",
                "password": "elevenchars",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "password_weak");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let (app, _) = test_app();
    login_as(&app, "dupe", "user").await;
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "username": "dupe",
                "email": "other@example.com",
                "password": "a-long-enough-password",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "user_exists");
}

#[tokio::test]
async fn tokens_carry_the_role_clearance_mapping() {
    let (app, _) = test_app();
    for (role, clearance) in [("admin", 5), ("analyst", 3), ("user", 1)] {
        let token = login_as(&app, &format!("{}-probe", role), role).await;
        let claims = auth::decode_token(SECRET, &token).unwrap();
        assert_eq!(claims.quantum_clearance_level, clearance, "role {}", role);
        assert_eq!(claims.role, role);
    }
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let (app, _) = test_app();
    let (status, _) = send(&app, request("GET", "/api/keys", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) =
        send(&app, request("GET", "/api/keys", Some("not-a-real-token"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

#[tokio::test]
async fn compare_requires_at_least_two_ids() {
    let (app, _) = test_app();
    let token = login_as(&app, "comparer", "user").await;
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/algorithms/compare",
            Some(&token),
            Some(json!({ "algorithms": ["RSA-2048"] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn compare_scores_the_named_algorithms() {
    let (app, _) = test_app();
    let token = login_as(&app, "comparer2", "user").await;
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/algorithms/compare",
            Some(&token),
            Some(json!({
                "algorithms": ["RSA-2048", "CRYSTALS-Kyber"],
                "requirements": { "quantumResistance": true },
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let cards = body["data"].as_array().unwrap();
    assert_eq!(cards.len(), 2);
    assert!(
        cards[1]["security"].as_f64().unwrap() > cards[0]["security"].as_f64().unwrap(),
        "the quantum KEM must outscore classical RSA on security"
    );
}

#[tokio::test]
async fn recommendations_are_ranked_and_persisted() {
    let (app, _) = test_app();
    let token = login_as(&app, "recommender", "analyst").await;
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/algorithms/recommend",
            Some(&token),
            Some(json!({ "quantumResistance": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let cards = body["data"].as_array().unwrap();
    assert!(!cards.is_empty());
    let overalls: Vec<f64> = cards.iter().map(|c| c["overall"].as_f64().unwrap()).collect();
    for pair in overalls.windows(2) {
        assert!(pair[0] >= pair[1]);
    }
    assert_eq!(cards[0]["quantum_resistant"], true);

    let (status, body) =
        send(&app, request("GET", "/api/recommendations", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_algorithm_is_not_found() {
    let (app, _) = test_app();
    let token = login_as(&app, "browser", "user").await;
    let (status, _) =
        send(&app, request("GET", "/api/algorithms/ROT13", Some(&token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rotating_a_classical_signing_key_yields_a_pq_signature_algorithm() {
    let (app, _) = test_app();
    let token = login_as(&app, "rotator", "analyst").await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/keys",
            Some(&token),
            Some(json!({ "algorithm": "RSA-2048", "purpose": "signing" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let key_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["quantumResistant"], false);

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/api/keys/{}/rotate", key_id),
            Some(&token),
            Some(json!({ "reason": "pq migration drill" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let new_algorithm = body["data"]["newKey"]["algorithm"].as_str().unwrap();
    assert!(
        ["CRYSTALS-Dilithium", "FALCON", "SPHINCS+"].contains(&new_algorithm),
        "got {}",
        new_algorithm
    );

    // The old key is superseded; a second rotation conflicts.
    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/api/keys/{}/rotate", key_id),
            Some(&token),
            Some(json!({})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "already_superseded");
}

#[tokio::test]
async fn rotating_an_unknown_key_is_not_found() {
    let (app, _) = test_app();
    let token = login_as(&app, "rotator404", "user").await;
    let (status, _) = send(
        &app,
        request("POST", "/api/keys/deadbeef/rotate", Some(&token), Some(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn key_usage_updates_counters_and_reports_the_assessment() {
    let (app, _) = test_app();
    let token = login_as(&app, "user-of-keys", "analyst").await;
    let (_, body) = send(
        &app,
        request(
            "POST",
            "/api/keys",
            Some(&token),
            Some(json!({ "algorithm": "CRYSTALS-Kyber", "purpose": "encryption" })),
        ),
    )
    .await;
    let key_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/api/keys/{}/usage", key_id),
            Some(&token),
            Some(json!({ "operation": "encrypt", "dataSize": 2048 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["key"]["usage"]["operation_count"], 1);
    assert_eq!(body["data"]["assessment"]["due"], false);
    assert!(body["data"]["rotatedTo"].is_null());
}

#[tokio::test]
async fn keys_are_scoped_to_their_organization() {
    let (app, _) = test_app();
    let owner = login_as(&app, "owner-org", "user").await;
    let stranger = login_as(&app, "stranger-org", "user").await;
    let admin = login_as(&app, "roving-admin", "admin").await;

    let (_, body) = send(
        &app,
        request(
            "POST",
            "/api/keys",
            Some(&owner),
            Some(json!({ "algorithm": "CRYSTALS-Kyber", "purpose": "encryption" })),
        ),
    )
    .await;
    let key_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) =
        send(&app, request("GET", &format!("/api/keys/{}", key_id), Some(&stranger), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        send(&app, request("GET", &format!("/api/keys/{}", key_id), Some(&admin), None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn usage_statistics_are_clearance_gated() {
    let (app, _) = test_app();
    let low = login_as(&app, "low-clearance", "user").await;
    let (_, body) = send(
        &app,
        request(
            "POST",
            "/api/keys",
            Some(&low),
            Some(json!({ "algorithm": "CRYSTALS-Kyber", "purpose": "encryption" })),
        ),
    )
    .await;
    let key_id = body["data"]["id"].as_str().unwrap().to_string();

    // Clearance 1: the usage block is withheld on reads.
    let (_, body) =
        send(&app, request("GET", &format!("/api/keys/{}", key_id), Some(&low), None)).await;
    assert!(body["data"]["usage"].is_null());
}

// ---------------------------------------------------------------------------
// Clearance-gated analytics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stats_and_activity_require_clearance_three() {
    let (app, _) = test_app();
    let user = login_as(&app, "plain-user", "user").await;
    let analyst = login_as(&app, "the-analyst", "analyst").await;

    for path in ["/api/stats", "/api/activity"] {
        let (status, body) = send(&app, request("GET", path, Some(&user), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", path);
        assert_eq!(body["error"]["code"], "insufficient_clearance");

        let (status, _) = send(&app, request("GET", path, Some(&analyst), None)).await;
        assert_eq!(status, StatusCode::OK, "{}", path);
    }
}

// ---------------------------------------------------------------------------
// Threats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn threat_reporting_and_mitigation_gating() {
    let (app, _) = test_app();
    let analyst = login_as(&app, "threat-analyst", "analyst").await;
    let user = login_as(&app, "threat-viewer", "user").await;

    // Plain users may not report.
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/threats",
            Some(&user),
            Some(json!({
                "category": "cryptanalysis",
                "severity": 4,
                "title": "test threat",
                "description": "posted by a user",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/threats",
            Some(&analyst),
            Some(json!({
                "category": "cryptanalysis",
                "severity": 4,
                "title": "weak nonce handling observed",
                "description": "reported by downstream consumer",
                "affectedAlgorithms": ["ECDSA-P256"],
                "mitigations": ["rotate affected signing keys"],
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let threat_id = body["data"]["id"].as_str().unwrap().to_string();

    // Low clearance sees the threat without its mitigation detail.
    let (_, body) = send(&app, request("GET", "/api/threats", Some(&user), None)).await;
    let listed = &body["data"].as_array().unwrap()[0];
    assert_eq!(listed["mitigations"].as_array().unwrap().len(), 0);

    let (_, body) = send(&app, request("GET", "/api/threats", Some(&analyst), None)).await;
    let listed = &body["data"].as_array().unwrap()[0];
    assert_eq!(listed["mitigations"].as_array().unwrap().len(), 1);

    // Deactivation is analyst+, and unknown ids are 404.
    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/api/threats/{}/deactivate", threat_id),
            Some(&analyst),
            Some(json!({})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        request("POST", "/api/threats/ghost/deactivate", Some(&analyst), Some(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, request("GET", "/api/threats", Some(&analyst), None)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn config_round_trips_and_validates() {
    let (app, _) = test_app();
    let token = login_as(&app, "configurer", "user").await;

    let (status, _) = send(&app, request("GET", "/api/config", Some(&token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/api/config",
            Some(&token),
            Some(json!({
                "currentAlgorithm": "ROT13",
                "rotationIntervalHours": 24,
                "threatSensitivity": 3,
                "autoRotate": true,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/api/config",
            Some(&token),
            Some(json!({
                "currentAlgorithm": "RSA-2048",
                "backupAlgorithm": "CRYSTALS-Kyber",
                "rotationIntervalHours": 24,
                "threatSensitivity": 3,
                "autoRotate": true,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, request("GET", "/api/config", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["current_algorithm"], "RSA-2048");
    assert_eq!(body["data"]["auto_rotate"], true);
}

// ---------------------------------------------------------------------------
// Background scans
// ---------------------------------------------------------------------------

fn fast_jobs() -> JobConfig {
    JobConfig { latency_ms: (1, 2), ..JobConfig::default() }
}

#[tokio::test]
async fn scheduler_rotates_systems_whose_interval_elapsed() {
    let (app, state) = test_app();
    let token = login_as(&app, "scheduled-org", "analyst").await;

    let (_, body) = send(
        &app,
        request(
            "POST",
            "/api/keys",
            Some(&token),
            Some(json!({ "algorithm": "RSA-2048", "purpose": "signing" })),
        ),
    )
    .await;
    let key_id = body["data"]["id"].as_str().unwrap().to_string();

    // An auto-rotate system whose last activity is two hours past a 1h interval.
    state
        .configs
        .put(&qshield_keystore::SystemConfiguration {
            user_id: "scheduled-user".into(),
            organization_id: "scheduled-org".into(),
            current_algorithm: "RSA-2048".into(),
            backup_algorithm: None,
            rotation_interval_hours: 1,
            threat_sensitivity: 3,
            auto_rotate: true,
            updated_at: chrono::Utc::now() - chrono::Duration::hours(2),
        })
        .unwrap();

    rotation_scan(&state, fast_jobs()).await.unwrap();

    let records = state.history.list_for_organization("scheduled-org").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].cause, qshield_keystore::RotationCause::Scheduled);
    assert_eq!(records[0].status, qshield_keystore::RotationStatus::Completed);
    assert!(records[0].performance_impact.is_some());

    let old = state.lifecycle.get_key(&qshield_keystore::KeyId::new(&key_id)).await.unwrap();
    assert!(old.superseded_by.is_some());

    // The configuration now points at the quantum successor.
    let config = state.configs.get("scheduled-user").unwrap().unwrap();
    assert_eq!(config.current_algorithm, "CRYSTALS-Dilithium");
    assert_eq!(config.backup_algorithm.as_deref(), Some("RSA-2048"));
}

#[tokio::test]
async fn scheduler_rotates_systems_hit_by_severe_threats() {
    let (app, state) = test_app();
    let token = login_as(&app, "threatened-org", "analyst").await;

    send(
        &app,
        request(
            "POST",
            "/api/keys",
            Some(&token),
            Some(json!({ "algorithm": "RSA-2048", "purpose": "signing" })),
        ),
    )
    .await;

    // Fresh config — the interval has not elapsed.
    state
        .configs
        .put(&qshield_keystore::SystemConfiguration {
            user_id: "threatened-user".into(),
            organization_id: "threatened-org".into(),
            current_algorithm: "RSA-2048".into(),
            backup_algorithm: None,
            rotation_interval_hours: 720,
            threat_sensitivity: 2,
            auto_rotate: true,
            updated_at: chrono::Utc::now(),
        })
        .unwrap();

    // A severe, recent, active threat naming the system's algorithm.
    state
        .threats
        .insert(&qshield_keystore::ThreatIntelligence {
            id: "thr_integration".into(),
            category: qshield_keystore::ThreatCategory::QuantumAdvance,
            severity: 5,
            confidence: 0.9,
            source: "test".into(),
            title: "factoring milestone".into(),
            description: "test threat".into(),
            affected_algorithms: vec!["RSA-2048".into()],
            predicted_impact: None,
            mitigations: vec![],
            active: true,
            created_at: chrono::Utc::now(),
        })
        .unwrap();

    rotation_scan(&state, fast_jobs()).await.unwrap();

    let records = state.history.list_for_organization("threatened-org").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].cause, qshield_keystore::RotationCause::ThreatDetected);
}

#[tokio::test]
async fn scheduler_skips_systems_without_due_work() {
    let (_, state) = test_app();
    state
        .configs
        .put(&qshield_keystore::SystemConfiguration {
            user_id: "idle-user".into(),
            organization_id: "idle-org".into(),
            current_algorithm: "CRYSTALS-Kyber".into(),
            backup_algorithm: None,
            rotation_interval_hours: 720,
            threat_sensitivity: 3,
            auto_rotate: true,
            updated_at: chrono::Utc::now(),
        })
        .unwrap();

    rotation_scan(&state, fast_jobs()).await.unwrap();
    assert!(state.history.list_for_organization("idle-org").unwrap().is_empty());
}
