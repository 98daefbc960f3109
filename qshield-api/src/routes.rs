//! REST handlers. Thin translations from requests into catalog/keystore
//! calls, shaping the `{ success, data | error, timestamp }` envelope.

use crate::auth::{require_clearance, AuthContext};
use crate::response;
use crate::state::{Shared, StoredRecommendation};
use crate::ws::WsEvent;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use qshield_catalog::{KeyPurpose, Requirements};
use qshield_keystore::{
    AuditAction, AuditEvent, AuditSinkSync, ConfigStore, KeyId, ManagedKey, RotationCause,
    RotationHistoryStore, RotationRecord, ThreatCategory, ThreatIntelligence, ThreatSignal,
    ThreatStore, UsageStats,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Clearance needed to see per-key usage statistics.
const CLEARANCE_USAGE: u8 = 2;
/// Clearance needed for global statistics, activity, and mitigation detail.
const CLEARANCE_ANALYTICS: u8 = 3;

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

pub async fn health() -> Response {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") })).into_response()
}

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

pub async fn list_algorithms(State(state): State<Shared>) -> Response {
    let profiles: Vec<_> = state.catalog.iter().collect();
    response::ok(profiles)
}

pub async fn get_algorithm(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    match state.catalog.get(&id) {
        Some(profile) => response::ok(profile),
        None => response::not_found(format!("unknown algorithm: {}", id)),
    }
}

pub async fn recommend_algorithms(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<Requirements>,
) -> Response {
    let cards = qshield_catalog::recommend(&state.catalog, &req);

    let stored = StoredRecommendation {
        id: format!("rec_{}", KeyId::generate()),
        user_id: ctx.user_id.clone(),
        requirements: req,
        results: cards.clone(),
        created_at: Utc::now(),
    };
    state.recommendations.write().await.push(stored);
    state.audit.record(
        AuditEvent::system_event(AuditAction::RecommendationServed { count: cards.len() })
            .with_actor(ctx.username),
    );

    response::ok(cards)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareReq {
    pub algorithms: Vec<String>,
    #[serde(default)]
    pub requirements: Requirements,
}

pub async fn compare_algorithms(
    State(state): State<Shared>,
    Json(req): Json<CompareReq>,
) -> Response {
    if req.algorithms.len() < 2 {
        return response::bad_request("at least two algorithm ids are required to compare");
    }
    match qshield_catalog::compare(&state.catalog, &req.algorithms, &req.requirements) {
        Ok(cards) => response::ok(cards),
        Err(e) => response::bad_request(e.to_string()),
    }
}

pub async fn list_recommendations(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
) -> Response {
    let all = state.recommendations.read().await;
    let visible: Vec<_> = all
        .iter()
        .filter(|r| ctx.is_admin() || r.user_id == ctx.user_id)
        .cloned()
        .collect();
    response::ok(visible)
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyResponse {
    id: String,
    algorithm: String,
    key_size: u32,
    purpose: KeyPurpose,
    organization_id: String,
    quantum_resistant: bool,
    created_at: chrono::DateTime<Utc>,
    expires_at: chrono::DateTime<Utc>,
    superseded_by: Option<String>,
    rotated_at: Option<chrono::DateTime<Utc>>,
    schedule: qshield_keystore::RotationSchedule,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<UsageStats>,
}

fn key_response(key: &ManagedKey, include_usage: bool) -> KeyResponse {
    KeyResponse {
        id: key.id.to_string(),
        algorithm: key.algorithm.clone(),
        key_size: key.key_size,
        purpose: key.purpose,
        organization_id: key.organization_id.clone(),
        quantum_resistant: key.quantum_resistant,
        created_at: key.created_at,
        expires_at: key.expires_at,
        superseded_by: key.superseded_by.as_ref().map(|id| id.to_string()),
        rotated_at: key.rotated_at,
        schedule: key.schedule.clone(),
        usage: include_usage.then(|| key.usage.clone()),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyReq {
    pub algorithm: String,
    pub key_size: Option<u32>,
    pub purpose: KeyPurpose,
    /// Admins may create keys for another organization.
    pub organization_id: Option<String>,
}

pub async fn create_key(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateKeyReq>,
) -> Response {
    let organization = match req.organization_id {
        Some(org) if org != ctx.organization_id && !ctx.is_admin() => {
            return response::forbidden("only admins may create keys for another organization");
        }
        Some(org) => org,
        None => ctx.organization_id.clone(),
    };

    match state
        .lifecycle
        .create_key(&req.algorithm, req.key_size, req.purpose, &organization)
        .await
    {
        Ok(key) => response::created(key_response(&key, ctx.clearance >= CLEARANCE_USAGE)),
        Err(e) => response::keystore_error(&e.0),
    }
}

#[derive(Deserialize)]
pub struct OrgQuery {
    pub organization: Option<String>,
}

pub async fn list_keys(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<OrgQuery>,
) -> Response {
    let include_usage = ctx.clearance >= CLEARANCE_USAGE;
    let keys = if ctx.is_admin() {
        match query.organization {
            Some(org) => state.lifecycle.list_organization_keys(&org).await,
            None => state.lifecycle.list_keys().await,
        }
    } else {
        state.lifecycle.list_organization_keys(&ctx.organization_id).await
    };

    match keys {
        Ok(keys) => {
            let out: Vec<_> = keys.iter().map(|k| key_response(k, include_usage)).collect();
            response::ok(out)
        }
        Err(e) => response::keystore_error(&e),
    }
}

async fn fetch_accessible_key(
    state: &Shared,
    ctx: &AuthContext,
    id: &str,
) -> Result<ManagedKey, Response> {
    match state.lifecycle.get_key(&KeyId::new(id)).await {
        Ok(key) => {
            if ctx.can_access_organization(&key.organization_id) {
                Ok(key)
            } else {
                Err(response::forbidden("key belongs to another organization"))
            }
        }
        Err(e) => Err(response::keystore_error(&e)),
    }
}

pub async fn get_key(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Response {
    match fetch_accessible_key(&state, &ctx, &id).await {
        Ok(key) => response::ok(key_response(&key, ctx.clearance >= CLEARANCE_USAGE)),
        Err(resp) => resp,
    }
}

pub async fn key_status(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = fetch_accessible_key(&state, &ctx, &id).await {
        return resp;
    }
    match state.lifecycle.check_rotation_triggers(&KeyId::new(&id)).await {
        Ok(assessment) => response::ok(assessment),
        Err(e) => response::keystore_error(&e),
    }
}

#[derive(Deserialize)]
pub struct RotateReq {
    pub reason: Option<String>,
}

pub async fn rotate_key(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<RotateReq>,
) -> Response {
    if let Err(resp) = fetch_accessible_key(&state, &ctx, &id).await {
        return resp;
    }
    let reason = req.reason.unwrap_or_else(|| format!("manual rotation by {}", ctx.username));

    match state.lifecycle.rotate_key(&KeyId::new(&id), RotationCause::Manual, &reason).await {
        Ok(outcome) => {
            state.broadcast(WsEvent::RotationCompleted { record: outcome.record.clone() });
            response::ok(json!({
                "oldKey": key_response(&outcome.old_key, false),
                "newKey": key_response(&outcome.new_key, false),
                "record": outcome.record,
            }))
        }
        Err(e) => response::keystore_error(&e.0),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReq {
    pub operation: String,
    #[serde(default)]
    pub data_size: u64,
}

pub async fn key_usage(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<UsageReq>,
) -> Response {
    if let Err(resp) = fetch_accessible_key(&state, &ctx, &id).await {
        return resp;
    }
    match state.lifecycle.update_key_usage(&KeyId::new(&id), &req.operation, req.data_size).await {
        Ok(outcome) => {
            if let Some(rotation) = &outcome.rotation {
                state.broadcast(WsEvent::RotationCompleted { record: rotation.record.clone() });
            }
            response::ok(json!({
                "key": key_response(&outcome.key, ctx.clearance >= CLEARANCE_USAGE),
                "assessment": outcome.assessment,
                "rotatedTo": outcome.rotation.as_ref().map(|r| r.new_key.id.to_string()),
            }))
        }
        Err(e) => response::keystore_error(&e),
    }
}

// ---------------------------------------------------------------------------
// Threats
// ---------------------------------------------------------------------------

fn threat_response(threat: &ThreatIntelligence, include_mitigations: bool) -> ThreatIntelligence {
    let mut out = threat.clone();
    if !include_mitigations {
        out.mitigations.clear();
    }
    out
}

pub async fn list_threats(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
) -> Response {
    let include_mitigations = ctx.clearance >= CLEARANCE_ANALYTICS;
    match state.threats.list_active() {
        Ok(threats) => {
            let out: Vec<_> =
                threats.iter().map(|t| threat_response(t, include_mitigations)).collect();
            response::ok(out)
        }
        Err(e) => response::keystore_error(&e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatReq {
    pub category: ThreatCategory,
    pub severity: u8,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub affected_algorithms: Vec<String>,
    #[serde(default)]
    pub mitigations: Vec<String>,
    pub source: Option<String>,
    pub confidence: Option<f64>,
}

pub async fn report_threat(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<ThreatReq>,
) -> Response {
    if let Err(resp) = require_clearance(&ctx, CLEARANCE_ANALYTICS) {
        return resp;
    }
    if !(1..=5).contains(&req.severity) {
        return response::bad_request("severity must be between 1 and 5");
    }

    let threat = ThreatIntelligence {
        id: format!("thr_{}", KeyId::generate()),
        category: req.category,
        severity: req.severity,
        confidence: req.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
        source: req.source.unwrap_or_else(|| format!("manual:{}", ctx.username)),
        title: req.title,
        description: req.description,
        affected_algorithms: req.affected_algorithms,
        predicted_impact: None,
        mitigations: req.mitigations,
        active: true,
        created_at: Utc::now(),
    };

    match state.threats.insert(&threat) {
        Ok(true) => {
            state.audit.record(
                AuditEvent::system_event(AuditAction::ThreatRecorded {
                    severity: threat.severity,
                    category: threat.category.to_string(),
                })
                .with_actor(ctx.username),
            );
            state.broadcast(WsEvent::SecurityAlert { threat: threat.clone() });
            response::created(threat)
        }
        Ok(false) => response::conflict("duplicate_threat", "threat id already recorded"),
        Err(e) => response::keystore_error(&e),
    }
}

pub async fn deactivate_threat(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = require_clearance(&ctx, CLEARANCE_ANALYTICS) {
        return resp;
    }
    match state.threats.deactivate(&id) {
        Ok(true) => {
            state.audit.record(
                AuditEvent::system_event(AuditAction::ThreatDeactivated { threat_id: id.clone() })
                    .with_actor(ctx.username),
            );
            response::ok(json!({ "id": id, "active": false }))
        }
        Ok(false) => response::not_found(format!("threat not found: {}", id)),
        Err(e) => response::keystore_error(&e),
    }
}

// ---------------------------------------------------------------------------
// System configuration
// ---------------------------------------------------------------------------

pub async fn get_config(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
) -> Response {
    match state.configs.get(&ctx.user_id) {
        Ok(Some(config)) => response::ok(config),
        Ok(None) => response::not_found("no system configuration yet; PUT /api/config to create"),
        Err(e) => response::keystore_error(&e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReq {
    pub current_algorithm: String,
    pub backup_algorithm: Option<String>,
    pub rotation_interval_hours: i64,
    pub threat_sensitivity: u8,
    pub auto_rotate: bool,
}

pub async fn put_config(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<ConfigReq>,
) -> Response {
    if state.catalog.get(&req.current_algorithm).is_none() {
        return response::bad_request(format!("unknown algorithm: {}", req.current_algorithm));
    }
    if let Some(backup) = &req.backup_algorithm {
        if state.catalog.get(backup).is_none() {
            return response::bad_request(format!("unknown backup algorithm: {}", backup));
        }
    }
    if req.rotation_interval_hours < 1 {
        return response::bad_request("rotation interval must be at least one hour");
    }
    if !(1..=5).contains(&req.threat_sensitivity) {
        return response::bad_request("threat sensitivity must be between 1 and 5");
    }

    let config = qshield_keystore::SystemConfiguration {
        user_id: ctx.user_id.clone(),
        organization_id: ctx.organization_id.clone(),
        current_algorithm: req.current_algorithm,
        backup_algorithm: req.backup_algorithm,
        rotation_interval_hours: req.rotation_interval_hours,
        threat_sensitivity: req.threat_sensitivity,
        auto_rotate: req.auto_rotate,
        updated_at: Utc::now(),
    };

    match state.configs.put(&config) {
        Ok(()) => {
            state.audit.record(
                AuditEvent::system_event(AuditAction::ConfigUpdated {
                    user_id: ctx.user_id.clone(),
                })
                .with_actor(ctx.username),
            );
            response::ok(config)
        }
        Err(e) => response::keystore_error(&e),
    }
}

// ---------------------------------------------------------------------------
// Rotation history
// ---------------------------------------------------------------------------

fn history_response(record: &RotationRecord, include_impact: bool) -> RotationRecord {
    let mut out = record.clone();
    if !include_impact {
        out.performance_impact = None;
    }
    out
}

pub async fn list_rotations(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
) -> Response {
    let include_impact = ctx.clearance >= CLEARANCE_USAGE;
    let records = if ctx.is_admin() {
        state.history.list()
    } else {
        state.history.list_for_organization(&ctx.organization_id)
    };
    match records {
        Ok(records) => {
            let out: Vec<_> =
                records.iter().map(|r| history_response(r, include_impact)).collect();
            response::ok(out)
        }
        Err(e) => response::keystore_error(&e),
    }
}

// ---------------------------------------------------------------------------
// Stats & activity
// ---------------------------------------------------------------------------

pub async fn global_stats(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
) -> Response {
    if let Err(resp) = require_clearance(&ctx, CLEARANCE_ANALYTICS) {
        return resp;
    }

    let now = Utc::now();
    let keys = match state.lifecycle.list_keys().await {
        Ok(keys) => keys,
        Err(e) => return response::keystore_error(&e),
    };
    let threats = match state.threats.list_active() {
        Ok(threats) => threats,
        Err(e) => return response::keystore_error(&e),
    };
    let history = match state.history.list() {
        Ok(history) => history,
        Err(e) => return response::keystore_error(&e),
    };

    let active = keys.iter().filter(|k| k.is_active(now)).count();
    let quantum = keys.iter().filter(|k| k.quantum_resistant).count();
    let completed = history
        .iter()
        .filter(|r| r.status == qshield_keystore::RotationStatus::Completed)
        .count();
    let failed = history
        .iter()
        .filter(|r| r.status == qshield_keystore::RotationStatus::Failed)
        .count();

    response::ok(json!({
        "totalKeys": keys.len(),
        "activeKeys": active,
        "quantumResistantKeys": quantum,
        "activeThreats": threats.len(),
        "rotationsCompleted": completed,
        "rotationsFailed": failed,
        "globalThreatLevel": state.signal.global_threat_level(),
    }))
}

pub async fn list_activity(
    State(state): State<Shared>,
    Extension(ctx): Extension<AuthContext>,
) -> Response {
    if let Err(resp) = require_clearance(&ctx, CLEARANCE_ANALYTICS) {
        return resp;
    }
    let mut events = state.activity.events();
    events.reverse();
    events.truncate(100);
    response::ok(events)
}
