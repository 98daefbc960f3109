//! Authentication: registration, login, JWT issuance, and the request
//! middleware that turns a bearer token into an [`AuthContext`].
//!
//! Clearance is a 1–5 integer independent of route-level role checks: the
//! role maps to a fixed clearance (admin 5, analyst 3, user 1) and handlers
//! gate sensitive fields on it.

use crate::response;
use crate::state::Shared;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use qshield_keystore::{AuditAction, AuditEvent, AuditSinkSync};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// Minimum password length; anything shorter is `password_weak`.
pub const MIN_PASSWORD_LEN: usize = 12;

/// Token lifetime.
const TOKEN_TTL_HOURS: i64 = 24;

// ---------------------------------------------------------------------------
// Roles and clearance
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Analyst,
    User,
}

impl Role {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "analyst" => Some(Role::Analyst),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Analyst => "analyst",
            Role::User => "user",
        }
    }

    /// Fixed role → clearance mapping.
    pub fn clearance(&self) -> u8 {
        match self {
            Role::Admin => 5,
            Role::Analyst => 3,
            Role::User => 1,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// User records
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// In-memory user registry, held behind the app state's `RwLock`.
#[derive(Debug, Default)]
pub struct UserStore {
    users: Vec<UserRecord>,
}

impl UserStore {
    pub fn new() -> Self {
        Self { users: Vec::new() }
    }

    pub fn find(&self, username: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn taken(&self, username: &str, email: &str) -> bool {
        self.users.iter().any(|u| u.username == username || u.email == email)
    }

    pub fn add(&mut self, user: UserRecord) {
        self.users.push(user);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

// ---------------------------------------------------------------------------
// JWT claims
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub quantum_clearance_level: u8,
    /// Unix expiry, 24h out.
    pub exp: usize,
}

pub fn issue_token(secret: &str, user: &UserRecord) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user.id.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
        role: user.role.as_str().to_string(),
        quantum_clearance_level: user.role.clearance(),
        exp: (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

// ---------------------------------------------------------------------------
// Auth context — injected into request extensions
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub clearance: u8,
    /// Organization the caller operates under. One organization per account.
    pub organization_id: String,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether the caller may see resources of `organization_id`.
    pub fn can_access_organization(&self, organization_id: &str) -> bool {
        self.is_admin() || self.organization_id == organization_id
    }
}

/// Guard helper: `Err` is a ready-to-return 403 response.
pub fn require_clearance(ctx: &AuthContext, level: u8) -> Result<(), Response> {
    if ctx.clearance >= level {
        Ok(())
    } else {
        Err(response::forbidden(format!(
            "requires clearance level {} (caller has {})",
            level, ctx.clearance
        )))
    }
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

fn is_public(path: &str) -> bool {
    matches!(path, "/" | "/health" | "/ws")
        || path == "/api/auth/register"
        || path == "/api/auth/login"
}

pub async fn auth_middleware(State(state): State<Shared>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if is_public(&path) {
        return next.run(req).await;
    }

    let header_val = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let token = match header_val {
        Some(val) if val.starts_with("Bearer ") => val[7..].to_string(),
        _ => {
            return response::unauthorized("missing Authorization header (use: Bearer <token>)");
        }
    };

    match decode_token(&state.jwt_secret, &token) {
        Ok(claims) => {
            let role = match Role::from_str(&claims.role) {
                Some(role) => role,
                None => {
                    return response::unauthorized("token carries an unknown role");
                }
            };
            let ctx = AuthContext {
                user_id: claims.sub,
                organization_id: claims.username.clone(),
                username: claims.username,
                role,
                clearance: claims.quantum_clearance_level,
            };
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => {
            state.audit.record(AuditEvent::system_event(AuditAction::AuthFailed {
                reason: e.to_string(),
            }));
            tracing::warn!(path = %path, error = %e, "rejected bearer token");
            response::unauthorized("invalid or expired token")
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterReq {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Defaults to the least-privileged role.
    pub role: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginReq {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
struct UserInfo {
    id: String,
    username: String,
    email: String,
    role: String,
    quantum_clearance_level: u8,
}

fn user_info(user: &UserRecord) -> UserInfo {
    UserInfo {
        id: user.id.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
        role: user.role.as_str().to_string(),
        quantum_clearance_level: user.role.clearance(),
    }
}

pub async fn register(State(state): State<Shared>, Json(req): Json<RegisterReq>) -> Response {
    if req.username.is_empty() || req.username.len() > 64 {
        return response::bad_request("username must be 1-64 characters");
    }
    if !req.email.contains('@') {
        return response::bad_request("email is not valid");
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return response::fail(
            axum::http::StatusCode::BAD_REQUEST,
            "password_weak",
            format!("password must be at least {} characters", MIN_PASSWORD_LEN),
        );
    }
    let role = match req.role.as_deref() {
        None => Role::User,
        Some(r) => match Role::from_str(r) {
            Some(role) => role,
            None => return response::bad_request(format!("invalid role '{}'", r)),
        },
    };

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = match Argon2::default().hash_password(req.password.as_bytes(), &salt) {
        Ok(hash) => hash.to_string(),
        Err(e) => return response::internal(format!("password hashing failed: {}", e)),
    };

    let mut users = state.users.write().await;
    if users.taken(&req.username, &req.email) {
        return response::conflict("user_exists", "username or email already registered");
    }

    let user = UserRecord {
        id: format!("usr_{}", qshield_keystore::KeyId::generate()),
        username: req.username.clone(),
        email: req.email,
        password_hash,
        role,
        created_at: Utc::now(),
    };
    let info = user_info(&user);
    users.add(user);
    drop(users);

    state.audit.record(AuditEvent::system_event(AuditAction::UserRegistered {
        username: req.username,
    }));

    response::created(info)
}

pub async fn login(State(state): State<Shared>, Json(req): Json<LoginReq>) -> Response {
    let users = state.users.read().await;
    let user = match users.find(&req.username) {
        Some(user) => user.clone(),
        None => {
            state.audit.record(AuditEvent::system_event(AuditAction::AuthFailed {
                reason: format!("unknown user {}", req.username),
            }));
            return response::unauthorized("invalid credentials");
        }
    };
    drop(users);

    let parsed = match PasswordHash::new(&user.password_hash) {
        Ok(parsed) => parsed,
        Err(e) => return response::internal(format!("stored hash unreadable: {}", e)),
    };
    if Argon2::default().verify_password(req.password.as_bytes(), &parsed).is_err() {
        state.audit.record(AuditEvent::system_event(AuditAction::AuthFailed {
            reason: format!("bad password for {}", user.username),
        }));
        return response::unauthorized("invalid credentials");
    }

    let token = match issue_token(&state.jwt_secret, &user) {
        Ok(token) => token,
        Err(e) => return response::internal(format!("token issuance failed: {}", e)),
    };

    state.audit.record(AuditEvent::system_event(AuditAction::AuthSucceeded {
        username: user.username.clone(),
    }));

    response::ok(json!({
        "token": token,
        "user": user_info(&user),
    }))
}

pub async fn whoami(req: Request) -> Response {
    match req.extensions().get::<AuthContext>() {
        Some(ctx) => response::ok(json!({
            "userId": ctx.user_id,
            "username": ctx.username,
            "role": ctx.role.as_str(),
            "quantumClearanceLevel": ctx.clearance,
            "organizationId": ctx.organization_id,
        })),
        None => response::unauthorized("no authenticated context").into_response(),
    }
}
