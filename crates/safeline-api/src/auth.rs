use std::sync::OnceLock;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use safeline_db::{Database, is_unique_violation};
use safeline_types::api::{AuthResponse, LoginRequest, RegisterRequest, UserSummary};
use safeline_types::models::Role;

use crate::AppState;
use crate::error::ApiError;
use crate::password::{hash_password, verify_password};
use crate::token::issue_token;

// -- Handlers --

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::validation(e.body_text()))?;

    // Argon2 and SQLite both block
    let response = tokio::task::spawn_blocking(move || {
        register_user(&state.db, &state.jwt_secret, &req.username, &req.password)
    })
    .await??;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::validation(e.body_text()))?;

    let response = tokio::task::spawn_blocking(move || {
        login_user(&state.db, &state.jwt_secret, &req.username, &req.password)
    })
    .await??;

    Ok(Json(response))
}

// -- Gateway --

fn require_credentials(username: &str, password: &str) -> Result<(), ApiError> {
    if username.trim().is_empty() || password.trim().is_empty() {
        return Err(ApiError::validation("username and password are required"));
    }
    Ok(())
}

/// Create a regular user and hand back a token for it.
///
/// The existence check and the insert are not atomic. Two concurrent
/// registrations of one name can both pass the check; the UNIQUE constraint
/// on `users.username` rejects the second insert, which is reported as
/// `UsernameTaken` as well.
pub fn register_user(
    db: &Database,
    secret: &str,
    username: &str,
    password: &str,
) -> Result<AuthResponse, ApiError> {
    require_credentials(username, password)?;

    if db.get_user_by_username(username)?.is_some() {
        return Err(ApiError::UsernameTaken);
    }

    let password_hash = hash_password(password)?;

    let user_id = db
        .create_user(username, &password_hash, Role::User.as_str())
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::UsernameTaken
            } else {
                ApiError::Internal(e)
            }
        })?;

    let token = issue_token(user_id, Role::User, secret)?;
    info!("Registered user {} (id {})", username, user_id);

    Ok(AuthResponse {
        token,
        user: UserSummary {
            id: user_id,
            username: username.to_string(),
            role: Role::User,
        },
    })
}

/// Hash checked when the username is unknown, so a miss costs one Argon2
/// verification just like a wrong password.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("safeline-dummy-password").ok())
        .as_deref()
}

/// Unknown username and wrong password produce the same error.
pub fn login_user(
    db: &Database,
    secret: &str,
    username: &str,
    password: &str,
) -> Result<AuthResponse, ApiError> {
    require_credentials(username, password)?;

    let Some(user) = db.get_user_by_username(username)? else {
        if let Some(hash) = dummy_hash() {
            let _ = verify_password(hash, password);
        }
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_password(&user.password, password)? {
        return Err(ApiError::InvalidCredentials);
    }

    let role: Role = user
        .role
        .parse()
        .map_err(|e| anyhow::anyhow!("user {} has {}", user.id, e))?;

    let token = issue_token(user.id, role, secret)?;

    Ok(AuthResponse {
        token,
        user: UserSummary {
            id: user.id,
            username: user.username,
            role,
        },
    })
}

/// Seed an admin account unless one already exists. Returns whether an
/// account was created. Meant to be called once at startup.
pub fn ensure_admin_exists(db: &Database, username: &str, password: &str) -> anyhow::Result<bool> {
    if db.count_users_with_role(Role::Admin.as_str())? > 0 {
        return Ok(false);
    }

    let password_hash = hash_password(password)?;
    let id = db.create_user(username, &password_hash, Role::Admin.as_str())?;
    info!("Seeded admin user {} (id {})", username, id);
    Ok(true)
}
