use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use safeline_types::api::Claims;
use safeline_types::models::Role;

use crate::AppState;
use crate::error::ApiError;
use crate::token::validate_token;

/// Who is making the request. Inserted into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            role: claims.role,
        }
    }
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized("missing authorization header"))?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized("malformed authorization header"))
}

/// Extract and validate the bearer token, then attach an [`Identity`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = validate_token(bearer_token(req.headers())?, &state.jwt_secret)?;

    req.extensions_mut().insert(Identity::from(claims));
    Ok(next.run(req).await)
}

/// Exact role match. A missing identity means [`require_auth`] did not run
/// first and is treated as forbidden.
pub fn check_role(identity: Option<&Identity>, expected: Role) -> Result<(), ApiError> {
    match identity {
        Some(identity) if identity.role == expected => Ok(()),
        _ => Err(ApiError::Forbidden),
    }
}

/// Role guard, layered with `from_fn_with_state(Role::Admin, require_role)`.
pub async fn require_role(
    State(expected): State<Role>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    check_role(req.extensions().get::<Identity>(), expected)?;
    Ok(next.run(req).await)
}
