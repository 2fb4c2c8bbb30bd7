use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;

use safeline_types::api::Claims;
use safeline_types::models::Role;

/// Tokens are valid for 24 hours from issue.
pub const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Bad signature, wrong algorithm, malformed token or unexpected claims.
    #[error("invalid token")]
    Invalid,

    #[error("token expired")]
    Expired,

    #[error("could not sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

pub fn issue_token(user_id: i64, role: Role, secret: &str) -> Result<String, TokenError> {
    issue_token_at(user_id, role, secret, Utc::now())
}

pub fn issue_token_at(
    user_id: i64,
    role: Role,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<String, TokenError> {
    let claims = Claims {
        sub: user_id,
        role,
        exp: now.timestamp() + TOKEN_TTL_SECS,
    };

    encode(
        &Header::new(ALGORITHM),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(TokenError::Signing)
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, TokenError> {
    validate_token_at(token, secret, Utc::now())
}

/// Expiry is checked here against `now` with no leeway; the library only
/// verifies signature, algorithm and claim shape.
pub fn validate_token_at(token: &str, secret: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(ALGORITHM);
    validation.validate_exp = false;
    validation.leeway = 0;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        debug!("Token rejected: {}", e);
        TokenError::Invalid
    })?;

    if now.timestamp() > data.claims.exp {
        return Err(TokenError::Expired);
    }

    Ok(data.claims)
}
