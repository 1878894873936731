use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_MANAGER: &str = "manager";
pub const ROLE_TENANT: &str = "tenant";

pub const KNOWN_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_MANAGER, ROLE_TENANT];

/// Bearer-token claims. `sub` is the app_users row id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn create_access_token(
    state: &AppState,
    user_id: &str,
    email: &str,
    role: &str,
) -> Result<String, AppError> {
    let now = Utc::now();
    let ttl = Duration::hours(state.config.access_token_ttl_hours.max(1));
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        role: role.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
    )
    .map_err(|error| AppError::Internal(format!("Could not issue token: {error}")))
}

fn decode_token(state: &AppState, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid or expired token.".to_string()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the authenticated user from the Authorization header.
/// Outside production an `x-user-id` header may stand in for a real
/// token when DEV_AUTH_OVERRIDES_ENABLED is set.
pub async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<Claims, AppError> {
    if state.config.auth_dev_overrides_enabled() {
        if let Some(user_id) = headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return Ok(Claims {
                sub: user_id.to_string(),
                email: String::new(),
                role: ROLE_ADMIN.to_string(),
                iat: Utc::now().timestamp(),
                exp: Utc::now().timestamp(),
            });
        }
    }

    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token.".to_string()))?;
    decode_token(state, token)
}

pub fn assert_role(claims: &Claims, allowed_roles: &[&str]) -> Result<(), AppError> {
    if allowed_roles.contains(&claims.role.as_str()) {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "Forbidden: role '{}' is not allowed for this action.",
        claims.role
    )))
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| AppError::Internal(format!("Could not hash password: {error}")))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::{assert_role, hash_password, verify_password, Claims, ROLE_ADMIN, ROLE_MANAGER};

    fn claims_with_role(role: &str) -> Claims {
        Claims {
            sub: "00000000-0000-0000-0000-000000000000".to_string(),
            email: "ibu@koskita.id".to_string(),
            role: role.to_string(),
            iat: 0,
            exp: 0,
        }
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("rahasia-kos-123").expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("rahasia-kos-123", &hash));
        assert!(!verify_password("salah", &hash));
        assert!(!verify_password("rahasia-kos-123", "not-a-phc-hash"));
    }

    #[test]
    fn role_gate() {
        assert!(assert_role(&claims_with_role(ROLE_ADMIN), &[ROLE_ADMIN]).is_ok());
        assert!(assert_role(&claims_with_role(ROLE_MANAGER), &[ROLE_ADMIN]).is_err());
        assert!(
            assert_role(&claims_with_role(ROLE_MANAGER), &[ROLE_ADMIN, ROLE_MANAGER]).is_ok()
        );
    }
}
