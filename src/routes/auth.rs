use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use serde_json::{json, Map, Value};

use crate::{
    auth::{create_access_token, hash_password, require_user, verify_password, ROLE_TENANT},
    error::{AppError, AppResult},
    repository::table_service::{create_row, get_row, list_rows},
    schemas::{remove_nulls, serialize_to_map, validate_input, LoginInput, RegisterInput},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/auth/register", axum::routing::post(register))
        .route("/auth/login", axum::routing::post(login))
        .route("/auth/me", axum::routing::get(me))
        .route("/me", axum::routing::get(me))
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let pool = state.pool()?;

    let record = registration_record(&payload)?;

    // Unique email is enforced by the database; 23505 surfaces as 409.
    let created = create_row(pool, "app_users", &record).await?;
    let user = without_password_hash(created);
    let user_id = value_str(&user, "id");
    let token = create_access_token(&state, &user_id, &payload.email, ROLE_TENANT)?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(json!({ "access_token": token, "token_type": "bearer", "user": user })),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = state.pool()?;

    let mut filter = Map::new();
    filter.insert(
        "email".to_string(),
        Value::String(payload.email.trim().to_lowercase()),
    );
    let mut rows = list_rows(pool, "app_users", Some(&filter), 1, 0, "created_at", true).await?;
    let user = rows
        .pop()
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password.".to_string()))?;

    let stored_hash = value_str(&user, "password_hash");
    if !verify_password(&payload.password, &stored_hash) {
        return Err(AppError::Unauthorized(
            "Invalid email or password.".to_string(),
        ));
    }
    if user.get("is_active").and_then(Value::as_bool) == Some(false) {
        return Err(AppError::Forbidden("Account is disabled.".to_string()));
    }

    let user_id = value_str(&user, "id");
    let role = value_str(&user, "role");
    let token = create_access_token(&state, &user_id, &payload.email, &role)?;

    Ok(Json(json!({
        "access_token": token,
        "token_type": "bearer",
        "user": without_password_hash(user),
    })))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    let pool = state.pool()?;

    let user = get_row(pool, "app_users", &claims.sub).await?;
    Ok(Json(without_password_hash(user)))
}

/// Self-service signups are always tenants; elevated roles only come from
/// the admin-gated users resource.
fn registration_record(payload: &RegisterInput) -> Result<Map<String, Value>, AppError> {
    let mut record = remove_nulls(serialize_to_map(payload));
    record.remove("password");
    record.insert(
        "email".to_string(),
        Value::String(payload.email.trim().to_lowercase()),
    );
    record.insert(
        "password_hash".to_string(),
        Value::String(hash_password(&payload.password)?),
    );
    record.insert("role".to_string(), Value::String(ROLE_TENANT.to_string()));
    record.insert("is_active".to_string(), Value::Bool(true));
    Ok(record)
}

fn without_password_hash(mut user: Value) -> Value {
    if let Some(map) = user.as_object_mut() {
        map.remove("password_hash");
    }
    user
}

fn value_str(row: &Value, key: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_ignores_client_supplied_role() {
        let payload: RegisterInput = serde_json::from_value(json!({
            "full_name": "Budi",
            "email": "Budi@Example.com",
            "password": "hunter22hunter22",
            "role": "admin",
        }))
        .unwrap();

        let record = registration_record(&payload).unwrap();
        assert_eq!(
            record.get("role").and_then(Value::as_str),
            Some(ROLE_TENANT)
        );
        assert_eq!(
            record.get("email").and_then(Value::as_str),
            Some("budi@example.com")
        );
        assert!(record.get("password").is_none());
        assert!(record.get("password_hash").is_some());
    }
}
