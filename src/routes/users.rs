use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::{
    auth::{assert_role, hash_password, require_user, KNOWN_ROLES, ROLE_ADMIN},
    error::{AppError, AppResult},
    repository::table_service::{count_rows, create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, CreateUserInput,
        ListQuery, UpdateUserInput, UserPath,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/users", axum::routing::get(list_users).post(create_user))
        .route(
            "/users/{user_id}",
            axum::routing::get(get_user)
                .patch(update_user)
                .delete(delete_user),
        )
}

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN])?;
    let pool = state.pool()?;

    let limit = clamp_limit_in_range(query.limit, 1, 500);
    let rows = list_rows(
        pool,
        "app_users",
        None,
        limit,
        query.offset.max(0),
        &query.sort_by,
        query.ascending(),
    )
    .await?;
    let total = count_rows(pool, "app_users", None).await?;

    let sanitized: Vec<Value> = rows.into_iter().map(without_password_hash).collect();
    Ok(Json(json!({ "data": sanitized, "total": total })))
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateUserInput>,
) -> AppResult<impl IntoResponse> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN])?;
    validate_input(&payload)?;
    validate_role(&payload.role)?;
    let pool = state.pool()?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    record.remove("password");
    record.insert(
        "email".to_string(),
        Value::String(payload.email.trim().to_lowercase()),
    );
    record.insert(
        "password_hash".to_string(),
        Value::String(hash_password(&payload.password)?),
    );
    record.insert("is_active".to_string(), Value::Bool(true));

    let created = create_row(pool, "app_users", &record).await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(without_password_hash(created)),
    ))
}

async fn get_user(
    State(state): State<AppState>,
    Path(path): Path<UserPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN])?;
    let pool = state.pool()?;

    let user = get_row(pool, "app_users", &path.user_id).await?;
    Ok(Json(without_password_hash(user)))
}

async fn update_user(
    State(state): State<AppState>,
    Path(path): Path<UserPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateUserInput>,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN])?;
    let pool = state.pool()?;

    let mut patch = remove_nulls(serialize_to_map(&payload));
    if let Some(role) = patch.get("role").and_then(Value::as_str) {
        validate_role(role)?;
    }
    if let Some(email) = patch.get("email").and_then(Value::as_str) {
        patch.insert(
            "email".to_string(),
            Value::String(email.trim().to_lowercase()),
        );
    }
    if let Some(password) = payload.password.as_deref().filter(|p| !p.is_empty()) {
        if password.len() < 8 {
            return Err(AppError::UnprocessableEntity(
                "Password must be at least 8 characters.".to_string(),
            ));
        }
        patch.remove("password");
        patch.insert(
            "password_hash".to_string(),
            Value::String(hash_password(password)?),
        );
    } else {
        patch.remove("password");
    }

    let updated = update_row(pool, "app_users", &path.user_id, &patch).await?;
    Ok(Json(without_password_hash(updated)))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(path): Path<UserPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN])?;
    if claims.sub == path.user_id {
        return Err(AppError::Conflict(
            "You cannot delete your own account.".to_string(),
        ));
    }
    let pool = state.pool()?;

    let deleted = delete_row(pool, "app_users", &path.user_id).await?;
    Ok(Json(without_password_hash(deleted)))
}

fn validate_role(role: &str) -> Result<(), AppError> {
    if KNOWN_ROLES.contains(&role) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Unknown role '{role}'. Expected one of: {}.",
            KNOWN_ROLES.join(", ")
        )))
    }
}

fn without_password_hash(mut user: Value) -> Value {
    if let Some(map) = user.as_object_mut() {
        map.remove("password_hash");
    }
    user
}
