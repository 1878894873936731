use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    auth::{assert_role, require_user, ROLE_ADMIN, ROLE_MANAGER},
    error::{AppError, AppResult},
    repository::table_service::{count_rows, create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, sort_ascending, validate_input, CreateRoomInput,
        RoomPath, RoomsQuery, UpdateRoomInput,
    },
    state::AppState,
};

pub const ROOM_STATUSES: &[&str] = &["available", "occupied", "under_repair"];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/rooms", axum::routing::get(list_rooms).post(create_room))
        .route(
            "/rooms/{room_id}",
            axum::routing::get(get_room)
                .patch(update_room)
                .delete(delete_room),
        )
}

async fn list_rooms(
    State(state): State<AppState>,
    Query(query): Query<RoomsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.pool()?;

    let mut filters = Map::new();
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        filters.insert("status".to_string(), Value::String(status.to_string()));
    }

    let limit = clamp_limit_in_range(query.limit, 1, 500);
    let rows = list_rows(
        pool,
        "rooms",
        Some(&filters),
        limit,
        query.offset.max(0),
        &query.sort_by,
        sort_ascending(&query.sort_order),
    )
    .await?;
    let total = count_rows(pool, "rooms", Some(&filters)).await?;

    // Embed the current occupant so the room list renders in one call.
    let mut active_filter = Map::new();
    active_filter.insert("is_active".to_string(), Value::Bool(true));
    let tenants = list_rows(pool, "tenants", Some(&active_filter), 1000, 0, "created_at", true).await?;
    let data: Vec<Value> = rows
        .into_iter()
        .map(|room| {
            let room_id = room.get("id").and_then(Value::as_str).unwrap_or_default();
            let occupant = tenants
                .iter()
                .find(|tenant| {
                    tenant.get("room_id").and_then(Value::as_str) == Some(room_id)
                })
                .cloned();
            json!({ "room": room, "tenant": occupant })
        })
        .collect();

    Ok(Json(json!({ "data": data, "total": total })))
}

async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateRoomInput>,
) -> AppResult<impl IntoResponse> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    validate_input(&payload)?;
    validate_room_status(&payload.status)?;
    let pool = state.pool()?;

    let record = remove_nulls(serialize_to_map(&payload));
    let created = create_row(pool, "rooms", &record).await?;
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_room(
    State(state): State<AppState>,
    Path(path): Path<RoomPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.pool()?;

    let room = get_row(pool, "rooms", &path.room_id).await?;
    Ok(Json(room))
}

async fn update_room(
    State(state): State<AppState>,
    Path(path): Path<RoomPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateRoomInput>,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let pool = state.pool()?;

    let patch = remove_nulls(serialize_to_map(&payload));
    if let Some(status) = patch.get("status").and_then(Value::as_str) {
        validate_room_status(status)?;
    }
    if let Some(price) = patch.get("monthly_price").and_then(Value::as_i64) {
        if price < 0 {
            return Err(AppError::BadRequest(
                "monthly_price cannot be negative.".to_string(),
            ));
        }
    }

    let updated = update_row(pool, "rooms", &path.room_id, &patch).await?;
    Ok(Json(updated))
}

async fn delete_room(
    State(state): State<AppState>,
    Path(path): Path<RoomPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let claims = require_user(&state, &headers).await?;
    assert_role(&claims, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let pool = state.pool()?;

    let mut active_filter = Map::new();
    active_filter.insert("room_id".to_string(), Value::String(path.room_id.clone()));
    active_filter.insert("is_active".to_string(), Value::Bool(true));
    let occupants = count_rows(pool, "tenants", Some(&active_filter)).await?;
    if occupants > 0 {
        return Err(AppError::Conflict(
            "Room still has an active tenant.".to_string(),
        ));
    }

    let deleted = delete_row(pool, "rooms", &path.room_id).await?;
    Ok(Json(deleted))
}

fn validate_room_status(status: &str) -> Result<(), AppError> {
    if ROOM_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Unknown room status '{status}'. Expected one of: {}.",
            ROOM_STATUSES.join(", ")
        )))
    }
}
