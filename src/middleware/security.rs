use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AppError;
use crate::state::AppState;

/// Reject requests whose Host header is not on the configured allow-list.
/// A `*` entry disables the check (useful behind a locked-down proxy).
pub async fn enforce_trusted_hosts(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let trusted = &state.config.trusted_hosts;
    if trusted.iter().any(|host| host.trim() == "*") {
        return Ok(next.run(request).await);
    }

    let host = request
        .headers()
        .get(http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(':').next().unwrap_or(value).trim())
        .unwrap_or_default();

    if host.is_empty() || !trusted.iter().any(|allowed| allowed.eq_ignore_ascii_case(host)) {
        return Err(AppError::BadRequest(format!(
            "Host '{host}' is not trusted."
        )));
    }

    Ok(next.run(request).await)
}
