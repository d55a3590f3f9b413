use std::sync::Arc;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parley_shared::User;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn resolve_user(state: &AppState, headers: &HeaderMap) -> ApiResult<Option<User>> {
    match bearer_token(headers) {
        Some(token) => Ok(state.db.user_by_token(token)?),
        None => Ok(None),
    }
}

/// Reject requests without a valid bearer token; otherwise attach the `User`
/// as a request extension.
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let resolved = resolve_user(&state, req.headers());
    match resolved {
        Ok(Some(user)) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Ok(None) => ApiError::Unauthorized.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Attach the `User` when a valid token is present; never rejects.
pub async fn optional_user(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let resolved = resolve_user(&state, req.headers());
    match resolved {
        Ok(Some(user)) => {
            req.extensions_mut().insert(user);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Ignoring token lookup failure on public route: {}", e),
    }
    next.run(req).await
}
