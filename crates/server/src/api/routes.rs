use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::{optional_user, require_user};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let chats = Router::new()
        .route("/api/auth/me", get(handlers::handle_me))
        .route(
            "/api/chat",
            get(handlers::handle_list_chats).post(handlers::handle_create_chat),
        )
        .route(
            "/api/chat/{chat_id}",
            get(handlers::handle_get_chat).delete(handlers::handle_delete_chat),
        )
        .route("/api/chat/{chat_id}/messages", post(handlers::handle_send_message))
        .route("/api/chat/{chat_id}/stream", post(handlers::handle_stream_message))
        .route("/api/chat/{chat_id}/title", put(handlers::handle_update_title))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    let public = Router::new()
        .route("/api/public/chat", post(handlers::handle_public_chat))
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_user));

    Router::new()
        .route("/", get(handlers::health_check))
        .route("/api/auth/register", post(handlers::handle_register))
        .merge(chats)
        .merge(public)
        .fallback(handlers::handle_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
