pub mod generators;
pub mod health;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth;
use crate::relay::handlers as relay;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Home + catalog
        .route("/", get(generators::handle_list_generators))
        .route("/api/generators", get(generators::handle_list_generators))
        .route("/api/generators/:id", get(generators::handle_get_generator))
        .route(
            "/api/generators/:id/compose",
            post(generators::handle_compose),
        )
        // Text resources read during composition
        .route("/templates/:name", get(generators::handle_get_template))
        .route("/context", get(generators::handle_get_context))
        // Relay
        .route("/api/generate", post(relay::handle_generate))
        // Login
        .route(auth::LOGIN_PATH, get(auth::handle_login_page))
        .route(
            auth::LOGIN_API_PATH,
            post(auth::handle_login).get(auth::handle_login_method_not_allowed),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_gate,
        ))
        .with_state(state)
}
