pub mod auth;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod service;
pub mod validate;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use db::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub base_path: Arc<String>,
}

pub fn create_app(state: AppState) -> Router {
    let base_path = state.base_path.clone();

    let app_routes = Router::new()
        .route("/api/register", post(handlers::auth::register))
        .route("/api/login", post(handlers::auth::login))
        .route("/api/logout", post(handlers::auth::logout))
        .route("/api/tokens", get(handlers::auth::list_tokens))
        .route("/api/tokens", post(handlers::auth::create_token))
        .route("/api/tokens/{id}", delete(handlers::auth::revoke_token))
        .route("/api/createTodo", post(handlers::api::create_todo))
        .route("/api/getTodos", post(handlers::api::list_todos))
        .route("/api/updateTodo", post(handlers::api::update_todo))
        .route("/api/deleteTodo", post(handlers::api::delete_todo))
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::compression::CompressionLayer::new()),
        )
        .with_state(state);

    tracing::info!("base_path: {base_path:?}");

    if base_path.is_empty() {
        app_routes
    } else {
        Router::new().nest(&base_path, app_routes)
    }
}
