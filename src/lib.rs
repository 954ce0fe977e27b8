use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod models;
pub mod processing;
pub mod services;
pub mod state;
pub mod time_window;
pub mod webhook;

use state::AppState;
use webhook::{health, post_webhook};

pub fn create_app_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/amocrm/webhook", post(post_webhook))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}
