use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use sendlater_command::CommandHandler;
use sendlater_core::config::SendlaterConfig;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: SendlaterConfig,
    pub handler: CommandHandler,
}

impl AppState {
    pub fn new(config: SendlaterConfig, handler: CommandHandler) -> Self {
        Self { config, handler }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/monitor", get(crate::http::monitor::monitor_handler))
        .route("/commands/schedule", post(crate::http::command::command_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
