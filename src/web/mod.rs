//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::Store;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Store,
}

/// HTTP API over reconciliation and ingestion.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig, store: Store) -> Self {
        Self {
            state: AppState { config, store },
        }
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/health", get(handlers::handle_health))
            // Configuration
            .route("/api/config", post(handlers::handle_apply_config))
            // Hierarchy
            .route("/api/systems", get(handlers::handle_list_systems))
            .route("/api/systems/{id}", get(handlers::handle_get_system))
            .route("/api/systems/{id}/components", get(handlers::handle_list_system_components))
            .route("/api/components/{id}", get(handlers::handle_get_component))
            .route("/api/components/{id}/metrics", get(handlers::handle_list_metrics))
            // Observations
            .route("/api/components/{id}/results", get(handlers::handle_list_results))
            .route(
                "/api/components/{id}/comments",
                get(handlers::handle_list_comments).delete(handlers::handle_delete_component_comments),
            )
            .route(
                "/api/results",
                post(handlers::handle_insert_result).delete(handlers::handle_prune_results),
            )
            .route(
                "/api/comments",
                post(handlers::handle_insert_comment)
                    .put(handlers::handle_update_comment)
                    .delete(handlers::handle_delete_comment),
            )
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.router();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
