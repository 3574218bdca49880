use axum::http::HeaderValue;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod constants;
mod db;
mod error;
mod models;
mod services;

use config::Config;
use constants::API_VERSION;
use db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "squaregrid_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting squaregrid backend");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("API Version: {}", API_VERSION);

    // Entity store (migrations run on connect)
    let db = Database::new(&config).await?;

    let app_state = api::AppState {
        db,
        config: config.clone(),
    };

    let app = build_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: api::AppState) -> Router {
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Games
        .route(
            "/api/v1/games",
            get(api::games::list_games).put(api::games::create_game),
        )
        .route(
            "/api/v1/games/{game_id}",
            get(api::games::get_game)
                .post(api::games::update_game)
                .delete(api::games::delete_game),
        )
        .route(
            "/api/v1/games/{game_id}/winner",
            post(api::games::draw_winner),
        )
        // Blocks
        .route(
            "/api/v1/games/{game_id}/blocks",
            put(api::blocks::add_block),
        )
        .route(
            "/api/v1/games/{game_id}/blocks/{block_id}",
            axum::routing::delete(api::blocks::delete_block),
        )
        .route(
            "/api/v1/games/{game_id}/blocks/{block_id}/claim",
            post(api::blocks::claim_block).delete(api::blocks::unclaim_block),
        )
        .route(
            "/api/v1/games/{game_id}/blocks/{block_id}/confirm",
            post(api::blocks::confirm_block),
        )
        // Lookup directory
        .route(
            "/api/v1/lookup/{group}/{name}",
            get(api::lookups::get_game_by_name),
        )
        .route(
            "/api/v1/lookup/{group}/{name}/available",
            get(api::lookups::check_name),
        )
        .route(
            "/api/v1/games/{game_id}/lookup/{group}/{name}",
            put(api::lookups::add_name),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_builds_with_memory_store() {
        let state = api::AppState {
            db: Database::in_memory(),
            config: config::test_config(),
        };
        let _router = build_router(state);
    }

    #[test]
    fn cors_accepts_origin_list() {
        let mut config = config::test_config();
        config.cors_allowed_origins = "https://a.example, https://b.example".to_string();
        let _layer = cors_from_config(&config);
    }
}
