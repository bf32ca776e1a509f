use std::sync::Arc;

use spyrush::config;
use spyrush::gateway::{self, AppState};
use spyrush::registry::Registry;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    config::init();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .expect("Invalid PORT");

    let state = AppState {
        registry: Registry::new(),
        game_config: config::load_game_config(),
        catalog: Arc::new(config::load_locations()),
    };

    let app = gateway::router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .expect("Failed to bind");

    tracing::info!("Spyrush server running on port {}", port);

    axum::serve(listener, app).await.unwrap();
}
