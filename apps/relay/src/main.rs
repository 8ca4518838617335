use std::net::SocketAddr;
use std::path::Path;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay::config::Config;
use relay::gateway::bridge::RedisBridge;
use relay::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;
    let gateway_path = config.gateway_path.clone();

    let (bridge, inbound) = RedisBridge::connect(&config.redis_url)
        .await
        .expect("failed to connect to redis");

    tracing::info!(
        instance = %config.instance_name,
        redis = %config.redis_url,
        "relay configured"
    );

    let state = AppState::new(config, bridge, inbound);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = relay::routes::router(&gateway_path)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "relay listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(state))
        .await
        .expect("server error");
}

async fn shutdown(state: AppState) {
    let _ = tokio::signal::ctrl_c().await;
    state.terminate();
}
