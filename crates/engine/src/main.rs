//! Loreforge Engine - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod app;
mod infrastructure;
mod use_cases;

use app::App;
use infrastructure::clock::SystemClock;
use use_cases::turn::{ModelConfig, PlatformKeys};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loreforge_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Loreforge Engine");

    // Load configuration
    let db_path = std::env::var("LOREFORGE_DB").unwrap_or_else(|_| "loreforge.db".into());
    let server_host = std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let server_port: u16 = std::env::var("SERVER_PORT")
        .or_else(|_| std::env::var("PORT"))
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .unwrap_or(3000);

    let platform_keys = PlatformKeys::from_env();
    if platform_keys.openai.is_none() {
        tracing::warn!(
            "OPENAI_API_KEY not set; turns will require a client-supplied key"
        );
    }
    let models = ModelConfig::from_env();
    tracing::info!(
        brain_model = %models.brain_model,
        voice_model = %models.voice_model,
        "Model configuration loaded"
    );

    // Connect to SQLite and wire up the application
    tracing::info!("Opening database at {}", db_path);
    let pool = infrastructure::persistence::connect(&db_path).await?;
    let clock: Arc<dyn infrastructure::ports::ClockPort> = Arc::new(SystemClock::new());
    let app = Arc::new(App::new(pool, clock, platform_keys, models).await?);

    // Build the router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = api::http::routes()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app);

    let addr: SocketAddr = format!("{}:{}", server_host, server_port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
