use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use taxibook::config::AppConfig;
use taxibook::db;
use taxibook::handlers;
use taxibook::services::messaging::twilio::TwilioSmsProvider;
use taxibook::services::messaging::{LogOnlyProvider, MessagingProvider};
use taxibook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    if config.admin_token == "changeme" {
        tracing::warn!("ADMIN_TOKEN is the default, set it before exposing the server");
    }

    let conn = db::init_db(&config.database_url)?;

    let messaging: Arc<dyn MessagingProvider> = if config.twilio_configured() {
        tracing::info!("sending notifications via Twilio");
        Arc::new(TwilioSmsProvider::from_config(&config))
    } else {
        tracing::info!("Twilio not configured, notifications are logged only");
        Arc::new(LogOnlyProvider)
    };

    let addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState::new(conn, config, messaging));
    let app = handlers::router(state);

    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
