use std::sync::Arc;

use linksweeper_server::{
    app::{self, AppState},
    config::Config,
    host::{MemoryHost, MessageHost, WebhookHost},
};
use rocket::{Build, Rocket};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[rocket::launch]
fn rocket() -> Rocket<Build> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!("🚀 Starting linksweeper server");

    let config = Config::from_env();
    let host: Arc<dyn MessageHost> = match &config.webhook_url {
        Some(url) => {
            info!("💬 Pushing boards through the configured webhook");
            Arc::new(WebhookHost::new(url.clone()))
        }
        None => {
            warn!("WEBHOOK_URL is not set, boards are only logged");
            Arc::new(MemoryHost::new())
        }
    };

    let state = AppState::new(config, host);
    info!("📊 Initialized board registry and rate limiters");

    app::build(state)
}
