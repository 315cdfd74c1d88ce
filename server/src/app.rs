use std::sync::Arc;

use rocket::{
    Build, Rocket, catchers,
    fairing::{Fairing, Info, Kind},
    routes,
};
use tracing::{info, warn};

use crate::{
    cleanup::start_cleanup_task,
    config::Config,
    creation_limit::CreationLimiter,
    game::Games,
    host::MessageHost,
    registry::Registry,
    routes,
};

/// Everything the routes and background tasks share.
#[derive(Clone)]
pub struct AppState {
    pub games: Games,
    pub host: Arc<dyn MessageHost>,
    pub config: Arc<Config>,
    pub creation: Arc<CreationLimiter>,
}

impl AppState {
    pub fn new(config: Config, host: Arc<dyn MessageHost>) -> Self {
        Self {
            games: Arc::new(Registry::new()),
            host,
            creation: Arc::new(CreationLimiter::per_minute(config.games_per_minute)),
            config: Arc::new(config),
        }
    }
}

struct CleanupFairing;

#[rocket::async_trait]
impl Fairing for CleanupFairing {
    fn info(&self) -> Info {
        Info {
            name: "Cleanup Task",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        if let Some(state) = rocket.state::<AppState>() {
            info!("Starting cleanup task for stale boards");
            let games = state.games.clone();
            let config = Arc::clone(&state.config);
            tokio::spawn(async move {
                start_cleanup_task(games, config.cleanup_interval, config.inactive_timeout).await;
            });
        } else {
            warn!("Failed to get app state for cleanup task");
        }
        Ok(rocket)
    }
}

pub fn build(state: AppState) -> Rocket<Build> {
    let rocket = rocket::build()
        .attach(CleanupFairing)
        .manage(state)
        .mount(
            "/",
            routes![
                routes::click,
                routes::set_flagging,
                routes::remove_flagging,
                routes::command
            ],
        )
        .register("/", catchers![routes::not_found]);

    info!("📡 Endpoints: GET /<token>, GET /set-flagging/<id>, GET /remove-flagging/<id>, POST /command");
    rocket
}
