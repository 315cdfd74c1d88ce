use std::time::Duration;

use tokio::time;
use tracing::{debug, info};

use crate::game::Games;

pub async fn start_cleanup_task(games: Games, interval: Duration, inactive_timeout: Duration) {
    let mut ticker = time::interval(interval);

    info!(
        "Started board cleanup task: checking every {}s, inactive timeout: {}s",
        interval.as_secs(),
        inactive_timeout.as_secs()
    );

    loop {
        ticker.tick().await;
        cleanup_games(&games, inactive_timeout).await;
    }
}

/// Drops finished and idle boards. Returns how many went.
pub async fn cleanup_games(games: &Games, inactive_timeout: Duration) -> usize {
    let stale: Vec<u16> = games
        .ids()
        .into_iter()
        .filter(|id| {
            games
                .get(*id)
                .is_some_and(|game| game.should_cleanup(inactive_timeout))
        })
        .collect();

    let mut removed_count = 0;
    for id in stale {
        if let Some(game) = games.remove(id) {
            game.close().await;
            removed_count += 1;
            debug!("Cleaned up board: {}", id);
        }
    }

    if removed_count > 0 {
        info!("Cleaned up {} stale boards", removed_count);
    }
    removed_count
}
