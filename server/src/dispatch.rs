//! Keeps each board's chat message in step with the board.
//!
//! One task per game listens for [`BoardChanged`] events and pushes the
//! current render through the game's [`UpdateLimiter`]. The final push of a
//! finished game skips the limiter, after which the game is dropped from the
//! registry.
//!
//! [`UpdateLimiter`]: crate::rate_limit::UpdateLimiter

use std::sync::Arc;

use tokio::{
    sync::mpsc::UnboundedReceiver,
    task::JoinHandle,
    time,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    game::{Game, Games},
    host::{MessageHost, PushResponse},
    logic::BoardChanged,
};

/// Rate limited answers tolerated for a single push before it is dropped.
pub const MAX_PUSH_ATTEMPTS: usize = 5;

pub fn spawn(
    game: Arc<Game>,
    games: Games,
    host: Arc<dyn MessageHost>,
    mut events: UnboundedReceiver<BoardChanged>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(mut change) = events.recv().await {
            // only the newest state matters, earlier events in a burst are stale
            while let Ok(next) = events.try_recv() {
                change = next;
            }

            if change.state.is_finished() {
                push_latest(&game, host.as_ref()).await;
                games.remove(game.id);
                info!("Board {} finished as {:?}", game.id, change.state);
                break;
            }

            let pushed_game = Arc::clone(&game);
            let pushed_host = Arc::clone(&host);
            let scheduled = game
                .limiter()
                .run_now_or_deferred(move || async move {
                    push_latest(&pushed_game, pushed_host.as_ref()).await;
                })
                .await;
            debug!("Update of board {}: {:?}", game.id, scheduled);
        }

        debug!("Dispatcher for board {} stopped", game.id);
    })
}

/// Renders the board as it is now and edits its message. Rate limit budgets
/// reported by the host are fed back into the game's limiter.
#[instrument(level = "trace", skip(game, host), fields(board = game.id))]
pub async fn push_latest(game: &Game, host: &dyn MessageHost) {
    let Some(message_id) = game.message_id() else {
        debug!("Board {} has no message yet", game.id);
        return;
    };
    let _pushing = game.lock_push().await;

    for attempt in 1..=MAX_PUSH_ATTEMPTS {
        let rendered = game.render().await;
        match host.edit(message_id, &rendered).await {
            Ok(PushResponse::Delivered { rates }) => {
                if let Some(rates) = rates {
                    let limiter = game.limiter();
                    let reset_at = limiter.instant_from_epoch(rates.reset_epoch);
                    limiter.insert_observed_rates(reset_at, rates.remaining).await;
                }
                return;
            }
            Ok(PushResponse::RateLimited { retry_after }) => {
                debug!(
                    "Edit of board {} rate limited on attempt {}, retrying in {:?}",
                    game.id, attempt, retry_after
                );
                if attempt < MAX_PUSH_ATTEMPTS {
                    time::sleep(retry_after).await;
                }
            }
            Err(err) => {
                warn!("Failed to update board {}: {}", game.id, err);
                return;
            }
        }
    }

    warn!(
        "Dropped update of board {} after {} rate limited attempts",
        game.id, MAX_PUSH_ATTEMPTS
    );
}
