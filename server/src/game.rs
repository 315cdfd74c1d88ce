use std::{
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use tokio::sync::{Mutex, MutexGuard};

use linksweeper_common::models::Pos;

use crate::{
    host::MessageId,
    logic::Board,
    rate_limit::UpdateLimiter,
    registry::Registry,
    render::{self, CharacterSet, RenderedBoard},
};

pub type Games = Arc<Registry<Game>>;

struct GameState {
    board: Board,
    style: CharacterSet,
    last_activity: Instant,
}

/// A board together with the chat message that shows it.
pub struct Game {
    pub id: u16,
    pub session: String,
    pub starter: String,
    public_url: String,
    message: OnceLock<MessageId>,
    limiter: Arc<UpdateLimiter>,
    pushing: Mutex<()>,
    state: Mutex<GameState>,
}

impl Game {
    pub fn new(
        id: u16,
        session: impl Into<String>,
        starter: impl Into<String>,
        board: Board,
        public_url: impl Into<String>,
        limiter: UpdateLimiter,
    ) -> Self {
        Self {
            id,
            session: session.into(),
            starter: starter.into(),
            public_url: public_url.into(),
            message: OnceLock::new(),
            limiter: Arc::new(limiter),
            pushing: Mutex::new(()),
            state: Mutex::new(GameState {
                board,
                style: CharacterSet::default(),
                last_activity: Instant::now(),
            }),
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message.get().map(String::as_str)
    }

    pub fn set_message_id(&self, id: MessageId) {
        let _ = self.message.set(id);
    }

    pub fn limiter(&self) -> &Arc<UpdateLimiter> {
        &self.limiter
    }

    /// Held for the whole of a push so edits reach the host in render order.
    pub async fn lock_push(&self) -> MutexGuard<'_, ()> {
        self.pushing.lock().await
    }

    pub async fn click(&self, pos: Pos, flagging: bool) -> bool {
        let mut state = self.state.lock().await;
        state.last_activity = Instant::now();
        state.board.click(pos, flagging)
    }

    pub async fn with_board<R>(&self, read: impl FnOnce(&Board) -> R) -> R {
        let state = self.state.lock().await;
        read(&state.board)
    }

    pub async fn render(&self) -> RenderedBoard {
        let state = self.state.lock().await;
        render::render(&state.board, self.id, &self.public_url, state.style)
    }

    pub async fn set_style(&self, style: CharacterSet) -> bool {
        let mut state = self.state.lock().await;
        state.last_activity = Instant::now();
        std::mem::replace(&mut state.style, style) != style
    }

    /// Stops change notifications so the game's dispatcher ends.
    pub async fn close(&self) {
        self.state.lock().await.board.close_events();
    }

    /// Finished games and games idle for longer than `inactive_timeout` can
    /// go. A game whose lock is held right now is in use and stays.
    pub fn should_cleanup(&self, inactive_timeout: Duration) -> bool {
        match self.state.try_lock() {
            Ok(state) => {
                state.board.state().is_finished()
                    || state.last_activity.elapsed() > inactive_timeout
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::BoardState;

    fn game(board: Board) -> Game {
        Game::new(
            9,
            "channel",
            "alice",
            board,
            "https://example.test",
            UpdateLimiter::new(5, Duration::from_secs(5)),
        )
    }

    #[tokio::test]
    async fn clicks_reach_the_board() {
        let game = game(Board::from_layout(3, 3, &[Pos::new(0, 0)]));

        assert!(game.click(Pos::new(2, 2), false).await);
        assert_eq!(game.with_board(|b| b.state()).await, BoardState::Won);
        assert!(game.render().await.title.contains("You win"));
    }

    #[tokio::test]
    async fn style_changes_are_reported_once() {
        let game = game(Board::from_layout(3, 3, &[]));

        assert!(game.set_style(CharacterSet::MonoWidth).await);
        assert!(!game.set_style(CharacterSet::MonoWidth).await);
        assert!(game.render().await.description.contains('＃'));
    }

    #[tokio::test]
    async fn message_id_is_set_once() {
        let game = game(Board::from_layout(3, 3, &[]));
        assert_eq!(game.message_id(), None);

        game.set_message_id("first".to_string());
        game.set_message_id("second".to_string());
        assert_eq!(game.message_id(), Some("first"));
    }

    #[tokio::test]
    async fn finished_and_idle_games_are_cleaned_up() {
        let game = game(Board::from_layout(3, 3, &[Pos::new(0, 0)]));
        assert!(!game.should_cleanup(Duration::from_secs(60)));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(game.should_cleanup(Duration::from_millis(1)));

        game.click(Pos::new(0, 0), false).await;
        assert!(game.should_cleanup(Duration::from_secs(60)));
    }
}
