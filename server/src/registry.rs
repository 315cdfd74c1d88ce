use std::sync::Arc;

use dashmap::{DashMap, Entry};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Random ids tried before giving up on adding a board.
pub const MAX_ID_ATTEMPTS: usize = 1000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no free board id after {attempts} attempts, too many boards are active")]
    Exhausted { attempts: usize },
    #[error("session already has active board {0}")]
    SessionOccupied(u16),
}

/// Boards by 16-bit id, plus which board each session is playing.
///
/// The registry owns its entries; sessions only point at ids.
pub struct Registry<T> {
    boards: DashMap<u16, Arc<T>>,
    sessions: DashMap<String, u16>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            boards: DashMap::new(),
            sessions: DashMap::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_add(&self, value: T) -> Result<u16, RegistryError> {
        self.try_add_with(|_| value).map(|(id, _)| id)
    }

    #[instrument(level = "trace", skip(self, build))]
    pub fn try_add_with(
        &self,
        build: impl FnOnce(u16) -> T,
    ) -> Result<(u16, Arc<T>), RegistryError> {
        let mut rng = rand::rng();

        for _ in 0..MAX_ID_ATTEMPTS {
            let id: u16 = rng.random();
            match self.boards.entry(id) {
                Entry::Occupied(_) => {
                    debug!("Board id collision, trying another: {}", id);
                    continue;
                }
                Entry::Vacant(entry) => {
                    let value = Arc::new(build(id));
                    entry.insert(Arc::clone(&value));
                    info!("Registered board {}", id);
                    return Ok((id, value));
                }
            }
        }

        warn!(
            "Exhausted {} id attempts with {} boards registered",
            MAX_ID_ATTEMPTS,
            self.boards.len()
        );
        Err(RegistryError::Exhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    pub fn get(&self, id: u16) -> Option<Arc<T>> {
        self.boards.get(&id).map(|entry| entry.value().clone())
    }

    /// Removes a board and any session pointing at it.
    pub fn remove(&self, id: u16) -> Option<Arc<T>> {
        let removed = self.boards.remove(&id).map(|(_, value)| value);
        if removed.is_some() {
            self.sessions.retain(|_, board_id| *board_id != id);
            info!("Removed board {}", id);
        }
        removed
    }

    pub fn bind_session(&self, session: &str, id: u16) -> Result<(), RegistryError> {
        match self.sessions.entry(session.to_string()) {
            Entry::Occupied(entry) => Err(RegistryError::SessionOccupied(*entry.get())),
            Entry::Vacant(entry) => {
                entry.insert(id);
                debug!("Bound session {} to board {}", session, id);
                Ok(())
            }
        }
    }

    pub fn session(&self, session: &str) -> Option<u16> {
        self.sessions.get(session).map(|entry| *entry.value())
    }

    pub fn by_session(&self, session: &str) -> Option<(u16, Arc<T>)> {
        let id = self.session(session)?;
        self.get(id).map(|value| (id, value))
    }

    pub fn ids(&self) -> Vec<u16> {
        self.boards.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }
}
