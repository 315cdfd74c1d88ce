#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Normal,
    Cleared,
    Flagged,
    /// The mine that ended the game. Only ever set on a mine.
    BlewUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardState {
    Playing,
    Won,
    Lost,
}

impl BoardState {
    pub fn is_finished(self) -> bool {
        self != BoardState::Playing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub mine: bool,
    /// Mines in the surrounding 3x3 window. Meaningless until mines are placed.
    pub adjacent: u8,
    pub state: CellState,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            mine: false,
            adjacent: 0,
            state: CellState::Normal,
        }
    }
}
