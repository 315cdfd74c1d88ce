use serde::{Deserialize, Serialize};

/// Largest width or height a board may have. Each coordinate is packed into a
/// 4-bit nibble of a cell token.
pub const MAX_BOARD_SIDE: usize = 16;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pos {
    pub x: usize,
    pub y: usize,
}

impl Pos {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct GameParams {
    pub width: usize,
    pub height: usize,
    pub mines: usize,
}

impl GameParams {
    /// Clamps the dimensions to `[1, MAX_BOARD_SIDE]` and the mine count to
    /// `[0, width * height - 1]`, so at least one cell is always safe.
    pub fn clamped(self) -> Self {
        let width = self.width.clamp(1, MAX_BOARD_SIDE);
        let height = self.height.clamp(1, MAX_BOARD_SIDE);
        Self {
            width,
            height,
            mines: self.mines.min(width * height - 1),
        }
    }
}

impl Default for GameParams {
    fn default() -> Self {
        Self {
            width: 9,
            height: 9,
            mines: 10,
        }
    }
}
