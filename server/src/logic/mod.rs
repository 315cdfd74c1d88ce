use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use linksweeper_common::models::{GameParams, Pos};

use crate::data::{BoardState, Cell, CellState};

pub mod placement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardChanged {
    pub state: BoardState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seeding {
    Unseeded,
    Seeded,
}

#[derive(Debug)]
pub struct Board {
    width: usize,
    height: usize,
    mines: usize,
    cells: Vec<Cell>,
    state: BoardState,
    seeding: Seeding,
    left_to_clear: usize,
    left_to_flag: i32,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    events: Option<UnboundedSender<BoardChanged>>,
}

pub fn neighbours(width: usize, height: usize, pos: Pos) -> impl Iterator<Item = Pos> {
    let xs = pos.x.saturating_sub(1)..=(pos.x + 1).min(width - 1);
    let ys = pos.y.saturating_sub(1)..=(pos.y + 1).min(height - 1);
    ys.flat_map(move |y| xs.clone().map(move |x| Pos::new(x, y)))
        .filter(move |near| *near != pos)
}

impl Board {
    pub fn new(params: GameParams) -> Self {
        let params = params.clamped();
        let total = params.width * params.height;
        Self {
            width: params.width,
            height: params.height,
            mines: params.mines,
            cells: vec![Cell::default(); total],
            state: BoardState::Playing,
            seeding: Seeding::Unseeded,
            left_to_clear: total - params.mines,
            left_to_flag: params.mines as i32,
            start_time: None,
            end_time: None,
            events: None,
        }
    }

    pub fn from_layout(width: usize, height: usize, mines: &[Pos]) -> Self {
        let params = GameParams {
            width,
            height,
            mines: 0,
        }
        .clamped();
        let mut mask = vec![false; params.width * params.height];
        for pos in mines {
            if pos.x < params.width && pos.y < params.height {
                mask[pos.x + pos.y * params.width] = true;
            }
        }

        let mut board = Self::new(params);
        board.apply_mines(&mask);
        board
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn state(&self) -> BoardState {
        self.state
    }

    pub fn left_to_clear(&self) -> usize {
        self.left_to_clear
    }

    pub fn left_to_flag(&self) -> i32 {
        self.left_to_flag
    }

    pub fn mine_count(&self) -> usize {
        self.mines
    }

    pub fn mines_placed(&self) -> bool {
        self.seeding == Seeding::Seeded
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn elapsed(&self) -> Option<TimeDelta> {
        let start = self.start_time?;
        Some(self.end_time.unwrap_or_else(Utc::now) - start)
    }

    pub fn contains(&self, pos: Pos) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    pub fn cell(&self, pos: Pos) -> Option<&Cell> {
        if !self.contains(pos) {
            return None;
        }
        self.cells.get(self.index(pos))
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<BoardChanged> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    pub fn close_events(&mut self) {
        self.events = None;
    }

    pub fn click(&mut self, pos: Pos, flagging: bool) -> bool {
        let Some(cell) = self.cell(pos) else {
            return false;
        };

        if cell.state == CellState::Cleared {
            self.chord(pos)
        } else if flagging {
            self.flag(pos)
        } else {
            self.clear(pos)
        }
    }

    pub fn clear(&mut self, pos: Pos) -> bool {
        let changed = self.apply_clear(pos);
        self.notify(changed)
    }

    pub fn flag(&mut self, pos: Pos) -> bool {
        let changed = self.apply_flag(pos);
        self.notify(changed)
    }

    pub fn chord(&mut self, pos: Pos) -> bool {
        let changed = self.apply_chord(pos);
        self.notify(changed)
    }

    fn notify(&mut self, changed: bool) -> bool {
        if !changed {
            return false;
        }

        if self.state.is_finished() && self.end_time.is_none() {
            self.end_time = Some(Utc::now());
            info!("Board finished: {:?}", self.state);
        }

        if let Some(events) = &self.events
            && events.send(BoardChanged { state: self.state }).is_err()
        {
            debug!("Board change listener is gone");
            self.events = None;
        }
        true
    }

    fn index(&self, pos: Pos) -> usize {
        pos.x + pos.y * self.width
    }

    fn apply_clear(&mut self, pos: Pos) -> bool {
        if self.state.is_finished() {
            return false;
        }
        match self.cell(pos) {
            Some(cell) if cell.state == CellState::Normal => {}
            _ => return false,
        }

        if self.seeding == Seeding::Unseeded {
            self.seed(pos, &mut rand::rng());
        }

        self.clear_cells([pos])
    }

    fn apply_flag(&mut self, pos: Pos) -> bool {
        if self.state.is_finished() || !self.contains(pos) {
            return false;
        }

        let index = self.index(pos);
        let cell = &mut self.cells[index];
        match cell.state {
            CellState::Normal => {
                cell.state = CellState::Flagged;
                self.left_to_flag -= 1;
            }
            CellState::Flagged => {
                cell.state = CellState::Normal;
                self.left_to_flag += 1;
            }
            CellState::Cleared | CellState::BlewUp => return false,
        }
        true
    }

    fn apply_chord(&mut self, pos: Pos) -> bool {
        if self.state.is_finished() {
            return false;
        }
        let expected = match self.cell(pos) {
            Some(cell) if cell.state == CellState::Cleared => cell.adjacent as usize,
            _ => return false,
        };

        let near: Vec<Pos> = neighbours(self.width, self.height, pos).collect();
        let flagged = near
            .iter()
            .filter(|p| self.cells[self.index(**p)].state == CellState::Flagged)
            .count();
        if flagged != expected {
            return false;
        }

        self.clear_cells(near)
    }

    fn clear_cells(&mut self, seeds: impl IntoIterator<Item = Pos>) -> bool {
        let mut queued = vec![false; self.cells.len()];
        let mut work = VecDeque::new();
        for pos in seeds {
            let index = self.index(pos);
            if !queued[index] {
                queued[index] = true;
                work.push_back(pos);
            }
        }

        let mut changed = false;
        while let Some(pos) = work.pop_front() {
            let index = self.index(pos);
            let cell = &mut self.cells[index];
            if cell.state != CellState::Normal {
                continue;
            }

            if cell.mine {
                cell.state = CellState::BlewUp;
                self.state = BoardState::Lost;
                return true;
            }

            cell.state = CellState::Cleared;
            let zero = cell.adjacent == 0;
            self.left_to_clear -= 1;
            changed = true;

            if self.left_to_clear == 0 {
                self.state = BoardState::Won;
                break;
            }

            if zero {
                for near in neighbours(self.width, self.height, pos) {
                    let near_index = self.index(near);
                    if !queued[near_index] && self.cells[near_index].state == CellState::Normal {
                        queued[near_index] = true;
                        work.push_back(near);
                    }
                }
            }
        }

        changed
    }

    fn seed<R: Rng + ?Sized>(&mut self, start: Pos, rng: &mut R) {
        let mask = placement::place_mines(self.width, self.height, self.mines, start, rng);
        self.apply_mines(&mask);
    }

    fn apply_mines(&mut self, mask: &[bool]) {
        for (cell, mine) in self.cells.iter_mut().zip(mask) {
            cell.mine = *mine;
        }

        for y in 0..self.height {
            for x in 0..self.width {
                let pos = Pos::new(x, y);
                let adjacent = neighbours(self.width, self.height, pos)
                    .filter(|near| self.cells[self.index(*near)].mine)
                    .count();
                let index = self.index(pos);
                self.cells[index].adjacent = adjacent as u8;
            }
        }

        let placed = self.cells.iter().filter(|cell| cell.mine).count();
        let flagged = self
            .cells
            .iter()
            .filter(|cell| cell.state == CellState::Flagged)
            .count();
        self.mines = placed;
        self.left_to_flag = placed as i32 - flagged as i32;
        self.left_to_clear = self.cells.len() - placed;
        self.start_time = Some(Utc::now());
        self.seeding = Seeding::Seeded;

        debug!(
            "Placed {} mines on {}x{} board",
            placed, self.width, self.height
        );
    }
}
