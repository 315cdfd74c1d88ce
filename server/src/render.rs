use std::fmt::Write as _;

use linksweeper_common::{models::Pos, token};

use crate::{
    data::{BoardState, Cell, CellState},
    logic::Board,
};

/// Chat hosts stop turning markdown into links after this many per message.
pub const MAX_LINKS: usize = 99;
pub const MAX_DESCRIPTION: usize = 4096;
/// The status line is only added while the board text stays under this.
const STATUS_LINE_THRESHOLD: usize = 3950;
pub const COLOR: u32 = 0x4EAF51;
const FOOTER: &str = "Click a cell to clear it. Flag mode lasts 15 minutes.";

pub struct Characters {
    pub block: &'static str,
    pub flag: &'static str,
    pub wrong_flag: &'static str,
    pub mine: &'static str,
    pub exploded: &'static str,
    pub cleared: [&'static str; 9],
}

pub const EMOJI: Characters = Characters {
    block: "◻️",
    flag: "🚩",
    wrong_flag: "🏳",
    mine: "💣",
    exploded: "💥",
    cleared: ["◼️", "1️⃣", "2️⃣", "3️⃣", "4️⃣", "5️⃣", "6️⃣", "7️⃣", "8️⃣"],
};

pub const MONO_WIDTH: Characters = Characters {
    block: "＃",
    flag: "｜",
    wrong_flag: "／",
    mine: "ｏ",
    exploded: "＠",
    cleared: ["　", "１", "２", "３", "４", "５", "６", "７", "８"],
};

/// Which characters a board is drawn with. Mono-width keeps columns aligned
/// on clients that draw emoji at odd widths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CharacterSet {
    #[default]
    Emoji,
    MonoWidth,
}

impl CharacterSet {
    pub fn characters(self) -> &'static Characters {
        match self {
            CharacterSet::Emoji => &EMOJI,
            CharacterSet::MonoWidth => &MONO_WIDTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBoard {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub footer: String,
}

pub fn cell_symbol(cell: &Cell, state: BoardState, characters: &Characters) -> &'static str {
    match cell.state {
        CellState::Flagged if state == BoardState::Lost && !cell.mine => characters.wrong_flag,
        CellState::Flagged => characters.flag,
        CellState::BlewUp => characters.exploded,
        _ if state == BoardState::Lost && cell.mine => characters.mine,
        CellState::Normal => characters.block,
        CellState::Cleared => characters.cleared[cell.adjacent.min(8) as usize],
    }
}

pub fn title(board: &Board) -> String {
    match board.state() {
        BoardState::Playing => format!(
            "{}◻️   {}💣",
            board.left_to_clear(),
            board.left_to_flag()
        ),
        BoardState::Won => "🎉🎉 You win! 🎉🎉".to_string(),
        BoardState::Lost => "💣 You blew up! 💥".to_string(),
    }
}

/// Draws the grid. While the game runs, every cell a click can still change
/// links to its token, up to [`MAX_LINKS`].
pub fn grid(board: &Board, board_id: u16, public_url: &str, characters: &Characters) -> String {
    let state = board.state();
    let mut out = String::new();
    let mut links = 0;

    for y in 0..board.height() {
        for x in 0..board.width() {
            let Some(cell) = board.cell(Pos::new(x, y)) else {
                continue;
            };
            let symbol = cell_symbol(cell, state, characters);
            let clickable = cell.state != CellState::Cleared || cell.adjacent > 0;

            if state == BoardState::Playing && clickable && links < MAX_LINKS {
                links += 1;
                let _ = write!(
                    out,
                    "[{}]({}/{})",
                    symbol,
                    public_url,
                    token::encode(board_id, x as u8, y as u8)
                );
            } else if x == 0 && y == 0 && symbol.trim().is_empty() {
                // hosts trim leading whitespace, which would shift the first row
                out.push('．');
            } else {
                out.push_str(symbol);
            }
        }
        out.push('\n');
    }

    out
}

fn truncate(text: &mut String, max_chars: usize) {
    if text.chars().count() <= max_chars {
        return;
    }
    let cut = text
        .char_indices()
        .nth(max_chars - 3)
        .map(|(index, _)| index)
        .unwrap_or(text.len());
    text.truncate(cut);
    text.push_str("...");
}

pub fn render(board: &Board, board_id: u16, public_url: &str, style: CharacterSet) -> RenderedBoard {
    let mut description = grid(board, board_id, public_url, style.characters());
    truncate(&mut description, MAX_DESCRIPTION);

    if description.chars().count() < STATUS_LINE_THRESHOLD
        && let Some(start) = board.start_time()
    {
        match board.state() {
            BoardState::Playing => {
                let _ = write!(description, "\nStarted <t:{}:R>", start.timestamp());
            }
            finished => {
                let seconds = board
                    .elapsed()
                    .map(|elapsed| elapsed.num_milliseconds() as f64 / 1000.0)
                    .unwrap_or_default();
                let outcome = if finished == BoardState::Won { "Won" } else { "Lost" };
                let _ = write!(description, "\n{} in {:.1} seconds!", outcome, seconds);
            }
        }
    }

    if board.state() == BoardState::Playing {
        let modes = format!(
            "\n[🚩 Flag]({url}/set-flagging/{id})   [◻️ Clear]({url}/remove-flagging/{id})",
            url = public_url,
            id = board_id
        );
        if description.chars().count() + modes.chars().count() <= MAX_DESCRIPTION {
            description.push_str(&modes);
        }
    }

    RenderedBoard {
        title: title(board),
        description,
        color: COLOR,
        footer: FOOTER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linksweeper_common::models::GameParams;

    const URL: &str = "https://example.test";

    fn link_count(text: &str) -> usize {
        text.matches("](").count()
    }

    #[test]
    fn fresh_board_links_every_cell() {
        let board = Board::new(GameParams::default());
        let rendered = render(&board, 42, URL, CharacterSet::Emoji);

        assert_eq!(rendered.title, "71◻️   10💣");
        // 81 cells plus the two mode links
        assert_eq!(link_count(&rendered.description), 83);
        assert!(rendered.description.contains(&format!("{URL}/{}", token::encode(42, 8, 8))));
        assert!(rendered.description.contains(&format!("{URL}/set-flagging/42")));
        assert!(!rendered.description.contains("Started"));
        assert_eq!(rendered.color, COLOR);
    }

    #[test]
    fn links_are_capped() {
        let board = Board::new(GameParams {
            width: 16,
            height: 16,
            mines: 40,
        });
        let text = grid(&board, 1, URL, &EMOJI);

        assert_eq!(link_count(&text), MAX_LINKS);
        assert_eq!(text.lines().count(), 16);
    }

    #[test]
    fn lost_board_shows_mines_and_wrong_flags() {
        let mut board = Board::from_layout(4, 1, &[Pos::new(0, 0), Pos::new(3, 0)]);
        board.flag(Pos::new(2, 0));
        board.clear(Pos::new(1, 0));
        board.clear(Pos::new(0, 0));

        let rendered = render(&board, 7, URL, CharacterSet::Emoji);

        assert_eq!(rendered.title, "💣 You blew up! 💥");
        assert_eq!(rendered.description.lines().next(), Some("💥1️⃣🏳💣"));
        assert!(rendered.description.contains("Lost in"));
        assert_eq!(link_count(&rendered.description), 0);
    }

    #[test]
    fn wrong_flag_is_marked_after_a_loss() {
        let mut board = Board::from_layout(3, 3, &[Pos::new(0, 0)]);
        board.flag(Pos::new(2, 2));
        board.clear(Pos::new(0, 0));

        let text = grid(&board, 7, URL, &EMOJI);
        assert_eq!(text.lines().nth(2), Some("◻️◻️🏳"));
    }

    #[test]
    fn won_board_reports_the_time() {
        let mut board = Board::new(GameParams {
            width: 4,
            height: 4,
            mines: 0,
        });
        board.clear(Pos::new(0, 0));

        let rendered = render(&board, 7, URL, CharacterSet::MonoWidth);

        assert_eq!(rendered.title, "🎉🎉 You win! 🎉🎉");
        assert!(rendered.description.starts_with("．　　　\n"));
        assert!(rendered.description.contains("Won in"));
        assert!(!rendered.description.contains("set-flagging"));
    }

    #[test]
    fn playing_board_shows_start_time() {
        let mut board = Board::from_layout(5, 5, &[Pos::new(4, 4)]);
        board.flag(Pos::new(4, 4));
        board.flag(Pos::new(3, 3));

        let rendered = render(&board, 3, URL, CharacterSet::Emoji);

        assert_eq!(rendered.title, "24◻️   -1💣");
        assert!(rendered.description.contains("Started <t:"));
    }

    #[test]
    fn truncates_long_text() {
        let mut text = "◼".repeat(5000);
        truncate(&mut text, MAX_DESCRIPTION);
        assert_eq!(text.chars().count(), MAX_DESCRIPTION);
        assert!(text.ends_with("..."));

        let mut short = "abc".to_string();
        truncate(&mut short, MAX_DESCRIPTION);
        assert_eq!(short, "abc");
    }
}
