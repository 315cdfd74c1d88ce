use rand::{Rng, seq::SliceRandom};
use tracing::{debug, warn};

use linksweeper_common::models::Pos;

/// Attempt ceiling for rejection sampling. Hitting it leaves the board with
/// fewer mines than requested.
pub const MAX_SAMPLING_ATTEMPTS: usize = 10_000;

/// Above this ratio of mines to cells outside a 3x3 safe zone, mines are dealt
/// from a shuffled list instead of sampled.
const DENSE_RATIO: f64 = 0.6;

/// Returns a row-major mine mask for a `width` x `height` board.
///
/// `start` is never a mine. When both sides are at least 5 its whole 3x3
/// neighbourhood is kept clear too, unless there are more mines than cells
/// outside of it.
pub fn place_mines<R: Rng + ?Sized>(
    width: usize,
    height: usize,
    count: usize,
    start: Pos,
    rng: &mut R,
) -> Vec<bool> {
    let safe_distance = if width >= 5 && height >= 5 { 1 } else { 0 };
    let in_safe_zone =
        |pos: Pos| pos.x.abs_diff(start.x) <= safe_distance && pos.y.abs_diff(start.y) <= safe_distance;

    let total = width * height;
    let density = count as f64 / total.saturating_sub(9).max(1) as f64;
    let mut mines = vec![false; total];

    if density > DENSE_RATIO {
        let mut outside = Vec::with_capacity(total);
        let mut backup = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let pos = Pos::new(x, y);
                if !in_safe_zone(pos) {
                    outside.push(pos);
                } else if pos != start {
                    backup.push(pos);
                }
            }
        }

        outside.shuffle(rng);
        backup.shuffle(rng);

        for pos in outside.into_iter().chain(backup).take(count) {
            mines[pos.x + pos.y * width] = true;
        }
        debug!("Dealt {} mines from shuffled cells (density {:.2})", count, density);
    } else {
        let mut placed = 0;
        for _ in 0..MAX_SAMPLING_ATTEMPTS {
            if placed == count {
                break;
            }

            let pos = Pos::new(rng.random_range(0..width), rng.random_range(0..height));
            let index = pos.x + pos.y * width;
            if in_safe_zone(pos) || mines[index] {
                continue;
            }

            mines[index] = true;
            placed += 1;
        }

        if placed < count {
            warn!(
                "Gave up placing mines after {} attempts: placed {} of {}",
                MAX_SAMPLING_ATTEMPTS, placed, count
            );
        }
    }

    mines
}

/// Always yields zero, so every sampled cell is the top-left one.
#[cfg(test)]
pub(crate) struct StuckRng;

#[cfg(test)]
impl rand::RngCore for StuckRng {
    fn next_u32(&mut self) -> u32 {
        0
    }

    fn next_u64(&mut self) -> u64 {
        0
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(0);
    }
}
