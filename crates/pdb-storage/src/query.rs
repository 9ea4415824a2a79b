//! Query selectors and the per-position statistics they accumulate into (§4.G, §6).
//!
//! [`Partition::execute_query`](crate::partition::Partition::execute_query) scans every file's
//! key range for each requested [`Selector`] and folds matching rows into a [`PositionStats`]
//! indexed by `(selector, level, result)`. [`Partition::query_retractions`]
//! (crate::partition::Partition::query_retractions) instead groups by the reverse move itself.

use std::collections::HashMap;

use pdb_entry::{Entry, GameResult, Level};

/// What to match a position's entries against (§4.G, §6 "transpositions"/"retractions").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Only rows reached by this exact reverse move (`LessWithReverseMove` equality).
    Exact { reverse_move: u32 },
    /// All rows reaching the position regardless of reverse move (`LessWithoutReverseMove`
    /// equality) — the "transpositions" request.
    Transposition,
}

/// Aggregate statistics for one `(selector, level, result)` bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultStats {
    pub count: u64,
    pub elo_diff: i64,
    pub first_game: u32,
    pub last_game: u32,
}

impl ResultStats {
    /// Folds one logical entry's aggregate fields in, widening `first_game`/`last_game` and
    /// adding `count`/`elo_diff` (mirrors [`pdb_entry::combine`]'s merge rule). Callers pass a
    /// whole logical [`Entry`], already reassembled from however many physical rows its format
    /// spread it across (see [`pdb_entry::RowStats::group`]).
    pub fn add(&mut self, entry: &Entry) {
        if self.count == 0 {
            self.first_game = entry.first_game;
            self.last_game = entry.last_game;
        } else {
            self.first_game = self.first_game.min(entry.first_game);
            self.last_game = self.last_game.max(entry.last_game);
        }
        self.count += entry.count;
        self.elo_diff += entry.elo_diff;
    }
}

/// Per-position query result: every requested selector, broken down by level and result
/// (§4.G: "an array indexed by query selector × level × result").
#[derive(Debug, Clone, Default)]
pub struct PositionStats {
    buckets: HashMap<(Selector, Level, GameResult), ResultStats>,
}

impl PositionStats {
    pub fn new() -> Self {
        PositionStats::default()
    }

    pub fn add(&mut self, selector: Selector, entry: &Entry) {
        self.buckets
            .entry((selector, entry.level, entry.result))
            .or_default()
            .add(entry);
    }

    pub fn get(&self, selector: Selector, level: Level, result: GameResult) -> ResultStats {
        self.buckets
            .get(&(selector, level, result))
            .copied()
            .unwrap_or_default()
    }

    /// Sums every result bucket for `selector`/`level` (a caller asking "all results combined").
    pub fn total(&self, selector: Selector, level: Level) -> ResultStats {
        [
            GameResult::Unknown,
            GameResult::WhiteWin,
            GameResult::BlackWin,
            GameResult::Draw,
        ]
        .into_iter()
        .fold(ResultStats::default(), |mut acc, result| {
            let bucket = self.get(selector, level, result);
            acc.count += bucket.count;
            acc.elo_diff += bucket.elo_diff;
            if bucket.count > 0 {
                acc.first_game = if acc.first_game == 0 { bucket.first_game } else { acc.first_game.min(bucket.first_game) };
                acc.last_game = acc.last_game.max(bucket.last_game);
            }
            acc
        })
    }
}

/// One answer to [`crate::partition::Partition::query_retractions`]: the reverse move plus the
/// statistics of occurrences that arrived via it.
#[derive(Debug, Clone, Copy)]
pub struct RetractionStats {
    pub reverse_move: u32,
    pub level: Level,
    pub result: GameResult,
    pub stats: ResultStats,
}
