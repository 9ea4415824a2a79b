//! Turning a stream of games into entry buffers for the pipeline (§4.H "Ingest").
//!
//! Since PGN parsing is out of scope (§1), [`ingest_sequential`]/[`ingest_parallel`] accept BCGN
//! paths directly; a pre-parsed [`GameRecord`] stream (moves plus headers already extracted,
//! e.g. from a PGN lexer external to this crate) is the other entry point, exercising the same
//! per-ply entry construction without this workspace reimplementing a PGN lexer.

use std::path::{Path, PathBuf};

use bcgn::record::{Game, GameHeader, Outcome};
use chess_engine::{make_move, Position, ReverseMove};
use pdb_entry::{Entry, GameResult, Level, RowStats};
use tracing::warn;

/// Sentinel reverse-move bits meaning "no retraction" — the position is a game's starting
/// position, not reached by playing a move (§4.B "format B" defines an analogous null sentinel;
/// this workspace's wired format is A, whose packed values never exceed 29 bits, so `u32::MAX`
/// is unambiguous).
pub const NULL_REVERSE_MOVE: u32 = u32::MAX;

/// A pre-parsed game: header fields plus the move sequence, already extracted from whatever
/// source format (PGN, BCGN) produced them. [`Game`] (from `bcgn`) already has this shape, so
/// this is a thin alias rather than a new type.
pub type GameRecord = Game;

/// Running totals for one ingest call (§7 "BCGN per-game errors during ingest are recorded and
/// skipped").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub games_ingested: u64,
    pub games_skipped: u64,
    pub positions_indexed: u64,
}

impl IngestStats {
    fn merge(&mut self, other: IngestStats) {
        self.games_ingested += other.games_ingested;
        self.games_skipped += other.games_skipped;
        self.positions_indexed += other.positions_indexed;
    }
}

fn outcome_to_result(outcome: Outcome) -> GameResult {
    match outcome {
        Outcome::Unknown => GameResult::Unknown,
        Outcome::WhiteWin => GameResult::WhiteWin,
        Outcome::BlackWin => GameResult::BlackWin,
        Outcome::Draw => GameResult::Draw,
    }
}

/// Replays `game` from its start position, yielding one logical [`Entry`] per ply reached
/// (including the start position itself, keyed with [`NULL_REVERSE_MOVE`]) (§2 "Data flow on
/// ingest").
pub fn entries_for_game(game: &GameRecord, game_index: u32, level: Level) -> Vec<Entry> {
    let elo_diff = i64::from(game.header.white_elo) - i64::from(game.header.black_elo);
    let result = outcome_to_result(game.header.outcome);

    let mut entries = Vec::with_capacity(game.moves.len() + 1);
    let mut position = game.start_position();
    entries.push(Entry::single(
        position.zobrist_hash128(),
        NULL_REVERSE_MOVE,
        level,
        result,
        elo_diff,
        game_index,
    ));

    for &m in &game.moves {
        let reverse_move = ReverseMove::capture(&position, m);
        position = make_move(&position, m);
        entries.push(Entry::single(
            position.zobrist_hash128(),
            reverse_move.pack_a(),
            level,
            result,
            elo_diff,
            game_index,
        ));
    }

    entries
}

/// Converts a buffer of logical entries into a physical row format (§4.D/§4.I). Formats that
/// smear one entry across several rows ([`pdb_entry::format::epsilon::Row`]) expand here, so the
/// output may be longer than `entries`.
pub fn pack_entries<E: RowStats>(entries: &[Entry]) -> Vec<E> {
    entries.iter().flat_map(E::pack_rows).collect()
}

/// One game plus the header fields a [`crate::header_store::HeaderStore`] records for it —
/// separated from [`entries_for_game`] so a caller can append the header exactly once per game
/// regardless of how many physical buffer flushes its entries span.
pub fn header_for_game(game: &GameRecord, game_index: u32) -> (u32, GameHeader, u16) {
    (game_index, game.header.clone(), game.moves.len() as u16)
}

/// Splits `paths` into `workers` contiguous, roughly equal chunks for parallel ingest (§4.H).
pub fn chunk_paths(paths: &[PathBuf], workers: usize) -> Vec<Vec<PathBuf>> {
    if workers == 0 || paths.is_empty() {
        return vec![paths.to_vec()];
    }
    let chunk_size = paths.len().div_ceil(workers);
    paths.chunks(chunk_size.max(1)).map(|c| c.to_vec()).collect()
}

pub(crate) fn log_skip(path: &Path, err: &bcgn::BcgnError) {
    warn!(path = %path.display(), error = %err, "skipping unreadable game");
}

impl IngestStats {
    pub(crate) fn record_skip(&mut self) {
        self.games_skipped += 1;
    }

    pub(crate) fn record_ingested(&mut self, positions: usize) {
        self.games_ingested += 1;
        self.positions_indexed += positions as u64;
    }
}

pub(crate) fn fold(totals: &mut IngestStats, other: IngestStats) {
    totals.merge(other);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bcgn::record::{Date, Eco};
    use chess_core::{Move, MoveFlag, Square};

    fn sample_game() -> GameRecord {
        Game {
            header: GameHeader {
                outcome: Outcome::Draw,
                date: Date { year: 2021, month: 6, day: 15 },
                white_elo: 2000,
                black_elo: 1900,
                round: 1,
                eco: Eco { category: b'C', index: 20 },
                white_player: "A".to_string(),
                black_player: "B".to_string(),
                event: "E".to_string(),
                site: "S".to_string(),
                start_position: None,
                extra_tags: Vec::new(),
            },
            moves: vec![
                Move::new(Square::from_algebraic("e2").unwrap(), Square::from_algebraic("e4").unwrap(), MoveFlag::DoublePush),
                Move::new(Square::from_algebraic("e7").unwrap(), Square::from_algebraic("e5").unwrap(), MoveFlag::DoublePush),
            ],
        }
    }

    #[test]
    fn emits_one_entry_per_ply_plus_start_position() {
        let game = sample_game();
        let entries = entries_for_game(&game, 7, Level::Human);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].reverse_move, NULL_REVERSE_MOVE);
        assert_eq!(entries[0].hash, Position::startpos().zobrist_hash128());
        assert_ne!(entries[1].reverse_move, NULL_REVERSE_MOVE);
        assert!(entries.iter().all(|e| e.first_game == 7 && e.last_game == 7));
        assert!(entries.iter().all(|e| e.elo_diff == 100));
        assert!(entries.iter().all(|e| e.result == GameResult::Draw));
    }

    #[test]
    fn chunking_splits_paths_evenly() {
        let paths: Vec<PathBuf> = (0..10).map(|i| PathBuf::from(format!("g{i}.bcgn"))).collect();
        let chunks = chunk_paths(&paths, 3);
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 10);
        assert!(chunks.len() <= 3);
    }
}
