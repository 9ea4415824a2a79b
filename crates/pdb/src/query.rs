//! The facade-level query `Request`/response types (§4.H, §6).
//!
//! A [`Request`] names one or more positions (by FEN) and, per position, which
//! [`pdb_storage::Selector`]s to answer ("transpositions" ignores the reverse move that entered
//! the position; "exact" matches one specific reverse move; "retractions" instead groups by
//! reverse move). [`Database::query`](crate::database::Database::query) dispatches each position
//! independently so one bad FEN doesn't poison the whole response (§7 "Query errors are reported
//! per sub-query").

use chess_engine::Position;
use pdb_storage::{PositionStats, RetractionStats, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::header_store::PackedGameHeader;

/// Query-dispatch failures (§7 "Query").
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("database key {0:?} is not known to this process")]
    UnknownDbKey(String),
    #[error("unsupported selector: {0}")]
    UnsupportedSelector(String),
    #[error("invalid query position: {0}")]
    InvalidQueryPosition(String),
}

pub type Result<T> = std::result::Result<T, QueryError>;

/// What to compute for a requested position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorRequest {
    /// Aggregate over every reverse move that reaches the position ("transpositions", §6).
    Transpositions,
    /// Group by reverse move, answering "what leads here and with what stats" ("retractions",
    /// §6).
    Retractions,
}

/// One position to query, plus which selectors to answer for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionQuery {
    pub fen: String,
    pub selectors: Vec<SelectorRequest>,
    /// Whether to attach game headers from the header stores for matching entries (§4.H).
    #[serde(default)]
    pub with_headers: bool,
}

/// A full query request, naming one or more positions (§4.H "`Request` ... builds `Key`s from
/// requested positions").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub positions: Vec<PositionQuery>,
}

/// One `(level, result)` bucket's aggregate statistics, JSON-shaped for the CLI's `query`
/// response (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultBucket {
    pub level: String,
    pub result: String,
    pub count: u64,
    pub elo_diff: i64,
    pub first_game: u32,
    pub last_game: u32,
    /// Set when the query requested headers and the first game's header was found (§4.H).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_game_header: Option<GameSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_game_header: Option<GameSummary>,
}

/// A trimmed-down view of a [`PackedGameHeader`] attached to a query result (§4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSummary {
    pub white_player: String,
    pub black_player: String,
    pub event: String,
    pub year: u16,
}

impl From<PackedGameHeader> for GameSummary {
    fn from(header: PackedGameHeader) -> Self {
        GameSummary {
            white_player: header.white_player,
            black_player: header.black_player,
            event: header.event,
            year: header.date.year,
        }
    }
}

/// One retraction group: the reverse move (packed bits, opaque to JSON consumers without a
/// decoder) plus its statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetractionGroup {
    pub reverse_move_bits: u32,
    pub level: String,
    pub result: String,
    pub count: u64,
    pub elo_diff: i64,
    pub first_game: u32,
    pub last_game: u32,
}

/// The answer for one requested position: transposition totals, retraction groups, or an error
/// specific to this position (§7 "one failing selector does not poison the whole response").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PositionResult {
    pub transpositions: Vec<ResultBucket>,
    pub retractions: Vec<RetractionGroup>,
    pub errors: Vec<String>,
}

/// The full query response (§6 "emit JSON response on stdout").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Response {
    pub results: Vec<PositionResult>,
}

pub(crate) fn parse_position(fen: &str) -> Result<Position> {
    Position::from_fen(fen).map_err(|e| QueryError::InvalidQueryPosition(format!("{fen}: {e:?}")))
}

pub(crate) fn buckets_from_stats(stats: &PositionStats, selector: Selector) -> Vec<ResultBucket> {
    use pdb_entry::{GameResult, Level};
    let levels = [Level::Human, Level::Engine, Level::Server];
    let results = [
        GameResult::Unknown,
        GameResult::WhiteWin,
        GameResult::BlackWin,
        GameResult::Draw,
    ];

    let mut out = Vec::new();
    for level in levels {
        for result in results {
            let bucket = stats.get(selector, level, result);
            if bucket.count == 0 {
                continue;
            }
            out.push(ResultBucket {
                level: level_name(level).to_string(),
                result: result_name(result).to_string(),
                count: bucket.count,
                elo_diff: bucket.elo_diff,
                first_game: bucket.first_game,
                last_game: bucket.last_game,
                first_game_header: None,
                last_game_header: None,
            });
        }
    }
    out
}

pub(crate) fn groups_from_retractions(groups: &[RetractionStats]) -> Vec<RetractionGroup> {
    groups
        .iter()
        .map(|g| RetractionGroup {
            reverse_move_bits: g.reverse_move,
            level: level_name(g.level).to_string(),
            result: result_name(g.result).to_string(),
            count: g.stats.count,
            elo_diff: g.stats.elo_diff,
            first_game: g.stats.first_game,
            last_game: g.stats.last_game,
        })
        .collect()
}

fn level_name(level: pdb_entry::Level) -> &'static str {
    match level {
        pdb_entry::Level::Human => "human",
        pdb_entry::Level::Engine => "engine",
        pdb_entry::Level::Server => "server",
    }
}

fn result_name(result: pdb_entry::GameResult) -> &'static str {
    match result {
        pdb_entry::GameResult::Unknown => "unknown",
        pdb_entry::GameResult::WhiteWin => "white_win",
        pdb_entry::GameResult::BlackWin => "black_win",
        pdb_entry::GameResult::Draw => "draw",
    }
}

