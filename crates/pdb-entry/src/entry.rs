//! The logical entry and the comparators/`combine` defined over any physical encoding of it.

use std::cmp::Ordering;

use crate::format::PackedEntry;
use crate::key::{GameResult, Level};

/// One index record: the aggregated statistics for a single `(position, reverse move, level,
/// result)` tuple (§3).
///
/// This is the in-memory, format-independent representation. It is packed into one of
/// [`crate::format::beta::Beta`], [`crate::format::delta::Delta`], or
/// [`crate::format::epsilon`]'s smeared rows for storage; see [`crate::format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// 128-bit Zobrist hash of the position, as `(high, low)`. Physical formats keep as much of
    /// this as their byte budget allows (see each format's module docs).
    pub hash: (u64, u64),
    /// The packed reverse move bits entering this position: format A (29 bits, see
    /// `chess_engine::reversemove`), the same encoding every physical format in this crate uses.
    pub reverse_move: u32,
    pub level: Level,
    pub result: GameResult,
    /// Number of occurrences. Always at least 1 for an entry that exists.
    pub count: u64,
    /// Signed sum of `(white_elo - black_elo)` across occurrences.
    pub elo_diff: i64,
    /// Smallest game index that reached this tuple.
    pub first_game: u32,
    /// Largest game index that reached this tuple.
    pub last_game: u32,
}

impl Entry {
    /// A fresh entry for a single occurrence.
    pub fn single(
        hash: (u64, u64),
        reverse_move: u32,
        level: Level,
        result: GameResult,
        elo_diff: i64,
        game_index: u32,
    ) -> Self {
        Entry {
            hash,
            reverse_move,
            level,
            result,
            count: 1,
            elo_diff,
            first_game: game_index,
            last_game: game_index,
        }
    }
}

/// Merges two entries sharing the same `Full` key (§4.D): counts add, Elo diffs add, first-game
/// is the min, last-game is the max.
///
/// # Panics
///
/// Debug builds assert `a` and `b` share a `Full` key; callers (the sort worker's unique+combine
/// pass, the merge engine's equal-key coalescing) are expected to have already checked this.
pub fn combine(a: &Entry, b: &Entry) -> Entry {
    debug_assert_eq!(a.hash, b.hash, "combine requires equal hash");
    debug_assert_eq!(
        a.reverse_move, b.reverse_move,
        "combine requires equal reverse move"
    );
    debug_assert_eq!(a.level, b.level, "combine requires equal level");
    debug_assert_eq!(a.result, b.result, "combine requires equal result");

    Entry {
        hash: a.hash,
        reverse_move: a.reverse_move,
        level: a.level,
        result: a.result,
        count: a.count + b.count,
        elo_diff: a.elo_diff + b.elo_diff,
        first_game: a.first_game.min(b.first_game),
        last_game: a.last_game.max(b.last_game),
    }
}

/// Formats that can turn a logical entry into one or more physical rows and reassemble a run of
/// their own rows back into one, so generic query/ingest code
/// ([`pdb_storage::partition::Partition`], `pdb`'s `Database`) can work over any of them without
/// knowing the concrete encoding (§4.D, §4.I).
///
/// [`crate::format::beta::Beta`] and [`crate::format::delta::Delta`] always pack one row per
/// entry. [`crate::format::epsilon::Row`] may need several to carry a wide count or Elo sum
/// (§4.I "smearing"); [`Self::group`]'s default walks `is_first_row()` boundaries to reassemble
/// them, which also covers the one-row formats trivially.
pub trait RowStats: PackedEntry {
    /// Packs `entry` into this format's physical row(s). Never returns an empty `Vec`.
    fn pack_rows(entry: &Entry) -> Vec<Self>;

    /// Reassembles one logical entry from a contiguous run of its own rows, in storage order.
    /// `rows[0]` must be that entry's first row (`is_first_row() == true`).
    fn unpack_rows(rows: &[Self]) -> Entry;

    /// Splits a `Full`-ordered slice of rows into whole logical entries, by `is_first_row()`
    /// boundaries, reassembling each with [`Self::unpack_rows`].
    fn group(rows: &[Self]) -> Vec<Entry> {
        let mut groups: Vec<Vec<Self>> = Vec::new();
        for &row in rows {
            if groups.is_empty() || row.is_first_row() {
                groups.push(vec![row]);
            } else {
                groups.last_mut().unwrap().push(row);
            }
        }
        groups.iter().map(|rows| Self::unpack_rows(rows)).collect()
    }
}

pub(crate) fn cmp_without_reverse_move<E: PackedEntry>(a: &E, b: &E) -> Ordering {
    a.key_hash().cmp(&b.key_hash())
}

pub(crate) fn cmp_with_reverse_move<E: PackedEntry>(a: &E, b: &E) -> Ordering {
    cmp_without_reverse_move(a, b).then_with(|| a.reverse_move_bits().cmp(&b.reverse_move_bits()))
}

pub(crate) fn cmp_full<E: PackedEntry>(a: &E, b: &E) -> Ordering {
    cmp_with_reverse_move(a, b)
        .then_with(|| a.level().cmp(&b.level()))
        .then_with(|| a.result().cmp(&b.result()))
        // Smeared rows of one logical entry must stay contiguous with their `isFirst` row
        // first (§3, §4.G); non-smeared formats always report `is_first_row() == true` so this
        // tie-breaker never fires for them.
        .then_with(|| b.is_first_row().cmp(&a.is_first_row()))
}
