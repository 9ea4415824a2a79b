//! The `db_epsilon`/`db_epsilon_smeared_a` physical row (§4.I): 16 bytes, one or more per
//! logical entry.
//!
//! Like [`crate::format::beta::Beta`]/[`crate::format::delta::Delta`], this format uses the
//! Format A (29-bit) reverse move encoding, so any reverse move producible by
//! `chess_engine::reversemove::ReverseMove::pack_a` packs here unchanged; ingest does not need to
//! know which physical format it is feeding.
//!
//! Layout: `hash_lo: u64` (8 B, low 64 bits of the Zobrist hash) followed by a packed `u64`
//! (8 B) holding, from the high bit down:
//!
//! ```text
//! reverse_move (Format A) : 29 bits
//! level                   : 2 bits
//! result                  : 2 bits
//! is_first                : 1 bit
//! sign (of eloDiff, first row only) : 1 bit
//! count_slice             : 2 bits   (COUNT_SLICE_BITS)
//! elo_slice               : 12 bits  (ELO_SLICE_BITS)
//! reserved                : 15 bits  — must be zero
//! ```
//!
//! A logical entry decomposes into `ceil(bits_needed(count - 1) / 2)` rows for its count and
//! `ceil(bits_needed(|eloDiff|) / 12)` rows for its Elo sum, whichever is more; short rows pad
//! their unused slice with zero. [`smear`] produces the rows, [`unsmear`] reassembles them.

use crate::entry::Entry;
use crate::format::PackedEntry;
use crate::key::{GameResult, Level};

const REVERSE_MOVE_SHIFT: u32 = 35;
const REVERSE_MOVE_MASK: u64 = 0x1FFF_FFFF; // 29 bits
const LEVEL_SHIFT: u32 = 33;
const RESULT_SHIFT: u32 = 31;
const IS_FIRST_SHIFT: u32 = 30;
const SIGN_SHIFT: u32 = 29;
const COUNT_SLICE_SHIFT: u32 = 27;
const ELO_SLICE_SHIFT: u32 = 15;

/// Width, in bits, of the count slice each row carries.
pub const COUNT_SLICE_BITS: u32 = 2;
/// Width, in bits, of the `|eloDiff|` slice each row carries.
pub const ELO_SLICE_BITS: u32 = 12;

const COUNT_SLICE_MASK: u64 = (1 << COUNT_SLICE_BITS) - 1;
const ELO_SLICE_MASK: u64 = (1 << ELO_SLICE_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub hash_lo: u64,
    pub reverse_move: u32,
    pub level: Level,
    pub result: GameResult,
    pub is_first: bool,
    /// Sign of the logical entry's `eloDiff`. Only meaningful when `is_first` is set; rows after
    /// the first carry `false` and are ignored by [`unsmear`].
    pub sign_negative: bool,
    pub count_slice: u8,
    pub elo_slice: u16,
}

impl Row {
    fn packed(&self) -> u64 {
        ((self.reverse_move as u64 & REVERSE_MOVE_MASK) << REVERSE_MOVE_SHIFT)
            | ((self.level.to_bits() as u64) << LEVEL_SHIFT)
            | ((self.result.to_bits() as u64) << RESULT_SHIFT)
            | ((self.is_first as u64) << IS_FIRST_SHIFT)
            | ((self.sign_negative as u64) << SIGN_SHIFT)
            | ((self.count_slice as u64 & COUNT_SLICE_MASK) << COUNT_SLICE_SHIFT)
            | ((self.elo_slice as u64 & ELO_SLICE_MASK) << ELO_SLICE_SHIFT)
    }

    fn from_packed(hash_lo: u64, packed: u64) -> Self {
        Row {
            hash_lo,
            reverse_move: ((packed >> REVERSE_MOVE_SHIFT) & REVERSE_MOVE_MASK) as u32,
            level: Level::from_bits(((packed >> LEVEL_SHIFT) & 0b11) as u8),
            result: GameResult::from_bits(((packed >> RESULT_SHIFT) & 0b11) as u8),
            is_first: (packed >> IS_FIRST_SHIFT) & 1 != 0,
            sign_negative: (packed >> SIGN_SHIFT) & 1 != 0,
            count_slice: ((packed >> COUNT_SLICE_SHIFT) & COUNT_SLICE_MASK) as u8,
            elo_slice: ((packed >> ELO_SLICE_SHIFT) & ELO_SLICE_MASK) as u16,
        }
    }
}

impl PackedEntry for Row {
    const SIZE: usize = 16;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.hash_lo.to_be_bytes());
        buf.extend_from_slice(&self.packed().to_be_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(bytes.len(), Self::SIZE, "epsilon row must be exactly 16 bytes");
        let hash_lo = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
        let packed = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
        Row::from_packed(hash_lo, packed)
    }

    fn key_hash(&self) -> u128 {
        (self.hash_lo as u128) << 64
    }

    fn reverse_move_bits(&self) -> u32 {
        self.reverse_move
    }

    fn level(&self) -> Level {
        self.level
    }

    fn result(&self) -> GameResult {
        self.result
    }

    fn is_first_row(&self) -> bool {
        self.is_first
    }

    /// Single-row combine: treats `self` and `other` each as a standalone, one-row logical
    /// entry, merges them, and re-smears — keeping only the resulting first row. Correct as
    /// long as the merged count and `|eloDiff|` each still fit in one row's slices; a logical
    /// entry that needs more rows should go through [`smear`]/[`unsmear`] directly, which is
    /// what a format-aware merge path (unlike the generic single-row [`PackedEntry::combine`])
    /// would do.
    fn combine(&self, other: &Self) -> Self {
        let merged = crate::entry::combine(&unsmear(&[*self]), &unsmear(&[*other]));
        smear(&merged).into_iter().next().expect("smear always yields at least one row")
    }
}

fn bits_needed(value: u64) -> u32 {
    64 - value.leading_zeros()
}

/// Splits a logical entry into its physical rows (§4.I).
pub fn smear(entry: &Entry) -> Vec<Row> {
    let count_minus_one = entry.count.saturating_sub(1);
    let abs_elo = entry.elo_diff.unsigned_abs();

    let rows_for_count = (bits_needed(count_minus_one).max(1) as u32 + COUNT_SLICE_BITS - 1)
        / COUNT_SLICE_BITS;
    let rows_for_elo =
        (bits_needed(abs_elo).max(1) as u32 + ELO_SLICE_BITS - 1) / ELO_SLICE_BITS;
    let num_rows = rows_for_count.max(rows_for_elo).max(1);

    (0..num_rows)
        .map(|i| Row {
            hash_lo: entry.hash.1,
            reverse_move: entry.reverse_move & REVERSE_MOVE_MASK as u32,
            level: entry.level,
            result: entry.result,
            is_first: i == 0,
            sign_negative: i == 0 && entry.elo_diff < 0,
            count_slice: ((count_minus_one >> (i * COUNT_SLICE_BITS)) & COUNT_SLICE_MASK) as u8,
            elo_slice: ((abs_elo >> (i * ELO_SLICE_BITS)) & ELO_SLICE_MASK) as u16,
        })
        .collect()
}

/// Reassembles a logical entry from its physical rows (§4.I). `rows[0]` must have `is_first`
/// set; `first_game`/`last_game` are not tracked by this format and come back as `0`.
///
/// # Panics
///
/// Panics if `rows` is empty or `rows[0].is_first` is false.
pub fn unsmear(rows: &[Row]) -> Entry {
    assert!(!rows.is_empty(), "unsmear requires at least one row");
    assert!(rows[0].is_first, "first row must have isFirst set");

    let mut count_minus_one: u64 = 0;
    let mut abs_elo: u64 = 0;
    for (i, row) in rows.iter().enumerate() {
        count_minus_one |= (row.count_slice as u64) << (i as u32 * COUNT_SLICE_BITS);
        abs_elo |= (row.elo_slice as u64) << (i as u32 * ELO_SLICE_BITS);
    }

    let first = rows[0];
    let elo_diff = if first.sign_negative {
        -(abs_elo as i64)
    } else {
        abs_elo as i64
    };

    Entry {
        hash: (0, first.hash_lo),
        reverse_move: first.reverse_move,
        level: first.level,
        result: first.result,
        count: count_minus_one + 1,
        elo_diff,
        first_game: 0,
        last_game: 0,
    }
}

impl crate::entry::RowStats for Row {
    fn pack_rows(entry: &Entry) -> Vec<Self> {
        smear(entry)
    }

    fn unpack_rows(rows: &[Self]) -> Entry {
        unsmear(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(count: u64, elo_diff: i64) -> Entry {
        Entry {
            hash: (0, 0xCAFE),
            reverse_move: 0xAB_CD, // fits in 29 bits
            level: Level::Human,
            result: GameResult::WhiteWin,
            count,
            elo_diff,
            first_game: 0,
            last_game: 0,
        }
    }

    #[test]
    fn single_occurrence_fits_one_row() {
        let rows = smear(&sample(1, 0));
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_first);
        let back = unsmear(&rows);
        assert_eq!(back.count, 1);
        assert_eq!(back.elo_diff, 0);
    }

    #[test]
    fn small_elo_diff_roundtrips_in_one_row() {
        let entry = sample(1, 800);
        let rows = smear(&entry);
        assert_eq!(rows.len(), 1);
        let back = unsmear(&rows);
        assert_eq!(back.elo_diff, 800);
    }

    #[test]
    fn max_count_round_trips_across_many_rows() {
        let entry = sample(u32::MAX as u64, 800);
        let rows = smear(&entry);
        assert!(rows.len() > 1);
        assert_eq!(rows.iter().filter(|r| r.is_first).count(), 1);
        let back = unsmear(&rows);
        assert_eq!(back.count, u32::MAX as u64);
        assert_eq!(back.elo_diff, 800);
    }

    #[test]
    fn negative_elo_diff_roundtrips() {
        let entry = sample(5, -800);
        let rows = smear(&entry);
        let back = unsmear(&rows);
        assert_eq!(back.elo_diff, -800);
    }

    #[test]
    fn rows_roundtrip_through_bytes() {
        let entry = sample(u32::MAX as u64, -12345);
        for row in smear(&entry) {
            let bytes = row.to_bytes();
            assert_eq!(bytes.len(), Row::SIZE);
            assert_eq!(Row::from_bytes(&bytes), row);
        }
    }

    #[test]
    fn exactly_one_is_first_row_per_logical_entry() {
        for count in [1u64, 3, 1000, u32::MAX as u64] {
            let rows = smear(&sample(count, 42));
            assert_eq!(rows.iter().filter(|r| r.is_first).count(), 1);
        }
    }

    #[test]
    fn group_recovers_consecutive_smeared_entries() {
        use crate::entry::RowStats;

        let mut rows = smear(&sample(1, 0));
        rows.extend(smear(&Entry { reverse_move: 0xAB_CE, ..sample(u32::MAX as u64, -800) }));
        let entries = Row::group(&rows);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].count, 1);
        assert_eq!(entries[1].count, u32::MAX as u64);
        assert_eq!(entries[1].elo_diff, -800);
    }
}
