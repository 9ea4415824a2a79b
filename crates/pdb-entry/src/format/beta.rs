//! The `db_beta` physical row: 24 bytes, 64 bits of hash, no first/last game tracking.
//!
//! Layout (all multi-byte fields big-endian, matching the convention BCGN's own header uses):
//!
//! ```text
//! hash_lo      : u64  (8 B)  — low 64 bits of the position's 128-bit Zobrist hash
//! reverse_move : u32  (4 B)  — Format A packed reverse move (low 29 bits meaningful)
//! level_result : u8   (1 B)  — bits 0-1 level, bits 2-3 result, bits 4-7 reserved (zero)
//! reserved     : [u8; 3]     — must be zero
//! count        : u32  (4 B) — saturates at u32::MAX if the logical count overflows
//! elo_diff     : i32  (4 B) — saturates at i32::{MIN,MAX} if the logical sum overflows
//! ```

use crate::entry::Entry;
use crate::format::PackedEntry;
use crate::key::{GameResult, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beta {
    pub hash_lo: u64,
    pub reverse_move: u32,
    pub level: Level,
    pub result: GameResult,
    pub count: u32,
    pub elo_diff: i32,
}

impl Beta {
    pub fn from_entry(entry: &Entry) -> Self {
        Beta {
            hash_lo: entry.hash.1,
            reverse_move: entry.reverse_move,
            level: entry.level,
            result: entry.result,
            count: entry.count.min(u32::MAX as u64) as u32,
            elo_diff: entry.elo_diff.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
        }
    }

    /// Widens back into a logical [`Entry`]. `hash.0` (the high lane) is unknown to this format
    /// and reported as `0`; `first_game`/`last_game` are not tracked by `db_beta` and are also
    /// reported as `0` — callers that need them should use [`crate::format::delta::Delta`].
    pub fn to_entry(self) -> Entry {
        Entry {
            hash: (0, self.hash_lo),
            reverse_move: self.reverse_move,
            level: self.level,
            result: self.result,
            count: self.count as u64,
            elo_diff: self.elo_diff as i64,
            first_game: 0,
            last_game: 0,
        }
    }
}

impl PackedEntry for Beta {
    const SIZE: usize = 24;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.hash_lo.to_be_bytes());
        buf.extend_from_slice(&self.reverse_move.to_be_bytes());
        buf.push((self.level.to_bits()) | (self.result.to_bits() << 2));
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(&self.count.to_be_bytes());
        buf.extend_from_slice(&self.elo_diff.to_be_bytes());
        debug_assert_eq!(buf.len(), Self::SIZE);
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(bytes.len(), Self::SIZE, "Beta row must be exactly 24 bytes");
        let hash_lo = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
        let reverse_move = u32::from_be_bytes(bytes[8..12].try_into().unwrap());
        let level_result = bytes[12];
        let count = u32::from_be_bytes(bytes[16..20].try_into().unwrap());
        let elo_diff = i32::from_be_bytes(bytes[20..24].try_into().unwrap());

        Beta {
            hash_lo,
            reverse_move,
            level: Level::from_bits(level_result),
            result: GameResult::from_bits(level_result >> 2),
            count,
            elo_diff,
        }
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

    fn combine(&self, other: &Self) -> Self {
        Beta::from_entry(&crate::entry::combine(&self.to_entry(), &other.to_entry()))
    }
}

impl crate::entry::RowStats for Beta {
    fn pack_rows(entry: &Entry) -> Vec<Self> {
        vec![Beta::from_entry(entry)]
    }

    fn unpack_rows(rows: &[Self]) -> Entry {
        debug_assert_eq!(rows.len(), 1, "db_beta never smears an entry across rows");
        rows[0].to_entry()
    }
}
