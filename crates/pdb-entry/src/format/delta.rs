//! The `db_delta` physical row: 32 bytes, 96 bits of hash (§3's "96 bits of Zobrist") plus a
//! `first_game` index, at the cost of `last_game` tracking.
//!
//! Layout (big-endian multi-byte fields):
//!
//! ```text
//! hash_lo      : u64  (8 B)  — low 64 bits of the 128-bit Zobrist hash
//! hash_extra   : u32  (4 B)  — top 32 bits of the high lane (the "additional hash bits" §4.D
//!                              mentions beyond what `db_beta` carries)
//! reverse_move : u32  (4 B)  — Format A packed reverse move
//! level_result : u8   (1 B)  — bits 0-1 level, bits 2-3 result
//! reserved     : u8          — must be zero
//! count        : u32  (4 B)
//! elo_diff     : i32  (4 B)
//! first_game   : u32  (4 B)
//! reserved     : [u8; 2]     — must be zero
//! ```

use crate::entry::Entry;
use crate::format::PackedEntry;
use crate::key::{GameResult, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delta {
    pub hash_lo: u64,
    pub hash_extra: u32,
    pub reverse_move: u32,
    pub level: Level,
    pub result: GameResult,
    pub count: u32,
    pub elo_diff: i32,
    pub first_game: u32,
}

impl Delta {
    pub fn from_entry(entry: &Entry) -> Self {
        Delta {
            hash_lo: entry.hash.1,
            hash_extra: (entry.hash.0 >> 32) as u32,
            reverse_move: entry.reverse_move,
            level: entry.level,
            result: entry.result,
            count: entry.count.min(u32::MAX as u64) as u32,
            elo_diff: entry.elo_diff.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
            first_game: entry.first_game,
        }
    }

    /// Widens back into a logical [`Entry`]. The high lane's low 32 bits were never stored and
    /// come back as zero; `last_game` is not tracked by `db_delta` and comes back as `first_game`
    /// (the closest available approximation, documented here rather than silently wrong).
    pub fn to_entry(self) -> Entry {
        Entry {
            hash: ((self.hash_extra as u64) << 32, self.hash_lo),
            reverse_move: self.reverse_move,
            level: self.level,
            result: self.result,
            count: self.count as u64,
            elo_diff: self.elo_diff as i64,
            first_game: self.first_game,
            last_game: self.first_game,
        }
    }
}

impl PackedEntry for Delta {
    const SIZE: usize = 32;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.hash_lo.to_be_bytes());
        buf.extend_from_slice(&self.hash_extra.to_be_bytes());
        buf.extend_from_slice(&self.reverse_move.to_be_bytes());
        buf.push(self.level.to_bits() | (self.result.to_bits() << 2));
        buf.push(0);
        buf.extend_from_slice(&self.count.to_be_bytes());
        buf.extend_from_slice(&self.elo_diff.to_be_bytes());
        buf.extend_from_slice(&self.first_game.to_be_bytes());
        buf.extend_from_slice(&[0u8; 2]);
        debug_assert_eq!(buf.len(), Self::SIZE);
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(bytes.len(), Self::SIZE, "Delta row must be exactly 32 bytes");
        let hash_lo = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
        let hash_extra = u32::from_be_bytes(bytes[8..12].try_into().unwrap());
        let reverse_move = u32::from_be_bytes(bytes[12..16].try_into().unwrap());
        let level_result = bytes[16];
        let count = u32::from_be_bytes(bytes[18..22].try_into().unwrap());
        let elo_diff = i32::from_be_bytes(bytes[22..26].try_into().unwrap());
        let first_game = u32::from_be_bytes(bytes[26..30].try_into().unwrap());

        Delta {
            hash_lo,
            hash_extra,
            reverse_move,
            level: Level::from_bits(level_result),
            result: GameResult::from_bits(level_result >> 2),
            count,
            elo_diff,
            first_game,
        }
    }

    fn key_hash(&self) -> u128 {
        ((self.hash_extra as u128) << 96) | ((self.hash_lo as u128) << 32)
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
        Delta::from_entry(&crate::entry::combine(&self.to_entry(), &other.to_entry()))
    }
}

impl crate::entry::RowStats for Delta {
    fn pack_rows(entry: &Entry) -> Vec<Self> {
        vec![Delta::from_entry(entry)]
    }

    fn unpack_rows(rows: &[Self]) -> Entry {
        debug_assert_eq!(rows.len(), 1, "db_delta never smears an entry across rows");
        rows[0].to_entry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Entry {
        Entry::single(
            (0x1122_3344_5566_7788, 0xBEEF),
            0x1234_5678,
            Level::Server,
            GameResult::Draw,
            -42,
            7,
        )
    }

    #[test]
    fn roundtrip_through_bytes() {
        let delta = Delta::from_entry(&sample());
        let bytes = delta.to_bytes();
        assert_eq!(bytes.len(), Delta::SIZE);
        assert_eq!(Delta::from_bytes(&bytes), delta);
    }

    #[test]
    fn carries_more_hash_than_beta() {
        let delta = Delta::from_entry(&sample());
        assert_ne!(delta.hash_extra, 0);
    }

    #[test]
    fn key_hash_orders_by_extra_bits_first() {
        let low = Delta::from_entry(&Entry::single((1, 0), 0, Level::Human, GameResult::Unknown, 0, 0));
        let high = Delta::from_entry(&Entry::single((2, 0), 0, Level::Human, GameResult::Unknown, 0, 0));
        assert!(low.key_hash() < high.key_hash());
    }
}
