//! Sparse key→offset range index over one entry file (§4.E).
//!
//! Index slot `i` names the offset of the *first* physical row whose `key_hash()` (the
//! without-reverse-move portion of the key) equals `key[i]`; slots are recorded roughly every
//! `granularity` rows, at distinct-key boundaries, so [`RangeIndex::start_hint`] followed by a
//! bounded forward scan in the entry file locates an exact range in `O(log slots)` plus a short
//! linear scan.

use std::io;
use std::path::Path;

use pdb_entry::format::PackedEntry;

const SLOT_SIZE: usize = 16 + 8;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeIndex {
    slots: Vec<(u128, u64)>,
}

impl RangeIndex {
    /// Builds a sparse index over `rows`, which must already be in ascending `Full` order.
    pub fn build<E: PackedEntry>(rows: &[E], granularity: usize) -> Self {
        let granularity = granularity.max(1);
        let mut slots = Vec::new();
        let mut last_key: Option<u128> = None;
        let mut next_threshold = 0usize;

        for (i, row) in rows.iter().enumerate() {
            let key = row.key_hash();
            if last_key != Some(key) {
                if i >= next_threshold {
                    slots.push((key, i as u64));
                    next_threshold = i + granularity;
                }
                last_key = Some(key);
            }
        }

        RangeIndex { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// A row offset at or before the first row with `key_hash() == key`; the caller scans
    /// forward from here. Never overshoots: the returned offset's key is `<= key`.
    pub fn start_hint(&self, key: u128) -> usize {
        let n = self.slots.partition_point(|&(k, _)| k <= key);
        if n == 0 {
            0
        } else {
            self.slots[n - 1].1 as usize
        }
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        let mut buf = Vec::with_capacity(self.slots.len() * SLOT_SIZE);
        for &(key, offset) in &self.slots {
            buf.extend_from_slice(&key.to_be_bytes());
            buf.extend_from_slice(&offset.to_be_bytes());
        }
        std::fs::write(path, buf)
    }

    pub fn read(path: &Path) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        if bytes.len() % SLOT_SIZE != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "range index file length is not a multiple of the slot size",
            ));
        }
        let slots = bytes
            .chunks_exact(SLOT_SIZE)
            .map(|chunk| {
                let key = u128::from_be_bytes(chunk[0..16].try_into().unwrap());
                let offset = u64::from_be_bytes(chunk[16..24].try_into().unwrap());
                (key, offset)
            })
            .collect();
        Ok(RangeIndex { slots })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdb_entry::format::beta::Beta;
    use pdb_entry::{Entry, GameResult, Level};

    fn row(hash_lo: u64) -> Beta {
        Beta::from_entry(&Entry::single((0, hash_lo), 0, Level::Human, GameResult::Draw, 0, 0))
    }

    #[test]
    fn single_entry_file_has_one_slot() {
        let rows = vec![row(1)];
        let index = RangeIndex::build(&rows, 4);
        assert_eq!(index.len(), 1);
        assert_eq!(index.start_hint(row(1).key_hash()), 0);
    }

    #[test]
    fn start_hint_never_overshoots_a_key_it_has_not_seen() {
        let rows: Vec<Beta> = (0..50).map(|i| row(i * 2)).collect();
        let index = RangeIndex::build(&rows, 8);
        // Query a key between two distinct rows: the hint must point at or before it.
        let hint = index.start_hint(row(3).key_hash());
        assert!(rows[hint].key_hash() <= row(3).key_hash());
    }

    #[test]
    fn round_trips_through_disk() {
        let rows: Vec<Beta> = (0..30).map(|i| row(i)).collect();
        let index = RangeIndex::build(&rows, 5);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.idx");
        index.write(&path).unwrap();
        let back = RangeIndex::read(&path).unwrap();
        assert_eq!(back, index);
    }
}
