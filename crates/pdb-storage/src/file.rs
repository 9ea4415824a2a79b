//! An immutable, ascending entry file plus its sparse [`RangeIndex`] (§4.E).
//!
//! Two files on disk per id: `<id>` holds `N * E::SIZE` bytes of packed rows in ascending
//! `Full` order, `<id>.idx` holds the sparse index (§6: "this workspace uses the separate-file
//! layout"). Reads are positional (`Seek`+`read_exact` against a shared, mutex-guarded file
//! handle) rather than a true `mmap`, per the §9 implementation choice this workspace recorded —
//! a portable paged reader satisfying the same `range`/`at`/`scan` contract.

use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use pdb_entry::format::PackedEntry;

use crate::error::{Result, StorageError};
use crate::index::RangeIndex;

fn entries_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(id.to_string())
}

fn index_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{id}.idx"))
}

/// One immutable entry file: `N` fixed-size rows of format `E`, ascending under `Full`, plus a
/// sparse range index built at write time.
pub struct EntryFile<E: PackedEntry> {
    id: u64,
    file: Mutex<std::fs::File>,
    len: usize,
    index: RangeIndex,
    _format: PhantomData<E>,
}

impl<E: PackedEntry> EntryFile<E> {
    /// Writes `rows` (already sorted and combined under `Full`) as a new file with id `id` in
    /// `dir`, then reopens it. `rows.len() == 0` is allowed and yields an empty file.
    pub fn create(dir: &Path, id: u64, rows: &[E], index_granularity: usize) -> Result<Self> {
        if let Some(bad) = rows.windows(2).position(|w| {
            pdb_entry::Comparator::Full.compare(&w[0], &w[1]) != std::cmp::Ordering::Less
        }) {
            return Err(StorageError::NonMonotoneFile(bad + 1));
        }

        let tmp_entries = entries_path(dir, id).with_extension("tmp");
        let mut buf = Vec::with_capacity(rows.len() * E::SIZE);
        for row in rows {
            buf.extend_from_slice(&row.to_bytes());
        }
        write_atomic(&tmp_entries, &entries_path(dir, id), &buf)?;

        let index = RangeIndex::build(rows, index_granularity);
        let tmp_index = index_path(dir, id).with_extension("idx.tmp");
        index.write(&tmp_index)?;
        std::fs::rename(&tmp_index, index_path(dir, id))?;

        Self::open(dir, id)
    }

    pub fn open(dir: &Path, id: u64) -> Result<Self> {
        let file = std::fs::File::open(entries_path(dir, id))?;
        let byte_len = file.metadata()?.len() as usize;
        if byte_len % E::SIZE != 0 {
            return Err(StorageError::ChecksumMismatch);
        }
        let index = RangeIndex::read(&index_path(dir, id))?;

        Ok(EntryFile {
            id,
            file: Mutex::new(file),
            len: byte_len / E::SIZE,
            index,
            _format: PhantomData,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn index(&self) -> &RangeIndex {
        &self.index
    }

    /// Random access to row `idx`.
    pub fn at(&self, idx: usize) -> Result<E> {
        if idx >= self.len {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "entry index out of range",
            )));
        }
        let mut buf = vec![0u8; E::SIZE];
        let mut file = self.file.lock().expect("entry file mutex poisoned");
        file.seek(SeekFrom::Start((idx * E::SIZE) as u64))?;
        file.read_exact(&mut buf)?;
        Ok(E::from_bytes(&buf))
    }

    /// Sequential scan of every row.
    pub fn scan(&self) -> Result<Vec<E>> {
        self.read_range(0, self.len as u64)
    }

    /// Reads rows `[start, end)`.
    pub fn read_range(&self, start: u64, end: u64) -> Result<Vec<E>> {
        let (start, end) = (start as usize, end as usize);
        if start > end || end > self.len {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "range out of bounds",
            )));
        }
        let mut buf = vec![0u8; (end - start) * E::SIZE];
        let mut file = self.file.lock().expect("entry file mutex poisoned");
        file.seek(SeekFrom::Start((start * E::SIZE) as u64))?;
        file.read_exact(&mut buf)?;
        Ok(buf.chunks_exact(E::SIZE).map(E::from_bytes).collect())
    }

    /// Half-open `[first, past_last)` offset range of rows whose `key_hash()` equals `key`
    /// (§4.E: "bounded scan of at most `indexGranularity` entries" after the index binary
    /// search).
    pub fn range(&self, key: u128) -> Result<(u64, u64)> {
        let mut i = self.index.start_hint(key);
        while i < self.len && self.at(i)?.key_hash() < key {
            i += 1;
        }
        let start = i;
        while i < self.len && self.at(i)?.key_hash() == key {
            i += 1;
        }
        Ok((start as u64, i as u64))
    }

    pub fn delete(dir: &Path, id: u64) -> std::io::Result<()> {
        let _ = std::fs::remove_file(entries_path(dir, id));
        std::fs::remove_file(index_path(dir, id))
    }
}

/// Writes `bytes` to `tmp`, then renames `tmp` onto `dest` (§4.G failure model: partial output
/// never lands under its final name).
fn write_atomic(tmp: &Path, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(tmp, dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdb_entry::format::beta::Beta;
    use pdb_entry::{Entry, GameResult, Level};

    fn rows(n: u64) -> Vec<Beta> {
        (0..n)
            .map(|i| Beta::from_entry(&Entry::single((0, i), 0, Level::Human, GameResult::Draw, 0, i as u32)))
            .collect()
    }

    #[test]
    fn single_entry_file_range_is_zero_one() {
        let dir = tempfile::tempdir().unwrap();
        let data = rows(1);
        let file = EntryFile::create(dir.path(), 0, &data, 64).unwrap();
        assert_eq!(file.index().len(), 1);
        assert_eq!(file.range(data[0].key_hash()).unwrap(), (0, 1));
    }

    #[test]
    fn scan_and_at_agree() {
        let dir = tempfile::tempdir().unwrap();
        let data = rows(200);
        let file = EntryFile::<Beta>::create(dir.path(), 7, &data, 16).unwrap();
        let scanned = file.scan().unwrap();
        assert_eq!(scanned, data);
        for i in (0..200).step_by(17) {
            assert_eq!(file.at(i).unwrap(), data[i]);
        }
    }

    #[test]
    fn range_covers_exactly_the_matching_keys() {
        let dir = tempfile::tempdir().unwrap();
        // Three distinct keys, several rows each (same hash, different reverse_move/result).
        let mut data = Vec::new();
        for hash in 0..3u64 {
            for rm in 0..5u32 {
                data.push(Beta::from_entry(&Entry::single((0, hash), rm, Level::Human, GameResult::Draw, 0, 0)));
            }
        }
        let file = EntryFile::create(dir.path(), 1, &data, 3).unwrap();
        let (start, end) = file.range(data[5].key_hash()).unwrap();
        assert_eq!(end - start, 5);
        for i in start..end {
            assert_eq!(file.at(i as usize).unwrap().key_hash(), data[5].key_hash());
        }
    }

    #[test]
    fn rejects_non_ascending_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = rows(3);
        data.swap(0, 2);
        let err = EntryFile::create(dir.path(), 2, &data, 16).unwrap_err();
        assert!(matches!(err, StorageError::NonMonotoneFile(_)));
    }
}
