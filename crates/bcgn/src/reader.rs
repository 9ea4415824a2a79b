//! Double-buffered, background-prefetching BCGN reader (§4.C).
//!
//! [`Reader::next_game`] is a pull-style "lazy forward iterator": each call advances exactly one
//! game. Internally the reader keeps a `front` window of bytes currently being parsed and, as
//! soon as one window is handed off, immediately spawns a background task reading the *next*
//! window into a fresh buffer so the I/O overlaps with the caller parsing the current one. Each
//! freshly read buffer reserves a `max_game_len`-byte prefix: when the front window runs low,
//! only the small leftover tail (an incomplete record, at most `max_game_len - 1` bytes) is
//! copied into that reserved prefix, ahead of the data the background task already read — the
//! bulk of each chunk is never copied, only appended to.

use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;

use crate::error::{BcgnError, Result};
use crate::header::{CompLevel, FileHeader, HEADER_SIZE};
use crate::record::{self, Game};
use crate::writer::MAX_GAME_LEN;

/// Default size of the non-reserved portion of each read chunk (§4.C: "≥128 KiB").
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

enum FileSlot {
    Idle(File),
    Prefetching(JoinHandle<std::io::Result<(File, Vec<u8>, usize)>>),
}

/// Streams games out of a BCGN file in order.
pub struct Reader {
    slot: Option<FileSlot>,
    comp_level: CompLevel,
    max_game_len: usize,
    buffer_size: usize,
    /// Current window: valid bytes are `front[pos..len]`.
    front: Vec<u8>,
    pos: usize,
    len: usize,
    eof: bool,
    games_read: u64,
}

impl Reader {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sizes(path, DEFAULT_BUFFER_SIZE, MAX_GAME_LEN).await
    }

    pub async fn open_with_sizes(
        path: impl AsRef<Path>,
        buffer_size: usize,
        max_game_len: usize,
    ) -> Result<Self> {
        let mut file = File::open(path.as_ref()).await?;
        let mut header_bytes = [0u8; HEADER_SIZE];
        read_exact_or_truncated(&mut file, &mut header_bytes).await?;
        let header = FileHeader::from_bytes(&header_bytes)?;

        let mut reader = Reader {
            slot: Some(FileSlot::Idle(file)),
            comp_level: header.comp_level,
            max_game_len,
            buffer_size,
            front: Vec::new(),
            pos: 0,
            len: 0,
            eof: false,
            games_read: 0,
        };
        reader.spawn_prefetch();
        Ok(reader)
    }

    pub fn comp_level(&self) -> CompLevel {
        self.comp_level
    }

    pub fn games_read(&self) -> u64 {
        self.games_read
    }

    /// Decodes and returns the next game, or `None` at a clean end of file.
    pub async fn next_game(&mut self) -> Result<Option<Game>> {
        loop {
            let available = self.len - self.pos;

            if available == 0 {
                if self.eof {
                    return Ok(None);
                }
                self.refill().await?;
                continue;
            }

            if available < 2 {
                if self.eof {
                    return Err(BcgnError::Truncated(available));
                }
                self.refill().await?;
                continue;
            }

            let total_len =
                u16::from_be_bytes(self.front[self.pos..self.pos + 2].try_into().unwrap())
                    as usize;

            if available < total_len {
                if self.eof {
                    return Err(BcgnError::Truncated(available));
                }
                self.refill().await?;
                continue;
            }

            let slice = &self.front[self.pos..self.pos + total_len];
            let (game, consumed) = record::decode(slice, self.comp_level)?;
            debug_assert_eq!(consumed, total_len);
            self.pos += total_len;
            self.games_read += 1;
            return Ok(Some(game));
        }
    }

    fn spawn_prefetch(&mut self) {
        let file = match self.slot.take() {
            Some(FileSlot::Idle(file)) => file,
            other => {
                self.slot = other;
                panic!("spawn_prefetch requires an idle file");
            }
        };
        let reserved = self.max_game_len;
        let suffix_len = self.buffer_size;
        let handle = tokio::spawn(async move {
            let mut file = file;
            let mut buf = vec![0u8; reserved + suffix_len];
            let mut total = 0usize;
            loop {
                let n = file.read(&mut buf[reserved + total..]).await?;
                if n == 0 {
                    break;
                }
                total += n;
                if total == suffix_len {
                    break;
                }
            }
            Ok((file, buf, total))
        });
        self.slot = Some(FileSlot::Prefetching(handle));
    }

    async fn refill(&mut self) -> Result<()> {
        let leftover_len = self.len - self.pos;
        if leftover_len > self.max_game_len {
            return Err(BcgnError::LeftoverExceedsMaxGameLen {
                leftover: leftover_len,
                max_game_len: self.max_game_len,
            });
        }

        let handle = match self.slot.take().expect("reader file slot always populated") {
            FileSlot::Prefetching(handle) => handle,
            FileSlot::Idle(file) => {
                // Only reachable if a previous refill didn't re-arm prefetching (EOF). Put the
                // file back and report clean EOF via the caller's own bookkeeping.
                self.slot = Some(FileSlot::Idle(file));
                self.eof = true;
                return Ok(());
            }
        };
        let (file, mut back, n) = handle.await.map_err(join_err)??;

        let leftover_start = self.max_game_len - leftover_len;
        back[leftover_start..self.max_game_len]
            .copy_from_slice(&self.front[self.pos..self.len]);

        self.front = back;
        self.pos = leftover_start;
        self.len = self.max_game_len + n;
        self.slot = Some(FileSlot::Idle(file));

        if n == 0 {
            self.eof = true;
        } else {
            self.spawn_prefetch();
        }
        Ok(())
    }
}

async fn read_exact_or_truncated(file: &mut File, buf: &mut [u8]) -> Result<()> {
    match file.read_exact(buf).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(BcgnError::Truncated(0)),
        Err(e) => Err(e.into()),
    }
}

fn join_err(e: tokio::task::JoinError) -> BcgnError {
    BcgnError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}
