//! Double-buffered, background-flushing BCGN writer (§4.C).
//!
//! The C++ original exposes per-field setters and an `endGame()` that seals the in-progress
//! game; the idiomatic Rust shape collapses that into [`Writer::write_game`] taking an owned
//! [`Game`] — the setters were only ever staging fields before serialization, and `Game` already
//! holds them. What the contract actually cares about is preserved: games land in one contiguous
//! front buffer, and when the front buffer no longer has room for another maximum-size game the
//! buffers are swapped and the full one is handed to a single background flush task while the
//! caller keeps writing into the other.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

use crate::error::{BcgnError, Result};
use crate::header::{CompLevel, FileHeader};
use crate::record::{self, Game};

/// Maximum size of a single encoded game record (§4.C: `totalLen` is a `u16`).
pub const MAX_GAME_LEN: usize = 0xFFFF;

/// Default front/back buffer capacity. Large enough to amortize the background flush over many
/// games; must be at least [`MAX_GAME_LEN`] so a single game always fits.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

enum FileSlot {
    Idle(File),
    /// A flush is in flight; `None` only while briefly swapped out to drive the join.
    Flushing(JoinHandle<std::io::Result<File>>),
}

/// Writes games to a BCGN file, flushing full buffers on a single background task (§4.F).
pub struct Writer {
    slot: Option<FileSlot>,
    comp_level: CompLevel,
    buffer_capacity: usize,
    front: Vec<u8>,
    games_written: u64,
}

impl Writer {
    /// Creates `path`, writes the file header, and returns a writer ready for
    /// [`write_game`](Self::write_game) calls.
    pub async fn create(path: impl AsRef<Path>, comp_level: CompLevel) -> Result<Self> {
        Self::create_with_capacity(path, comp_level, DEFAULT_BUFFER_SIZE).await
    }

    pub async fn create_with_capacity(
        path: impl AsRef<Path>,
        comp_level: CompLevel,
        buffer_capacity: usize,
    ) -> Result<Self> {
        let mut file = File::create(path.as_ref()).await?;
        let header = FileHeader::new(comp_level);
        file.write_all(&header.to_bytes()?).await?;

        Ok(Writer {
            slot: Some(FileSlot::Idle(file)),
            comp_level,
            buffer_capacity: buffer_capacity.max(MAX_GAME_LEN),
            front: Vec::with_capacity(buffer_capacity.max(MAX_GAME_LEN)),
            games_written: 0,
        })
    }

    pub fn games_written(&self) -> u64 {
        self.games_written
    }

    /// Encodes and appends `game`. Returns [`BcgnError::GameTooLong`]/`PlyCountOverflow` without
    /// disturbing any previously buffered games; the writer remains fully usable afterwards.
    pub async fn write_game(&mut self, game: &Game) -> Result<()> {
        let bytes = record::encode(game, self.comp_level)?;

        if self.front.len() + bytes.len() > self.buffer_capacity {
            self.flush_front().await?;
        }

        self.front.extend_from_slice(&bytes);
        self.games_written += 1;
        Ok(())
    }

    /// Swaps the front buffer out to a background flush task, awaiting any flush already in
    /// flight first (the writer is single-threaded on the file per §4.F).
    async fn flush_front(&mut self) -> Result<()> {
        if self.front.is_empty() {
            return Ok(());
        }

        let file = self.take_idle_file().await?;
        let buf = std::mem::replace(&mut self.front, Vec::with_capacity(self.buffer_capacity));
        let handle = tokio::spawn(async move {
            let mut file = file;
            file.write_all(&buf).await?;
            Ok(file)
        });
        self.slot = Some(FileSlot::Flushing(handle));
        Ok(())
    }

    async fn take_idle_file(&mut self) -> Result<File> {
        match self.slot.take().expect("writer file slot always populated") {
            FileSlot::Idle(file) => Ok(file),
            FileSlot::Flushing(handle) => Ok(handle.await.map_err(join_err)??),
        }
    }

    /// Flushes any remaining buffered games and waits for all background I/O to land.
    pub async fn finish(mut self) -> Result<()> {
        self.flush_front().await?;
        let mut file = self.take_idle_file().await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

fn join_err(e: tokio::task::JoinError) -> BcgnError {
    BcgnError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

/// Convenience: writes an entire slice of games to a fresh file in one call, used by tests and
/// by callers that already hold every game in memory (e.g. a small synthetic fixture).
pub async fn write_all(
    path: impl AsRef<Path>,
    comp_level: CompLevel,
    games: &[Game],
) -> Result<()> {
    let mut writer = Writer::create(path, comp_level).await?;
    for game in games {
        writer.write_game(game).await?;
    }
    writer.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Date, Eco, GameHeader, Outcome};
    use chess_core::{Move, MoveFlag, Square};

    fn sample_game(tag: u16) -> Game {
        Game {
            header: GameHeader {
                outcome: Outcome::Draw,
                date: Date { year: 2021, month: 6, day: 15 },
                white_elo: 2000 + tag,
                black_elo: 1990,
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

    #[tokio::test]
    async fn writes_header_and_games() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bcgn");

        let games: Vec<Game> = (0..5).map(sample_game).collect();
        write_all(&path, CompLevel::Long, &games).await.unwrap();

        let bytes = tokio::fs::read(&path).await.unwrap();
        assert_eq!(&bytes[0..4], b"BCGN");
        assert!(bytes.len() > crate::header::HEADER_SIZE);
    }

    #[tokio::test]
    async fn flushes_across_a_small_buffer_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.bcgn");

        // Small enough that a handful of games force at least one background flush.
        let mut writer = Writer::create_with_capacity(&path, CompLevel::Long, MAX_GAME_LEN + 64)
            .await
            .unwrap();
        for i in 0..20 {
            writer.write_game(&sample_game(i)).await.unwrap();
        }
        assert_eq!(writer.games_written(), 20);
        writer.finish().await.unwrap();

        let mut reader = crate::reader::Reader::open(&path).await.unwrap();
        let mut count = 0;
        while reader.next_game().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 20);
    }

    #[tokio::test]
    async fn rejects_game_exceeding_ply_count_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.bcgn");
        let mut writer = Writer::create(&path, CompLevel::Long).await.unwrap();

        let mut game = sample_game(0);
        game.moves = vec![Move::normal(Square::from_algebraic("a2").unwrap(), Square::from_algebraic("a3").unwrap()); 0x4000];
        let err = writer.write_game(&game).await.unwrap_err();
        assert!(matches!(err, BcgnError::PlyCountOverflow(_)));

        // Writer is still usable after a rejected game.
        writer.write_game(&sample_game(1)).await.unwrap();
        assert_eq!(writer.games_written(), 1);
    }
}
