//! The BCGN error taxonomy (§7 "Input format").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BcgnError {
    #[error("not a BCGN file: bad magic {0:?}")]
    BadMagic([u8; 4]),

    #[error("unsupported BCGN version {0}")]
    UnsupportedVersion(u8),

    #[error("unsupported compression level {0}")]
    UnsupportedCompLevel(u8),

    #[error("reserved header byte at offset {offset} is nonzero ({value:#x})")]
    ReservedByteNonzero { offset: usize, value: u8 },

    #[error("writing with auxComp = {0} is not supported (no codec specified for it)")]
    UnsupportedAuxCompOnWrite(u8),

    #[error("game record too long to encode: {len} bytes (limit is 65535)")]
    GameTooLong { len: usize },

    #[error("ply count {0} does not fit in the 14-bit plyCountAndResult field")]
    PlyCountOverflow(usize),

    #[error("leftover carry-over of {leftover} bytes exceeds maxGameLen {max_game_len}: corrupt stream")]
    LeftoverExceedsMaxGameLen { leftover: usize, max_game_len: usize },

    #[error("truncated record at end of file: {0} trailing bytes with no terminator")]
    Truncated(usize),

    #[error("player/event/site string longer than 255 bytes")]
    StringTooLong,

    #[error("string field contains a NUL byte")]
    StringContainsNul,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BcgnError>;
