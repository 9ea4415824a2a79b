//! The partition-root `manifest` file: which physical row format a partition was created with,
//! and (for formats that require it) a byte-order signature (§4.H, §6).

use std::io::{Read, Write};
use std::path::Path;

use thiserror::Error;

/// Native-byte-order signature written after the key when a format requires a matching
/// endianness reader/writer (§6).
const ENDIANNESS_SIGNATURE: [u8; 15] = {
    let hi = 0x0011223344556677u64.to_ne_bytes();
    let mid = 0x8899AABBu32.to_ne_bytes();
    let lo = 0xCCDDu16.to_ne_bytes();
    [
        hi[0], hi[1], hi[2], hi[3], hi[4], hi[5], hi[6], hi[7], mid[0], mid[1], mid[2], mid[3],
        lo[0], lo[1], 0xEE,
    ]
};

/// Manifest-specific failures (§7 "Manifest").
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("database key mismatch: manifest has {found:?}, caller asked for {expected:?}")]
    KeyMismatch { expected: String, found: String },
    #[error("manifest endianness signature does not match this platform's native byte order")]
    EndiannessMismatch,
    #[error("manifest at {0} is missing or truncated")]
    InvalidManifest(std::path::PathBuf),
    #[error("no manifest file found at {0}")]
    MissingManifest(std::path::PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ManifestError>;

/// Identifies which physical row format a partition was created with (§6 `dbKey`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKey {
    Beta,
    Delta,
    Epsilon,
    EpsilonSmearedA,
}

impl DbKey {
    pub fn as_str(self) -> &'static str {
        match self {
            DbKey::Beta => "db_beta",
            DbKey::Delta => "db_delta",
            DbKey::Epsilon => "db_epsilon",
            DbKey::EpsilonSmearedA => "db_epsilon_smeared_a",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "db_beta" => Some(DbKey::Beta),
            "db_delta" => Some(DbKey::Delta),
            "db_epsilon" => Some(DbKey::Epsilon),
            "db_epsilon_smeared_a" => Some(DbKey::EpsilonSmearedA),
            _ => None,
        }
    }

    /// Whether this format's on-disk layout is sensitive to host byte order and therefore needs
    /// the endianness signature checked on open (§6, §9 "cross-endian portability").
    ///
    /// None of this workspace's formats are cross-endian portable (every physical row is encoded
    /// explicitly big-endian field-by-field), but the signature still guards against opening a
    /// partition's raw files on a foreign-endian host where `RangeIndex`'s in-memory layout (not
    /// the entry file itself) could otherwise be silently misread.
    pub fn requires_matching_endianness(self) -> bool {
        true
    }
}

const MANIFEST_FILE_NAME: &str = "manifest";

/// Writes `<dir>/manifest` for a freshly created partition (§4.H).
pub fn write(dir: &Path, key: DbKey) -> Result<()> {
    let path = dir.join(MANIFEST_FILE_NAME);
    let mut buf = Vec::new();
    let key_bytes = key.as_str().as_bytes();
    buf.push(key_bytes.len() as u8);
    buf.extend_from_slice(key_bytes);
    if key.requires_matching_endianness() {
        buf.extend_from_slice(&ENDIANNESS_SIGNATURE);
    }
    let mut file = std::fs::File::create(&path)?;
    file.write_all(&buf)?;
    Ok(())
}

/// Reads `<dir>/manifest` and checks it names `expected`, failing with [`ManifestError`] on any
/// mismatch (§4.H, §7).
pub fn open(dir: &Path, expected: DbKey) -> Result<()> {
    let found = peek_db_key(dir)?;
    if found != expected {
        return Err(ManifestError::KeyMismatch {
            expected: expected.as_str().to_string(),
            found: found.as_str().to_string(),
        });
    }
    Ok(())
}

/// Reads back which `dbKey` a partition's manifest names, without asserting it against any
/// caller expectation — used by CLI subcommands that attach to an existing database without the
/// caller repeating the key on the command line (§6: only `create` takes a `dbKey` argument).
pub fn peek_db_key(dir: &Path) -> Result<DbKey> {
    let path = dir.join(MANIFEST_FILE_NAME);
    if !path.exists() {
        return Err(ManifestError::MissingManifest(path));
    }
    let mut file = std::fs::File::open(&path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let key_len = *bytes
        .first()
        .ok_or_else(|| ManifestError::InvalidManifest(path.clone()))? as usize;
    let key_bytes = bytes
        .get(1..1 + key_len)
        .ok_or_else(|| ManifestError::InvalidManifest(path.clone()))?;
    let found_key = String::from_utf8_lossy(key_bytes).into_owned();
    let found = DbKey::from_str(&found_key).ok_or_else(|| ManifestError::InvalidManifest(path.clone()))?;

    if found.requires_matching_endianness() {
        let signature = bytes
            .get(1 + key_len..1 + key_len + ENDIANNESS_SIGNATURE.len())
            .ok_or_else(|| ManifestError::InvalidManifest(path.clone()))?;
        if signature != ENDIANNESS_SIGNATURE {
            return Err(ManifestError::EndiannessMismatch);
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_matching_key() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), DbKey::Beta).unwrap();
        open(dir.path(), DbKey::Beta).unwrap();
    }

    #[test]
    fn rejects_a_mismatched_key() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), DbKey::Beta).unwrap();
        let err = open(dir.path(), DbKey::Delta).unwrap_err();
        assert!(matches!(err, ManifestError::KeyMismatch { .. }));
    }

    #[test]
    fn missing_manifest_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = open(dir.path(), DbKey::Beta).unwrap_err();
        assert!(matches!(err, ManifestError::MissingManifest(_)));
    }

    #[test]
    fn truncated_manifest_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("manifest"), [5u8, b'd', b'b']).unwrap();
        let err = open(dir.path(), DbKey::Beta).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidManifest(_)));
    }

    #[test]
    fn peek_reports_the_stored_key_without_an_expectation() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), DbKey::Delta).unwrap();
        assert_eq!(peek_db_key(dir.path()).unwrap(), DbKey::Delta);
    }

    #[test]
    fn foreign_endianness_signature_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), DbKey::Beta).unwrap();
        let path = dir.path().join("manifest");
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();
        let err = open(dir.path(), DbKey::Beta).unwrap_err();
        assert!(matches!(err, ManifestError::EndiannessMismatch));
    }
}
