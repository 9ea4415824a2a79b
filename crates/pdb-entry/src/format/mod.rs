//! Physical, fixed-size row encodings of a logical [`crate::Entry`] (§3, §4.D, §4.I).
//!
//! Three formats are implemented, matching the `dbKey` values named in §6's manifest examples:
//!
//!   - [`beta::Beta`] (`db_beta`, 24 bytes) — 64 bits of hash, no extra fields.
//!   - [`delta::Delta`] (`db_delta`, 32 bytes) — 96 bits of hash plus a `first_game` index.
//!   - [`epsilon`] (`db_epsilon`/`db_epsilon_smeared_a`, 16 bytes per physical row) — the
//!     smeared format: a logical entry with a wide count or Elo sum is split across 1+ rows.
//!
//! All three implement [`PackedEntry`], so [`crate::Comparator`] and `pdb_storage`'s range index,
//! sort/merge, and file codecs are written once, generically.

pub mod beta;
pub mod delta;
pub mod epsilon;

use crate::key::{GameResult, Level};

/// A physical, fixed-size entry row that carries enough of the logical key to be ordered and
/// merged without reference to any other row.
///
/// `key_hash` is whatever hash width the format carries, left-aligned into a `u128` so that two
/// rows of the *same* format compare consistently (comparing rows of different formats is never
/// meaningful and not supported).
pub trait PackedEntry: Copy + Clone + std::fmt::Debug + Send + Sync + 'static {
    /// Size of one physical row on disk, in bytes.
    const SIZE: usize;

    fn to_bytes(&self) -> Vec<u8>;

    /// Decodes one row. Panics if `bytes.len() != Self::SIZE`.
    fn from_bytes(bytes: &[u8]) -> Self;

    fn key_hash(&self) -> u128;
    fn reverse_move_bits(&self) -> u32;
    fn level(&self) -> Level;
    fn result(&self) -> GameResult;

    /// Whether this row is the first physical row of its logical entry. Always `true` for
    /// non-smeared formats ([`beta::Beta`], [`delta::Delta`]); meaningful for
    /// [`epsilon::Row`], where it also participates in the `Full` ordering (§4.G) so that a
    /// logical entry's rows stay contiguous and in `isFirst`-first order.
    fn is_first_row(&self) -> bool {
        true
    }

    /// Merges two rows known to share a `Full` key. See each format's module docs for what this
    /// means for smeared rows.
    fn combine(&self, other: &Self) -> Self;
}
