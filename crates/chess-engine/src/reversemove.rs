//! Reverse-move encoding: what is needed to undo a move, packed into a fixed bit width.
//!
//! A [`ReverseMove`] is captured from the position a move is played *from*, before the move is
//! applied, and travels alongside the resulting position so that position can be "un-made"
//! without replaying the whole game. Two physical encodings are provided:
//!
//!   - [`ReverseMove::pack_a`]/[`ReverseMove::unpack_a`] ("format A", 29 bits spread over a
//!     `u32`): stores `from`/`to` explicitly. This is the format persisted in entry keys.
//!   - [`ReverseMove::pack_b`]/[`ReverseMove::unpack_b`] ("format B", 20 bits): stores `to` as
//!     an index into the mover's occupied-square bitboard and recovers `from` via a
//!     piece-specific delta table, trading a position lookup on decode for 9 fewer bits. Kept
//!     as a documented, separately tested alternate; not used by any entry format in this
//!     workspace.

use crate::position::CastlingRights;
use crate::{Bitboard, Position};
use chess_core::{Color, File, Move, MoveFlag, Piece, Square};

/// The shape of the forward move a [`ReverseMove`] undoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverseMoveKind {
    Normal,
    DoublePush,
    CastleKingside,
    CastleQueenside,
    EnPassant,
    Promotion(Piece),
}

/// Everything needed to undo a move from the position reached after playing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReverseMove {
    pub from: Square,
    pub to: Square,
    pub kind: ReverseMoveKind,
    pub captured: Option<Piece>,
    pub old_castling: CastlingRights,
    pub old_en_passant_file: Option<u8>,
}

impl ReverseMove {
    /// Captures the undo context for `m`, played from `position_before`.
    pub fn capture(position_before: &Position, m: Move) -> Self {
        let captured = match m.flag() {
            MoveFlag::EnPassant => Some(Piece::Pawn),
            _ => position_before.piece_at(m.to()).map(|(p, _)| p),
        };

        let kind = match m.flag() {
            MoveFlag::Normal => ReverseMoveKind::Normal,
            MoveFlag::DoublePush => ReverseMoveKind::DoublePush,
            MoveFlag::CastleKingside => ReverseMoveKind::CastleKingside,
            MoveFlag::CastleQueenside => ReverseMoveKind::CastleQueenside,
            MoveFlag::EnPassant => ReverseMoveKind::EnPassant,
            MoveFlag::PromoteKnight => ReverseMoveKind::Promotion(Piece::Knight),
            MoveFlag::PromoteBishop => ReverseMoveKind::Promotion(Piece::Bishop),
            MoveFlag::PromoteRook => ReverseMoveKind::Promotion(Piece::Rook),
            MoveFlag::PromoteQueen => ReverseMoveKind::Promotion(Piece::Queen),
        };

        ReverseMove {
            from: m.from(),
            to: m.to(),
            kind,
            captured,
            old_castling: position_before.castling,
            old_en_passant_file: position_before.en_passant.map(|sq| sq.file().index()),
        }
    }

    fn kind_code(self) -> u32 {
        match self.kind {
            ReverseMoveKind::Normal => 0,
            ReverseMoveKind::DoublePush => 1,
            ReverseMoveKind::CastleKingside => 2,
            ReverseMoveKind::CastleQueenside => 3,
            ReverseMoveKind::EnPassant => 4,
            ReverseMoveKind::Promotion(_) => 5,
        }
    }

    fn promoted_code(self) -> u32 {
        match self.kind {
            ReverseMoveKind::Promotion(Piece::Knight) => 1,
            ReverseMoveKind::Promotion(Piece::Bishop) => 2,
            ReverseMoveKind::Promotion(Piece::Rook) => 3,
            ReverseMoveKind::Promotion(Piece::Queen) => 4,
            _ => 0,
        }
    }

    fn captured_code(self) -> u32 {
        match self.captured {
            None => 0,
            Some(piece) => piece.index() as u32 + 1,
        }
    }

    fn from_captured_code(code: u32) -> Option<Piece> {
        match code {
            0 => None,
            1 => Some(Piece::Pawn),
            2 => Some(Piece::Knight),
            3 => Some(Piece::Bishop),
            4 => Some(Piece::Rook),
            5 => Some(Piece::Queen),
            _ => Some(Piece::King),
        }
    }

    fn kind_from_codes(kind_code: u32, promoted_code: u32) -> ReverseMoveKind {
        match kind_code {
            1 => ReverseMoveKind::DoublePush,
            2 => ReverseMoveKind::CastleKingside,
            3 => ReverseMoveKind::CastleQueenside,
            4 => ReverseMoveKind::EnPassant,
            5 => ReverseMoveKind::Promotion(match promoted_code {
                1 => Piece::Knight,
                2 => Piece::Bishop,
                3 => Piece::Rook,
                _ => Piece::Queen,
            }),
            _ => ReverseMoveKind::Normal,
        }
    }

    /// Packs into format A: `(to:6, from:6, kind:3, promoted:3, captured:3, castling:4, hadEp:1,
    /// epFile:3)`, 29 bits total, laid out big-endian-first-field-high within a `u32`.
    pub fn pack_a(self) -> u32 {
        let had_ep = self.old_en_passant_file.is_some() as u32;
        let ep_file = self.old_en_passant_file.unwrap_or(0) as u32;

        (self.to.index() as u32) << 23
            | (self.from.index() as u32) << 17
            | self.kind_code() << 14
            | self.promoted_code() << 11
            | self.captured_code() << 8
            | (self.old_castling.raw() as u32) << 4
            | had_ep << 3
            | ep_file
    }

    /// Unpacks a format-A-encoded reverse move. Self-contained; does not need position context.
    pub fn unpack_a(bits: u32) -> Self {
        let to = unsafe { Square::from_index_unchecked(((bits >> 23) & 0x3F) as u8) };
        let from = unsafe { Square::from_index_unchecked(((bits >> 17) & 0x3F) as u8) };
        let kind_code = (bits >> 14) & 0x7;
        let promoted_code = (bits >> 11) & 0x7;
        let captured_code = (bits >> 8) & 0x7;
        let old_castling = CastlingRights::new(((bits >> 4) & 0xF) as u8);
        let had_ep = (bits >> 3) & 0x1;
        let ep_file = bits & 0x7;

        ReverseMove {
            from,
            to,
            kind: Self::kind_from_codes(kind_code, promoted_code),
            captured: Self::from_captured_code(captured_code),
            old_castling,
            old_en_passant_file: if had_ep == 1 { Some(ep_file as u8) } else { None },
        }
    }

    /// Packs into format B: `(toSquareIndex:4, destinationIndex:6, captured:3, castling:4,
    /// hadEp:1, epFile:3)`, 21 bits.
    ///
    /// `position_after` is the position reached after the forward move (i.e. the one this
    /// reverse move is attached to); it supplies the mover's occupancy used to compress `to`
    /// down to a 4-bit index, and the moved piece's type used to select the delta table that
    /// recovers `from` on decode.
    ///
    /// Returns a `u32` even though only the low 21 bits are meaningful — `(toSquareIndex:4,
    /// destinationIndex:6, captured:3, castling:4, hadEp:1, epFile:3)` already exceeds 16 bits.
    pub fn pack_b(self, position_after: &Position) -> u32 {
        let mover = position_after.side_to_move.opposite();
        let to_index = occupancy_index(position_after.colors_of(mover), self.to);
        let piece = position_after
            .piece_at(self.to)
            .map(|(p, _)| p)
            .unwrap_or(Piece::Pawn);
        let destination_index = destination_index_for(piece, mover, self.kind, self.from, self.to);

        let had_ep = self.old_en_passant_file.is_some() as u32;
        let ep_file = self.old_en_passant_file.unwrap_or(0) as u32;

        (to_index as u32) << 17
            | destination_index << 11
            | self.captured_code() << 8
            | (self.old_castling.raw() as u32) << 4
            | had_ep << 3
            | ep_file
    }

    /// Unpacks a format-B-encoded reverse move, given the position it was played into.
    pub fn unpack_b(position_after: &Position, bits: u32) -> Self {
        let to_index = (bits >> 17) & 0xF;
        let destination_index = (bits >> 11) & 0x3F;
        let captured_code = ((bits >> 8) & 0x7) as u32;
        let old_castling = CastlingRights::new(((bits >> 4) & 0xF) as u8);
        let had_ep = (bits >> 3) & 0x1;
        let ep_file = bits & 0x7;

        let mover = position_after.side_to_move.opposite();
        let to = nth_occupied_square(position_after.colors_of(mover), to_index as usize)
            .expect("toSquareIndex must index an occupied square of the mover");
        let piece = position_after
            .piece_at(to)
            .map(|(p, _)| p)
            .unwrap_or(Piece::Pawn);
        let (from, kind) = from_and_kind_for(piece, mover, to, destination_index);

        ReverseMove {
            from,
            to,
            kind,
            captured: Self::from_captured_code(captured_code),
            old_castling,
            old_en_passant_file: if had_ep == 1 { Some(ep_file as u8) } else { None },
        }
    }
}

/// Index of `sq` within `bb`'s set bits in ascending order (the "k-th set bit" lookup).
fn occupancy_index(bb: Bitboard, sq: Square) -> usize {
    let mut bb = bb;
    let mut index = 0;
    while let Some(next) = bb.pop_lsb() {
        if next == sq {
            return index;
        }
        index += 1;
    }
    unreachable!("sq must be a member of bb")
}

fn nth_occupied_square(bb: Bitboard, n: usize) -> Option<Square> {
    let mut bb = bb;
    let mut count = 0;
    while let Some(sq) = bb.pop_lsb() {
        if count == n {
            return Some(sq);
        }
        count += 1;
    }
    None
}

const KNIGHT_DELTAS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];

const KING_DELTAS: [(i8, i8); 8] = [
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
];

const ROOK_DIRS: [(i8, i8); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];
const BISHOP_DIRS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, -1), (-1, 1)];
/// Rook dirs followed by bishop dirs, used for the queen so one 8-entry table covers both.
const QUEEN_DIRS: [(i8, i8); 8] = [
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, 0),
    (1, 1),
    (1, -1),
    (-1, -1),
    (-1, 1),
];

fn delta(from: Square, to: Square) -> (i8, i8) {
    (
        to.file().index() as i8 - from.file().index() as i8,
        to.rank().index() as i8 - from.rank().index() as i8,
    )
}

fn square_from(to: Square, df: i8, dr: i8) -> Option<Square> {
    let file = to.file().index() as i8 - df;
    let rank = to.rank().index() as i8 - dr;
    if !(0..8).contains(&file) || !(0..8).contains(&rank) {
        return None;
    }
    Some(Square::new(
        File::from_index(file as u8)?,
        chess_core::Rank::from_index(rank as u8)?,
    ))
}

fn destination_index_for(
    piece: Piece,
    mover: Color,
    kind: ReverseMoveKind,
    from: Square,
    to: Square,
) -> u32 {
    if kind == ReverseMoveKind::CastleKingside {
        return 8;
    }
    if kind == ReverseMoveKind::CastleQueenside {
        return 9;
    }

    match piece {
        Piece::Knight => {
            let d = delta(from, to);
            KNIGHT_DELTAS.iter().position(|&k| k == d).unwrap_or(0) as u32
        }
        Piece::King => {
            let d = delta(from, to);
            KING_DELTAS.iter().position(|&k| k == d).unwrap_or(0) as u32
        }
        Piece::Rook => {
            let (df, dr) = delta(from, to);
            let dist = df.unsigned_abs().max(dr.unsigned_abs()) as u32;
            let dir = (df.signum(), dr.signum());
            let dir_idx = ROOK_DIRS.iter().position(|&d| d == dir).unwrap_or(0) as u32;
            dir_idx * 7 + dist.saturating_sub(1)
        }
        Piece::Bishop => {
            let (df, dr) = delta(from, to);
            let dist = df.unsigned_abs().max(dr.unsigned_abs()) as u32;
            let dir = (df.signum(), dr.signum());
            let dir_idx = BISHOP_DIRS.iter().position(|&d| d == dir).unwrap_or(0) as u32;
            dir_idx * 7 + dist.saturating_sub(1)
        }
        Piece::Queen => {
            let (df, dr) = delta(from, to);
            let dist = df.unsigned_abs().max(dr.unsigned_abs()) as u32;
            let dir = (df.signum(), dr.signum());
            let dir_idx = QUEEN_DIRS.iter().position(|&d| d == dir).unwrap_or(0) as u32;
            dir_idx * 7 + dist.saturating_sub(1)
        }
        Piece::Pawn => {
            let forward = mover.pawn_direction();
            let (df, dr) = delta(from, to);
            let plain_index = match (df, dr) {
                (0, d) if d == 2 * forward => 0,
                (0, d) if d == forward => 1,
                (-1, d) if d == forward => 2,
                (1, d) if d == forward => 3,
                _ => 0,
            };
            match kind {
                ReverseMoveKind::Promotion(promoted) => {
                    let promo_idx = match promoted {
                        Piece::Knight => 0,
                        Piece::Bishop => 1,
                        Piece::Rook => 2,
                        _ => 3,
                    };
                    4 + plain_index * 4 + promo_idx
                }
                _ => plain_index,
            }
        }
    }
}

fn from_and_kind_for(
    piece: Piece,
    mover: Color,
    to: Square,
    destination_index: u32,
) -> (Square, ReverseMoveKind) {
    if destination_index == 8 {
        let from = Square::new(File::E, to.rank());
        return (from, ReverseMoveKind::CastleKingside);
    }
    if destination_index == 9 {
        let from = Square::new(File::E, to.rank());
        return (from, ReverseMoveKind::CastleQueenside);
    }

    match piece {
        Piece::Knight => {
            let (df, dr) = KNIGHT_DELTAS[(destination_index as usize).min(7)];
            (
                square_from(to, df, dr).unwrap_or(to),
                ReverseMoveKind::Normal,
            )
        }
        Piece::King => {
            let (df, dr) = KING_DELTAS[(destination_index as usize).min(7)];
            (
                square_from(to, df, dr).unwrap_or(to),
                ReverseMoveKind::Normal,
            )
        }
        Piece::Rook => {
            let dir_idx = (destination_index as usize / 7).min(3);
            let dist = destination_index % 7 + 1;
            let (dirf, dirr) = ROOK_DIRS[dir_idx];
            let from = square_from(to, dirf * dist as i8, dirr * dist as i8).unwrap_or(to);
            (from, ReverseMoveKind::Normal)
        }
        Piece::Bishop => {
            let dir_idx = (destination_index as usize / 7).min(3);
            let dist = destination_index % 7 + 1;
            let (dirf, dirr) = BISHOP_DIRS[dir_idx];
            let from = square_from(to, dirf * dist as i8, dirr * dist as i8).unwrap_or(to);
            (from, ReverseMoveKind::Normal)
        }
        Piece::Queen => {
            let dir_idx = (destination_index as usize / 7).min(7);
            let dist = destination_index % 7 + 1;
            let (dirf, dirr) = QUEEN_DIRS[dir_idx];
            let from = square_from(to, dirf * dist as i8, dirr * dist as i8).unwrap_or(to);
            (from, ReverseMoveKind::Normal)
        }
        Piece::Pawn => {
            let forward = mover.pawn_direction();
            let (plain_index, promoted) = if destination_index >= 4 {
                let rest = destination_index - 4;
                let plain = rest / 4;
                let promo_idx = rest % 4;
                let promoted = match promo_idx {
                    0 => Piece::Knight,
                    1 => Piece::Bishop,
                    2 => Piece::Rook,
                    _ => Piece::Queen,
                };
                (plain, Some(promoted))
            } else {
                (destination_index, None)
            };

            let (df, dr): (i8, i8) = match plain_index {
                0 => (0, 2 * forward),
                1 => (0, forward),
                2 => (-1, forward),
                _ => (1, forward),
            };
            let from = square_from(to, df, dr).unwrap_or(to);
            let kind = match promoted {
                Some(p) => ReverseMoveKind::Promotion(p),
                None if dr.unsigned_abs() == 2 => ReverseMoveKind::DoublePush,
                None => ReverseMoveKind::Normal,
            };
            (from, kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Position;

    #[test]
    fn format_a_roundtrip_normal_capture() {
        let pos = Position::from_fen("8/8/8/3p4/4P3/8/8/k6K w - - 0 1").unwrap();
        let m = Move::from_uci("e4d5").unwrap();
        let rm = ReverseMove::capture(&pos, m);
        assert_eq!(rm.captured, Some(Piece::Pawn));
        let bits = rm.pack_a();
        assert_eq!(ReverseMove::unpack_a(bits), rm);
    }

    #[test]
    fn format_a_roundtrip_quiet_move() {
        let pos = Position::startpos();
        let m = Move::from_uci("g1f3").unwrap();
        let rm = ReverseMove::capture(&pos, m);
        assert_eq!(rm.captured, None);
        let bits = rm.pack_a();
        assert_eq!(ReverseMove::unpack_a(bits), rm);
    }

    #[test]
    fn format_a_roundtrip_en_passant() {
        let pos =
            Position::from_fen("rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 2")
                .unwrap();
        let m = Move::new(
            Square::from_algebraic("d4").unwrap(),
            Square::from_algebraic("e3").unwrap(),
            MoveFlag::EnPassant,
        );
        let rm = ReverseMove::capture(&pos, m);
        assert_eq!(rm.captured, Some(Piece::Pawn));
        assert_eq!(rm.old_en_passant_file, Some(File::E.index()));
        let bits = rm.pack_a();
        assert_eq!(ReverseMove::unpack_a(bits), rm);
    }

    #[test]
    fn format_a_roundtrip_promotion() {
        let pos = Position::from_fen("8/P7/8/8/8/8/8/k6K w - - 0 1").unwrap();
        let m = Move::new(
            Square::from_algebraic("a7").unwrap(),
            Square::from_algebraic("a8").unwrap(),
            MoveFlag::PromoteQueen,
        );
        let rm = ReverseMove::capture(&pos, m);
        let bits = rm.pack_a();
        assert_eq!(ReverseMove::unpack_a(bits), rm);
    }

    #[test]
    fn format_b_roundtrip_knight_move() {
        let before = Position::startpos();
        let m = Move::from_uci("g1f3").unwrap();
        let rm = ReverseMove::capture(&before, m);
        let after = crate::make_move(&before, m);
        let bits = rm.pack_b(&after);
        let decoded = ReverseMove::unpack_b(&after, bits);
        assert_eq!(decoded.to, rm.to);
        assert_eq!(decoded.from, rm.from);
        assert_eq!(decoded.captured, rm.captured);
        assert_eq!(decoded.old_castling, rm.old_castling);
        assert_eq!(decoded.old_en_passant_file, rm.old_en_passant_file);
    }

    #[test]
    fn format_b_roundtrip_queen_long_slide() {
        let before = Position::from_fen("7k/8/8/8/8/8/8/Q6K w - - 0 1").unwrap();
        let m = Move::from_uci("a1a8").unwrap();
        let rm = ReverseMove::capture(&before, m);
        let after = crate::make_move(&before, m);
        let bits = rm.pack_b(&after);
        let decoded = ReverseMove::unpack_b(&after, bits);
        assert_eq!(decoded.to, rm.to);
        assert_eq!(decoded.from, rm.from);
        assert_eq!(decoded.captured, rm.captured);
        assert_eq!(decoded.old_castling, rm.old_castling);
        assert_eq!(decoded.old_en_passant_file, rm.old_en_passant_file);
    }

    #[test]
    fn format_b_roundtrip_pawn_double_push() {
        let before = Position::startpos();
        let m = Move::new(
            Square::from_algebraic("e2").unwrap(),
            Square::from_algebraic("e4").unwrap(),
            MoveFlag::DoublePush,
        );
        let rm = ReverseMove::capture(&before, m);
        let after = crate::make_move(&before, m);
        let bits = rm.pack_b(&after);
        let decoded = ReverseMove::unpack_b(&after, bits);
        assert_eq!(decoded.from, rm.from);
        assert_eq!(decoded.to, rm.to);
        assert_eq!(decoded.kind, rm.kind);
    }
}
