//! Encodes/decodes a game's move sequence in the file's chosen [`CompLevel`] (§4.C, §9).
//!
//! Both directions replay moves against a running [`Position`], starting from the game's start
//! position (standard or custom): `compLevel = 1`'s index encoding needs the position to
//! regenerate the same canonical legal-move list the encoder saw, and `compLevel = 0`'s long
//! encoding needs it to disambiguate plain pushes from double pushes and castling side.

use chess_core::Move;
use chess_engine::{from_long, from_short, make_move, requires_wide_index, to_long, to_short, Position};

use crate::error::{BcgnError, Result};
use crate::header::CompLevel;

pub fn encode(start: &Position, moves: &[Move], comp_level: CompLevel) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut position = start.clone();

    for &m in moves {
        match comp_level {
            CompLevel::Long => buf.extend_from_slice(&to_long(m).to_be_bytes()),
            CompLevel::Index => buf.extend_from_slice(&to_short(&position, m)),
        }
        position = make_move(&position, m);
    }

    buf
}

pub fn decode(start: &Position, bytes: &[u8], ply_count: usize, comp_level: CompLevel) -> Result<Vec<Move>> {
    let mut position = start.clone();
    let mut moves = Vec::with_capacity(ply_count);
    let mut cursor = 0usize;

    for _ in 0..ply_count {
        let m = match comp_level {
            CompLevel::Long => {
                let chunk = bytes
                    .get(cursor..cursor + 2)
                    .ok_or(BcgnError::Truncated(bytes.len() - cursor))?;
                cursor += 2;
                from_long(&position, u16::from_be_bytes(chunk.try_into().unwrap()))
            }
            CompLevel::Index => {
                let width = if requires_wide_index(&position) { 2 } else { 1 };
                let chunk = bytes
                    .get(cursor..cursor + width)
                    .ok_or(BcgnError::Truncated(bytes.len() - cursor))?;
                cursor += width;
                from_short(&position, chunk).ok_or(BcgnError::Truncated(bytes.len() - cursor))?
            }
        };

        position = make_move(&position, m);
        moves.push(m);
    }

    Ok(moves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::MoveFlag;

    fn scholars_mate() -> Vec<Move> {
        use chess_core::Square;
        vec![
            Move::new(Square::from_algebraic("e2").unwrap(), Square::from_algebraic("e4").unwrap(), MoveFlag::DoublePush),
            Move::new(Square::from_algebraic("e7").unwrap(), Square::from_algebraic("e5").unwrap(), MoveFlag::DoublePush),
            Move::normal(Square::from_algebraic("f1").unwrap(), Square::from_algebraic("c4").unwrap()),
            Move::normal(Square::from_algebraic("b8").unwrap(), Square::from_algebraic("c6").unwrap()),
            Move::normal(Square::from_algebraic("d1").unwrap(), Square::from_algebraic("h5").unwrap()),
            Move::normal(Square::from_algebraic("g8").unwrap(), Square::from_algebraic("f6").unwrap()),
            Move::normal(Square::from_algebraic("h5").unwrap(), Square::from_algebraic("f7").unwrap()),
        ]
    }

    #[test]
    fn long_encoding_roundtrips() {
        let start = Position::startpos();
        let moves = scholars_mate();
        let bytes = encode(&start, &moves, CompLevel::Long);
        assert_eq!(bytes.len(), moves.len() * 2);
        let back = decode(&start, &bytes, moves.len(), CompLevel::Long).unwrap();
        assert_eq!(back, moves);
    }

    #[test]
    fn index_encoding_roundtrips() {
        let start = Position::startpos();
        let moves = scholars_mate();
        let bytes = encode(&start, &moves, CompLevel::Index);
        let back = decode(&start, &bytes, moves.len(), CompLevel::Index).unwrap();
        assert_eq!(back, moves);
    }

    #[test]
    fn truncated_movetext_is_an_error() {
        let start = Position::startpos();
        let moves = scholars_mate();
        let bytes = encode(&start, &moves, CompLevel::Long);
        assert!(decode(&start, &bytes[..bytes.len() - 1], moves.len(), CompLevel::Long).is_err());
    }
}
