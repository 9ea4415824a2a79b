//! One game record: header fields plus movetext (§4.C).

use chess_core::Move;
use chess_engine::Position;

use crate::error::{BcgnError, Result};
use crate::header::CompLevel;
use crate::movetext;
use crate::position::{self as cpos};

const FLAG_HAS_ADDITIONAL_TAGS: u8 = 0b01;
const FLAG_HAS_CUSTOM_START_POSITION: u8 = 0b10;

/// A game date. `0` in any component means "unknown" (§4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

/// The `plyCountAndResult` field's low 2 bits (§4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unknown = 0,
    WhiteWin = 1,
    BlackWin = 2,
    Draw = 3,
}

impl Outcome {
    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0 => Outcome::Unknown,
            1 => Outcome::WhiteWin,
            2 => Outcome::BlackWin,
            _ => Outcome::Draw,
        }
    }

    fn to_bits(self) -> u16 {
        self as u16
    }
}

/// ECO opening classification. `category = 0` means unclassified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Eco {
    pub category: u8,
    pub index: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameHeader {
    pub outcome: Outcome,
    pub date: Date,
    pub white_elo: u16,
    pub black_elo: u16,
    pub round: u16,
    pub eco: Eco,
    pub white_player: String,
    pub black_player: String,
    pub event: String,
    pub site: String,
    /// `None` means the game starts from the standard initial position.
    pub start_position: Option<Position>,
    pub extra_tags: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub header: GameHeader,
    pub moves: Vec<Move>,
}

impl Game {
    pub fn start_position(&self) -> Position {
        self.header.start_position.clone().unwrap_or_else(Position::startpos)
    }
}

fn write_str(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    if s.len() > 255 {
        return Err(BcgnError::StringTooLong);
    }
    if s.as_bytes().contains(&0) {
        return Err(BcgnError::StringContainsNul);
    }
    buf.push(s.len() as u8);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_str(bytes: &[u8], cursor: &mut usize) -> Result<String> {
    let len = *bytes.get(*cursor).ok_or(BcgnError::Truncated(0))? as usize;
    *cursor += 1;
    let slice = bytes
        .get(*cursor..*cursor + len)
        .ok_or(BcgnError::Truncated(bytes.len() - *cursor))?;
    *cursor += len;
    Ok(String::from_utf8_lossy(slice).into_owned())
}

/// Encodes one game record, including its `totalLen`/`headerLen` prefix.
pub fn encode(game: &Game, comp_level: CompLevel) -> Result<Vec<u8>> {
    if game.moves.len() > 0x3FFF {
        return Err(BcgnError::PlyCountOverflow(game.moves.len()));
    }

    let mut header_buf = Vec::new();

    let ply_and_result =
        ((game.moves.len() as u16) << 2) | game.header.outcome.to_bits();
    header_buf.extend_from_slice(&ply_and_result.to_be_bytes());

    header_buf.extend_from_slice(&game.header.date.year.to_be_bytes());
    header_buf.push(game.header.date.month);
    header_buf.push(game.header.date.day);

    header_buf.extend_from_slice(&game.header.white_elo.to_be_bytes());
    header_buf.extend_from_slice(&game.header.black_elo.to_be_bytes());
    header_buf.extend_from_slice(&game.header.round.to_be_bytes());

    header_buf.push(game.header.eco.category);
    header_buf.push(game.header.eco.index);

    let flags = (if !game.header.extra_tags.is_empty() { FLAG_HAS_ADDITIONAL_TAGS } else { 0 })
        | (if game.header.start_position.is_some() { FLAG_HAS_CUSTOM_START_POSITION } else { 0 });
    header_buf.push(flags);

    if let Some(start) = &game.header.start_position {
        header_buf.extend_from_slice(&cpos::encode(start));
    }

    write_str(&mut header_buf, &game.header.white_player)?;
    write_str(&mut header_buf, &game.header.black_player)?;
    write_str(&mut header_buf, &game.header.event)?;
    write_str(&mut header_buf, &game.header.site)?;

    if !game.header.extra_tags.is_empty() {
        header_buf.push(game.header.extra_tags.len() as u8);
        for (key, value) in &game.header.extra_tags {
            write_str(&mut header_buf, key)?;
            write_str(&mut header_buf, value)?;
        }
    }

    let movetext = movetext::encode(&game.start_position(), &game.moves, comp_level);

    // totalLen/headerLen + the header body itself + the movetext.
    let header_len = 4 + header_buf.len();
    let total_len = header_len + movetext.len();
    if total_len >= 0xFFFF {
        return Err(BcgnError::GameTooLong { len: total_len });
    }

    let mut record = Vec::with_capacity(total_len);
    record.extend_from_slice(&(total_len as u16).to_be_bytes());
    record.extend_from_slice(&(header_len as u16).to_be_bytes());
    record.extend_from_slice(&header_buf);
    record.extend_from_slice(&movetext);

    debug_assert_eq!(record.len(), total_len);
    Ok(record)
}

/// Decodes one game record from the start of `bytes`. Returns the decoded [`Game`] and the
/// number of bytes consumed (`totalLen`).
pub fn decode(bytes: &[u8], comp_level: CompLevel) -> Result<(Game, usize)> {
    if bytes.len() < 4 {
        return Err(BcgnError::Truncated(bytes.len()));
    }
    let total_len = u16::from_be_bytes(bytes[0..2].try_into().unwrap()) as usize;
    let header_len = u16::from_be_bytes(bytes[2..4].try_into().unwrap()) as usize;
    if bytes.len() < total_len {
        return Err(BcgnError::Truncated(bytes.len()));
    }

    let mut cursor = 4usize;
    let ply_and_result = u16::from_be_bytes(bytes[cursor..cursor + 2].try_into().unwrap());
    cursor += 2;
    let ply_count = (ply_and_result >> 2) as usize;
    let outcome = Outcome::from_bits(ply_and_result);

    let date = Date {
        year: u16::from_be_bytes(bytes[cursor..cursor + 2].try_into().unwrap()),
        month: bytes[cursor + 2],
        day: bytes[cursor + 3],
    };
    cursor += 4;

    let white_elo = u16::from_be_bytes(bytes[cursor..cursor + 2].try_into().unwrap());
    cursor += 2;
    let black_elo = u16::from_be_bytes(bytes[cursor..cursor + 2].try_into().unwrap());
    cursor += 2;
    let round = u16::from_be_bytes(bytes[cursor..cursor + 2].try_into().unwrap());
    cursor += 2;

    let eco = Eco { category: bytes[cursor], index: bytes[cursor + 1] };
    cursor += 2;

    let flags = bytes[cursor];
    cursor += 1;

    let start_position = if flags & FLAG_HAS_CUSTOM_START_POSITION != 0 {
        let slice: [u8; cpos::SIZE] = bytes
            .get(cursor..cursor + cpos::SIZE)
            .ok_or(BcgnError::Truncated(bytes.len() - cursor))?
            .try_into()
            .unwrap();
        cursor += cpos::SIZE;
        Some(cpos::decode(&slice))
    } else {
        None
    };

    let white_player = read_str(bytes, &mut cursor)?;
    let black_player = read_str(bytes, &mut cursor)?;
    let event = read_str(bytes, &mut cursor)?;
    let site = read_str(bytes, &mut cursor)?;

    let mut extra_tags = Vec::new();
    if flags & FLAG_HAS_ADDITIONAL_TAGS != 0 {
        let count = *bytes.get(cursor).ok_or(BcgnError::Truncated(0))?;
        cursor += 1;
        for _ in 0..count {
            let key = read_str(bytes, &mut cursor)?;
            let value = read_str(bytes, &mut cursor)?;
            extra_tags.push((key, value));
        }
    }

    debug_assert_eq!(cursor, header_len, "header field parsing must consume exactly headerLen bytes");

    let header = GameHeader {
        outcome,
        date,
        white_elo,
        black_elo,
        round,
        eco,
        white_player,
        black_player,
        event,
        site,
        start_position,
        extra_tags,
    };

    let movetext_bytes = &bytes[header_len..total_len];
    let start = header.start_position.clone().unwrap_or_else(Position::startpos);
    let moves = movetext::decode(&start, movetext_bytes, ply_count, comp_level)?;

    Ok((Game { header, moves }, total_len))
}

const _: () = assert!(HEADER_SIZE == crate::header::HEADER_SIZE);

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::{MoveFlag, Square};

    fn sample_game() -> Game {
        GameHeader {
            outcome: Outcome::WhiteWin,
            date: Date { year: 2024, month: 3, day: 14 },
            white_elo: 2400,
            black_elo: 2100,
            round: 1,
            eco: Eco { category: b'C', index: 42 },
            white_player: "Alice".to_string(),
            black_player: "Bob".to_string(),
            event: "Test Open".to_string(),
            site: "Somewhere".to_string(),
            start_position: None,
            extra_tags: vec![("TimeControl".to_string(), "300+0".to_string())],
        }
        .into()
    }

    impl From<GameHeader> for Game {
        fn from(header: GameHeader) -> Self {
            Game {
                header,
                moves: vec![
                    Move::new(Square::from_algebraic("e2").unwrap(), Square::from_algebraic("e4").unwrap(), MoveFlag::DoublePush),
                    Move::new(Square::from_algebraic("e7").unwrap(), Square::from_algebraic("e5").unwrap(), MoveFlag::DoublePush),
                ],
            }
        }
    }

    #[test]
    fn roundtrips_with_long_encoding() {
        let game = sample_game();
        let bytes = encode(&game, CompLevel::Long).unwrap();
        let (decoded, consumed) = decode(&bytes, CompLevel::Long).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, game);
    }

    #[test]
    fn roundtrips_with_index_encoding() {
        let game = sample_game();
        let bytes = encode(&game, CompLevel::Index).unwrap();
        let (decoded, consumed) = decode(&bytes, CompLevel::Index).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, game);
    }

    #[test]
    fn roundtrips_with_custom_start_position() {
        let mut game = sample_game();
        game.header.start_position = Some(
            Position::from_fen("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3").unwrap(),
        );
        game.moves = vec![Move::normal(Square::from_algebraic("f1").unwrap(), Square::from_algebraic("c4").unwrap())];

        let bytes = encode(&game, CompLevel::Long).unwrap();
        let (decoded, _) = decode(&bytes, CompLevel::Long).unwrap();
        assert_eq!(decoded.header.start_position, game.header.start_position);
        assert_eq!(decoded.moves, game.moves);
    }

    #[test]
    fn rejects_player_name_with_nul_byte() {
        let mut game = sample_game();
        game.header.white_player = "bad\0name".to_string();
        assert!(matches!(encode(&game, CompLevel::Long), Err(BcgnError::StringContainsNul)));
    }
}
