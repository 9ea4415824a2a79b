//! End-to-end ingest-then-query scenarios (§8 "Ingest a BCGN file containing one game ...").

use bcgn::header::CompLevel;
use bcgn::record::{Date, Eco, Game, GameHeader, Outcome};
use bcgn::writer;
use chess_core::{Move, MoveFlag, Square};
use pdb::{Database, DbKey, PipelineConfig, PositionQuery, Request, SelectorRequest};
use pdb_entry::format::beta::Beta;
use pdb_entry::format::epsilon::Row as Epsilon;
use pdb_entry::{Level, RowStats};

fn one_game() -> Game {
    Game {
        header: GameHeader {
            outcome: Outcome::Draw,
            date: Date { year: 2021, month: 6, day: 15 },
            white_elo: 2000,
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
            Move::new(
                Square::from_algebraic("e2").unwrap(),
                Square::from_algebraic("e4").unwrap(),
                MoveFlag::DoublePush,
            ),
            Move::new(
                Square::from_algebraic("e7").unwrap(),
                Square::from_algebraic("e5").unwrap(),
                MoveFlag::DoublePush,
            ),
        ],
    }
}

#[tokio::test]
async fn single_game_ingest_reports_start_and_reply_positions() {
    let dir = tempfile::tempdir().unwrap();
    let bcgn_path = dir.path().join("one_game.bcgn");
    writer::write_all(&bcgn_path, CompLevel::Long, &[one_game()]).await.unwrap();

    let db_path = dir.path().join("db");
    let db = Database::<Beta>::create(&db_path, DbKey::Beta, PipelineConfig::default())
        .await
        .unwrap();
    single_game_ingest_reports_start_and_reply_positions_impl(db, &bcgn_path).await;
}

/// Same scenario against `db_epsilon`, whose rows get smeared across multiple physical rows and
/// must be grouped back into one logical entry before the counts here add up (§4.I).
#[tokio::test]
async fn single_game_ingest_into_epsilon_reports_start_and_reply_positions() {
    let dir = tempfile::tempdir().unwrap();
    let bcgn_path = dir.path().join("one_game.bcgn");
    writer::write_all(&bcgn_path, CompLevel::Long, &[one_game()]).await.unwrap();

    let db_path = dir.path().join("db");
    let db = Database::<Epsilon>::create(&db_path, DbKey::Epsilon, PipelineConfig::default())
        .await
        .unwrap();
    single_game_ingest_reports_start_and_reply_positions_impl(db, &bcgn_path).await;
}

async fn single_game_ingest_reports_start_and_reply_positions_impl<E>(
    db: Database<E>,
    bcgn_path: &std::path::Path,
) where
    E: pdb_entry::PackedEntry + RowStats,
{
    let stats = db
        .ingest_sequential(&[bcgn_path.to_path_buf()], Level::Human, 8192)
        .await
        .unwrap();
    assert_eq!(stats.games_ingested, 1);
    assert_eq!(stats.games_skipped, 0);
    assert_eq!(stats.positions_indexed, 3); // start position + after e2e4 + after e7e5

    let start_fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    let after_e4_fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";

    let request = Request {
        positions: vec![
            PositionQuery {
                fen: start_fen.to_string(),
                selectors: vec![SelectorRequest::Transpositions],
                with_headers: false,
            },
            PositionQuery {
                fen: after_e4_fen.to_string(),
                selectors: vec![SelectorRequest::Transpositions, SelectorRequest::Retractions],
                with_headers: false,
            },
        ],
    };
    let response = db.query(&request).await;

    let start_result = &response.results[0];
    assert!(start_result.errors.is_empty());
    assert_eq!(start_result.transpositions.len(), 1);
    let start_bucket = &start_result.transpositions[0];
    assert_eq!(start_bucket.level, "human");
    assert_eq!(start_bucket.result, "draw");
    assert_eq!(start_bucket.count, 1);

    let after_e4_result = &response.results[1];
    assert!(after_e4_result.errors.is_empty());
    assert_eq!(after_e4_result.transpositions.len(), 1);
    let after_e4_bucket = &after_e4_result.transpositions[0];
    assert_eq!(after_e4_bucket.count, 1);
    assert_eq!(after_e4_bucket.result, "draw");

    assert_eq!(after_e4_result.retractions.len(), 1);
    let retraction = &after_e4_result.retractions[0];
    assert_eq!(retraction.count, 1);

    db.close().await;
}
