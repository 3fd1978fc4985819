//! Performance benchmarks for critical match systems

use server::board::Board;
use server::config::MatchConfig;
use server::enclosure::enclosed_cells;
use server::game::GameState;
use server::snapshot::{compress_board, expand_board, FullSnapshot, ViewResponse};
use shared::{Direction, Point};
use std::time::Instant;

fn full_board_config() -> MatchConfig {
    MatchConfig {
        name: "bench".to_string(),
        persistent: true,
        duration: None,
        seed: Some(3),
        ..MatchConfig::default()
    }
}

/// Board with a 100x80 ring of territory owned by player 1
fn ring_board() -> Board {
    let mut board = Board::new(162, 108).unwrap();
    for x in 20..120 {
        board[Point::new(x, 10)].owner = Some(1);
        board[Point::new(x, 89)].owner = Some(1);
    }
    for y in 10..90 {
        board[Point::new(20, y)].owner = Some(1);
        board[Point::new(119, y)].owner = Some(1);
    }
    board
}

/// Benchmarks outline tracing of a large enclosure
#[test]
fn benchmark_enclosure_trace() {
    let board = ring_board();

    let iterations = 200;
    let start = Instant::now();

    for _ in 0..iterations {
        let cells = enclosed_cells(&board, |c| c.owner == Some(1), Point::new(20, 50));
        assert_eq!(cells.len(), 100 * 80);
    }

    let duration = start.elapsed();
    println!(
        "Enclosure trace: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks micro-turns of a crowded full-size match
#[test]
fn benchmark_step_many_players() {
    let names: Vec<String> = (0..16).map(|i| format!("bot-{}", i)).collect();
    let (mut state, ids) = GameState::with_players(&full_board_config(), &names).unwrap();

    let iterations = 1_000;
    let start = Instant::now();

    for turn in 0..iterations {
        let direction = Direction::ALL[(turn / 5) % 4];
        for &id in &ids {
            state.set_direction(id, direction);
        }
        state.step();
    }

    let duration = start.elapsed();
    println!(
        "Simulation: {} players × {} micro-turns in {:?} ({:.2} μs/turn)",
        ids.len(),
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    let owned = state.board().cells().iter().filter(|c| c.owner.is_some()).count();
    let scored: usize = state.players().map(|p| p.score()).sum();
    assert_eq!(owned, scored);

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks full snapshot and view encoding
#[test]
fn benchmark_snapshot_encoding() {
    let names: Vec<String> = (0..8).map(|i| format!("bot-{}", i)).collect();
    let (state, ids) = GameState::with_players(&full_board_config(), &names).unwrap();

    let iterations = 1_000;
    let start = Instant::now();

    for i in 0..iterations {
        let snapshot = FullSnapshot::capture(&state).to_json().unwrap();
        assert!(!snapshot.is_empty());
        let view = ViewResponse::capture(&state, ids[i % ids.len()]);
        assert!(!view.is_over());
    }

    let duration = start.elapsed();
    println!(
        "Snapshot encoding: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks the run-length board codec on a patterned board
#[test]
fn benchmark_board_codec() {
    let mut board = ring_board();
    for x in (30..110).step_by(3) {
        board[Point::new(x, 40)].tail = Some(2);
    }
    let area = board.area();

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let text = compress_board(&board);
        let cells = expand_board(&text, area).unwrap();
        assert_eq!(cells.len(), area);
    }

    let duration = start.elapsed();
    println!(
        "Board codec: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(expand_board(&compress_board(&board), area).unwrap(), board.cells());

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}
