// Integration tests for the cell occupancy protocol
//
// Covers mutual exclusion of claims, and the two ways a blocked claim is
// released without the cell becoming free: game over and interruption.

use rand::Rng;
use snake_grid::board::Board;
use snake_grid::cell::Cell;
use snake_grid::config::Config;
use snake_grid::error::MoveError;
use snake_grid::snake::SnakeKind;
use snake_grid::types::{Position, SnakeId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

fn small_config(width: i32, height: i32) -> Config {
    let mut config = Config::default_hardcoded();
    config.board.width = width;
    config.board.height = height;
    config.board.num_obstacles = 0;
    config
}

/// Test: many threads racing for one cell never hold it at the same time
#[test]
fn test_claim_is_mutually_exclusive() {
    let cell = Arc::new(Cell::new(Position::new(0, 0)));
    let inside = Arc::new(AtomicUsize::new(0));
    let violated = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = mpsc::channel();

    for i in 0..8 {
        let cell = Arc::clone(&cell);
        let inside = Arc::clone(&inside);
        let violated = Arc::clone(&violated);
        let done_tx = done_tx.clone();
        thread::spawn(move || {
            for _ in 0..25 {
                cell.claim(SnakeId(i), || None).unwrap();
                if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                    violated.store(true, Ordering::SeqCst);
                }
                assert_eq!(cell.occupant(), Some(SnakeId(i)));
                thread::sleep(Duration::from_micros(200));
                inside.fetch_sub(1, Ordering::SeqCst);
                assert_eq!(cell.release(), Some(SnakeId(i)));
            }
            done_tx.send(()).unwrap();
        });
    }

    for _ in 0..8 {
        done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("claimers should not deadlock");
    }
    assert!(!violated.load(Ordering::SeqCst), "two snakes held the cell at once");
    assert!(!cell.is_occupied());
}

/// Test: random claim/release traffic over a small grid keeps one occupant per cell
#[test]
fn test_random_claims_keep_single_occupant() {
    let cells: Arc<Vec<Cell>> = Arc::new(
        (0..4)
            .map(|y| Cell::new(Position::new(0, y)))
            .collect(),
    );
    let holders: Arc<Vec<AtomicUsize>> = Arc::new((0..4).map(|_| AtomicUsize::new(0)).collect());
    let violated = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = mpsc::channel();

    for i in 0..6 {
        let cells = Arc::clone(&cells);
        let holders = Arc::clone(&holders);
        let violated = Arc::clone(&violated);
        let done_tx = done_tx.clone();
        thread::spawn(move || {
            let mut rng = rand::rng();
            for _ in 0..50 {
                // One cell at a time, so no thread ever waits while holding another
                let index = rng.random_range(0..cells.len());
                cells[index].claim(SnakeId(i), || None).unwrap();
                if holders[index].fetch_add(1, Ordering::SeqCst) != 0 {
                    violated.store(true, Ordering::SeqCst);
                }
                thread::yield_now();
                holders[index].fetch_sub(1, Ordering::SeqCst);
                cells[index].release();
            }
            done_tx.send(()).unwrap();
        });
    }

    for _ in 0..6 {
        done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("random claimers should finish");
    }
    assert!(!violated.load(Ordering::SeqCst));
    assert!(cells.iter().all(|cell| !cell.is_occupied()));
}

/// Test: a goal does not block passage
#[test]
fn test_claim_on_goal_cell_succeeds_immediately() {
    let config = small_config(3, 3);
    let board = Board::builder(&config)
        .goal_at(Position::new(1, 1))
        .random_obstacles(0)
        .build();

    let cell = board.grid().cell(Position::new(1, 1));
    assert!(cell.has_goal());
    assert!(!cell.is_occupied());
    cell.claim(SnakeId(7), || None).unwrap();
    assert_eq!(cell.occupant(), Some(SnakeId(7)));
    assert!(cell.has_goal());
}

/// Test: an obstacle blocks the claim until the abort condition fires
#[test]
fn test_claim_on_obstacle_cell_blocks() {
    let config = small_config(3, 3);
    let board = Board::builder(&config)
        .goal_at(Position::new(0, 0))
        .obstacle_at(Position::new(2, 2))
        .build();
    let cell = board.grid().cell(Position::new(2, 2));
    assert!(cell.is_occupied());

    let result = cell.claim(SnakeId(0), || Some(MoveError::GameOver));
    assert_eq!(result, Err(MoveError::GameOver));
    assert_eq!(cell.occupant(), None);
}

/// Test: game over releases every snake blocked on a claim
#[test]
fn test_mark_terminal_wakes_blocked_claims() {
    let config = small_config(5, 5);
    let board = Board::builder(&config)
        .goal_at(Position::new(0, 0))
        .random_obstacles(0)
        .build();

    let holder = board.add_snake(SnakeKind::Automatic);
    holder.place_at(&board, Position::new(2, 2)).unwrap();

    let (result_tx, result_rx) = mpsc::channel();
    for start in [Position::new(1, 2), Position::new(3, 2), Position::new(2, 1)] {
        let waiter = board.add_snake(SnakeKind::Automatic);
        waiter.place_at(&board, start).unwrap();
        let board = Arc::clone(&board);
        let result_tx = result_tx.clone();
        thread::spawn(move || {
            result_tx
                .send(waiter.move_to(&board, Position::new(2, 2)))
                .unwrap();
        });
    }

    thread::sleep(Duration::from_millis(50));
    assert!(board.mark_terminal());

    for _ in 0..3 {
        let result = result_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("blocked claim should return after game over");
        assert_eq!(result, Err(MoveError::GameOver));
    }
    assert_eq!(
        board.grid().cell(Position::new(2, 2)).occupant(),
        Some(holder.id())
    );
}

/// Test: an interrupted claim returns Interrupted and leaves the snake unchanged
#[test]
fn test_interrupt_unblocks_claim() {
    let config = small_config(5, 5);
    let board = Board::builder(&config)
        .goal_at(Position::new(0, 0))
        .random_obstacles(0)
        .build();

    let holder = board.add_snake(SnakeKind::Automatic);
    holder.place_at(&board, Position::new(2, 2)).unwrap();
    let waiter = board.add_snake(SnakeKind::Human);
    waiter.place_at(&board, Position::new(2, 3)).unwrap();

    let (result_tx, result_rx) = mpsc::channel();
    {
        let board = Arc::clone(&board);
        let waiter = Arc::clone(&waiter);
        thread::spawn(move || {
            result_tx
                .send(waiter.move_to(&board, Position::new(2, 2)))
                .unwrap();
        });
    }

    thread::sleep(Duration::from_millis(50));
    assert!(board.interrupt_snake(waiter.id()));

    let result = result_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("interrupt should unblock the claim");
    assert_eq!(result, Err(MoveError::Interrupted(Position::new(2, 2))));
    assert_eq!(waiter.path(), vec![Position::new(2, 3)]);
    assert!(!board.is_finished());
    assert!(!waiter.take_interrupt(), "interrupt should be consumed");
}

/// Test: a blocked snake proceeds once the holder moves away
#[test]
fn test_blocked_claim_proceeds_after_release() {
    let config = small_config(5, 5);
    let board = Board::builder(&config)
        .goal_at(Position::new(4, 4))
        .random_obstacles(0)
        .build();

    let holder = board.add_snake(SnakeKind::Automatic);
    holder.place_at(&board, Position::new(2, 2)).unwrap();
    let waiter = board.add_snake(SnakeKind::Automatic);
    waiter.place_at(&board, Position::new(1, 2)).unwrap();

    let (result_tx, result_rx) = mpsc::channel();
    {
        let board = Arc::clone(&board);
        let waiter = Arc::clone(&waiter);
        thread::spawn(move || {
            result_tx
                .send(waiter.move_to(&board, Position::new(2, 2)))
                .unwrap();
        });
    }

    thread::sleep(Duration::from_millis(50));
    assert!(result_rx.try_recv().is_err(), "claim should still be blocked");
    board.remove_snake(holder.id());

    let advance = result_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("claim should proceed after release")
        .unwrap();
    assert_eq!(advance.head, Position::new(2, 2));
    assert_eq!(
        board.grid().cell(Position::new(2, 2)).occupant(),
        Some(waiter.id())
    );
}
