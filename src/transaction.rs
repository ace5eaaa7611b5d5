// Two-cell transfers of board-owned elements
//
// Moving the goal or an obstacle touches two cells at once. Every transfer
// locks the cell with the smaller position first; with one global order no
// pair of transfers can each hold one lock while waiting for the other.
// Both locks are released on every exit path, destination first.

use log::{debug, info, trace, warn};
use parking_lot::MutexGuard;

use crate::board::{Board, Change};
use crate::cell::{Cell, CellState};
use crate::entities::Obstacle;
use crate::types::{Position, SnakeId};

/// Result of a goal capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    /// Pre-capture goal value, credited to the snake as pending growth
    pub credited: u32,
    /// Goal value after the capture
    pub value: u32,
    /// Where the goal went. None when it stayed put.
    pub relocated_to: Option<Position>,
    pub game_over: bool,
}

pub(crate) enum Commit<T> {
    Done(T),
    /// The source no longer holds what the caller expected
    Abandon,
}

#[derive(Debug)]
pub(crate) enum Transfer<T> {
    Done(T),
    /// No vacant cell exists anywhere on the grid
    NoDestination,
    Abandoned,
    /// Every attempt lost its destination to another thread
    Contended,
}

/// Locks both cells in position order and hands back (source, destination)
fn lock_pair<'a>(
    source: &'a Cell,
    destination: &'a Cell,
) -> (MutexGuard<'a, CellState>, MutexGuard<'a, CellState>) {
    if source.position() < destination.position() {
        let source_state = source.lock();
        let destination_state = destination.lock();
        (source_state, destination_state)
    } else {
        let destination_state = destination.lock();
        let source_state = source.lock();
        (source_state, destination_state)
    }
}

/// Vacant cell anywhere on the grid, or `source` when there is none
fn vacant_destination(board: &Board, source: Position) -> Position {
    board
        .grid()
        .vacant_position(source, board.config().search.random_samples)
}

/// Runs `commit` with both the source and a destination from `find_destination`
/// locked, retrying when the destination is taken in between
pub(crate) fn transfer<T, S, F>(
    board: &Board,
    source: Position,
    mut find_destination: S,
    mut commit: F,
) -> Transfer<T>
where
    S: FnMut() -> Position,
    F: FnMut(&mut CellState, &mut CellState, Position) -> Commit<T>,
{
    let grid = board.grid();
    let attempts = board.config().search.max_relocation_attempts;
    let source_cell = grid.cell(source);

    for attempt in 1..=attempts {
        if board.is_finished() {
            return Transfer::Abandoned;
        }

        let destination = find_destination();
        if destination == source {
            return Transfer::NoDestination;
        }
        let destination_cell = grid.cell(destination);

        let (mut source_state, mut destination_state) = lock_pair(source_cell, destination_cell);
        let outcome = if destination_state.is_vacant() {
            Some(commit(&mut source_state, &mut destination_state, destination))
        } else {
            None
        };
        drop(destination_state);
        drop(source_state);

        match outcome {
            Some(Commit::Done(value)) => {
                source_cell.notify_vacated();
                return Transfer::Done(value);
            }
            Some(Commit::Abandon) => return Transfer::Abandoned,
            None => trace!(
                "{} was taken before the transfer from {} (attempt {})",
                destination,
                source,
                attempt
            ),
        }
    }

    warn!(
        "Transfer from {} gave up after {} contended attempts",
        source, attempts
    );
    Transfer::Contended
}

/// Captures the goal sitting under `captor`'s head at `at`
///
/// Increments the goal value. Below the cap the goal moves to a random vacant
/// cell; reaching the cap leaves it in place and ends the game.
pub fn capture_goal(board: &Board, captor: SnakeId, at: Position) -> Option<Capture> {
    capture_goal_with(board, captor, at, || vacant_destination(board, at))
}

fn capture_goal_with<S>(
    board: &Board,
    captor: SnakeId,
    at: Position,
    find_destination: S,
) -> Option<Capture>
where
    S: FnMut() -> Position,
{
    let outcome = transfer(board, at, find_destination, |source, destination, to| {
        if !source.has_goal() || source.occupant() != Some(captor) {
            return Commit::Abandon;
        }
        let mut goal = board.goal_lock();
        let credited = goal.capture();
        let value = goal.increment_value();
        if goal.is_maxed() {
            return Commit::Done(Capture {
                credited,
                value,
                relocated_to: None,
                game_over: true,
            });
        }
        if let Some(element) = source.take_goal() {
            destination.put_element(element);
        }
        goal.relocate(to);
        Commit::Done(Capture {
            credited,
            value,
            relocated_to: Some(to),
            game_over: false,
        })
    });

    let capture = match outcome {
        Transfer::Done(capture) => capture,
        // The goal stays under the captor until a later capture moves it
        Transfer::NoDestination | Transfer::Contended => capture_in_place(board, captor, at)?,
        Transfer::Abandoned => return None,
    };

    match capture.relocated_to {
        Some(to) => info!(
            "{} captured goal worth {} at {}, goal {} placed at {}",
            captor, capture.credited, at, capture.value, to
        ),
        None => info!(
            "{} captured goal worth {} at {}, goal stays with value {}",
            captor, capture.credited, at, capture.value
        ),
    }
    board.notify(Change::GoalCaptured {
        snake: captor,
        at,
        credited: capture.credited,
        value: capture.value,
    });
    if capture.game_over {
        board.mark_terminal();
    }
    Some(capture)
}

/// Capture when no vacant cell could be secured for the goal
fn capture_in_place(board: &Board, captor: SnakeId, at: Position) -> Option<Capture> {
    let state = board.grid().cell(at).lock();
    if !state.has_goal() || state.occupant() != Some(captor) {
        return None;
    }
    let mut goal = board.goal_lock();
    let credited = goal.capture();
    let value = goal.increment_value();
    Some(Capture {
        credited,
        value,
        relocated_to: None,
        game_over: goal.is_maxed(),
    })
}

/// Moves `obstacle` to a random vacant cell and spends one of its moves
///
/// Returns the new position and the moves left, or None when the obstacle is
/// retired or could not move.
pub fn relocate_obstacle(board: &Board, obstacle: &Obstacle) -> Option<(Position, u32)> {
    if obstacle.is_retired() {
        return None;
    }
    let source = obstacle.position();
    let find_destination = || vacant_destination(board, source);
    let outcome = transfer(board, source, find_destination, |source_state, destination, to| {
        if !source_state.holds_obstacle(obstacle.id()) {
            return Commit::Abandon;
        }
        let Some(remaining) = obstacle.advance(to) else {
            return Commit::Abandon;
        };
        if let Some(element) = source_state.take_obstacle() {
            destination.put_element(element);
        }
        Commit::Done((to, remaining))
    });

    match outcome {
        Transfer::Done((to, remaining)) => {
            debug!(
                "{} moved {} -> {} ({} moves left)",
                obstacle.id(),
                source,
                to,
                remaining
            );
            board.notify(Change::ObstacleMoved {
                obstacle: obstacle.id(),
                to,
                remaining_moves: remaining,
            });
            Some((to, remaining))
        }
        Transfer::NoDestination => {
            debug!("{} has nowhere to go from {}", obstacle.id(), source);
            None
        }
        Transfer::Abandoned | Transfer::Contended => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::grid::Grid;
    use crate::snake::SnakeKind;
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    fn config(width: i32, height: i32) -> Config {
        let mut config = Config::default_hardcoded();
        config.board.width = width;
        config.board.height = height;
        config.board.num_obstacles = 0;
        config
    }

    /// Distinct occupant per cell of a 2x2 grid, so a guard tells which cell it locks
    fn marker(position: Position) -> SnakeId {
        SnakeId((position.x * 2 + position.y) as u32)
    }

    #[test]
    fn test_lock_pair_cycle_finishes() {
        let grid = Arc::new(Grid::new(2, 2));
        let a = Position::new(0, 0);
        let b = Position::new(0, 1);
        let c = Position::new(1, 0);
        for position in [a, b, c] {
            grid.cell(position).claim(marker(position), || None).unwrap();
        }

        // A cycle of overlapping pairs plus one reversed pair
        let (done_tx, done_rx) = mpsc::channel();
        for (source, destination) in [(a, b), (b, c), (c, a), (b, a)] {
            let grid = Arc::clone(&grid);
            let done_tx = done_tx.clone();
            thread::spawn(move || {
                let mut ordered = true;
                for _ in 0..500 {
                    let (source_state, destination_state) =
                        lock_pair(grid.cell(source), grid.cell(destination));
                    ordered &= source_state.occupant() == Some(marker(source));
                    ordered &= destination_state.occupant() == Some(marker(destination));
                    thread::yield_now();
                }
                done_tx.send(ordered).unwrap();
            });
        }

        for _ in 0..4 {
            let ordered = done_rx
                .recv_timeout(Duration::from_secs(10))
                .expect("cyclic transfers should not deadlock");
            assert!(ordered, "guards must come back as (source, destination)");
        }
    }

    #[test]
    fn test_contended_capture_is_credited_in_place() {
        let mut config = config(3, 3);
        config.search.max_relocation_attempts = 2;
        let board = Board::builder(&config)
            .goal_at(Position::new(1, 1))
            .random_obstacles(0)
            .build();
        let captor = board.add_snake(SnakeKind::Automatic);
        captor.place_at(&board, Position::new(1, 1)).unwrap();
        let blocker = board.add_snake(SnakeKind::Automatic);
        blocker.place_at(&board, Position::new(2, 2)).unwrap();

        // Every search lands on a cell that is taken by the time it is locked
        let capture =
            capture_goal_with(&board, captor.id(), Position::new(1, 1), || Position::new(2, 2))
                .unwrap();
        assert_eq!(capture.credited, 1);
        assert_eq!(capture.value, 2);
        assert_eq!(capture.relocated_to, None);
        assert!(!capture.game_over);

        assert_eq!(board.goal().value(), 2);
        assert_eq!(board.goal_position(), Position::new(1, 1));
        assert!(board.grid().cell(Position::new(1, 1)).has_goal());
        assert!(!board.grid().cell(Position::new(2, 2)).has_goal());
        assert!(!board.is_finished());
    }

    #[test]
    fn test_contended_capture_at_cap_ends_game() {
        let mut config = config(3, 3);
        config.search.max_relocation_attempts = 1;
        config.goal.max_value = 2;
        let board = Board::builder(&config)
            .goal_at(Position::new(0, 0))
            .random_obstacles(0)
            .build();
        let captor = board.add_snake(SnakeKind::Automatic);
        captor.place_at(&board, Position::new(0, 0)).unwrap();
        let blocker = board.add_snake(SnakeKind::Automatic);
        blocker.place_at(&board, Position::new(1, 0)).unwrap();

        let capture =
            capture_goal_with(&board, captor.id(), Position::new(0, 0), || Position::new(1, 0))
                .unwrap();
        assert!(capture.game_over);
        assert_eq!(board.goal().value(), 2);
        assert!(board.is_finished());
    }
}
