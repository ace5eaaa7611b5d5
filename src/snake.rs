// Snake agent: an ordered path of claimed cells plus pending growth
//
// The snake is plain data. Whatever drives it (automatic, human or remote)
// hands `move_to` a target cell; the occupancy protocol does the rest.

use log::{debug, info};
use parking_lot::Mutex;
use rand::seq::IndexedRandom;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::board::{Board, Change};
use crate::error::MoveError;
use crate::transaction;
use crate::types::{Position, SnakeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnakeKind {
    Automatic,
    Human,
}

#[derive(Debug, Default)]
struct SnakeState {
    /// Tail at the front, head at the back
    path: VecDeque<Position>,
    growth_pending: u32,
}

/// Outcome of a successful single-step move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub head: Position,
    /// Goal value credited to this snake, if the move captured the goal
    pub captured: Option<u32>,
    /// Tail cell released by this move
    pub vacated: Option<Position>,
}

#[derive(Debug)]
pub struct Snake {
    id: SnakeId,
    kind: SnakeKind,
    size: usize,
    state: Mutex<SnakeState>,
    interrupted: AtomicBool,
}

impl Snake {
    pub(crate) fn new(id: SnakeId, kind: SnakeKind, size: usize) -> Self {
        Snake {
            id,
            kind,
            size,
            state: Mutex::new(SnakeState::default()),
            interrupted: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SnakeId {
        self.id
    }

    pub fn kind(&self) -> SnakeKind {
        self.kind
    }

    /// Length the snake keeps once it has no growth pending
    pub fn size(&self) -> usize {
        self.size
    }

    /// Path from tail to head
    pub fn path(&self) -> Vec<Position> {
        self.state.lock().path.iter().copied().collect()
    }

    pub fn head(&self) -> Option<Position> {
        self.state.lock().path.back().copied()
    }

    pub fn len(&self) -> usize {
        self.state.lock().path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().path.is_empty()
    }

    pub fn growth_pending(&self) -> u32 {
        self.state.lock().growth_pending
    }

    pub fn occupies(&self, position: Position) -> bool {
        self.state.lock().path.contains(&position)
    }

    /// Flags the snake as interrupted. Use `Board::interrupt_snake` to also
    /// wake it if it is blocked on a cell.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    /// Consumes a pending interruption
    pub fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::AcqRel)
    }

    fn abort_reason(&self, board: &Board, waiting_on: Position) -> Option<MoveError> {
        if board.is_finished() {
            Some(MoveError::GameOver)
        } else if self.take_interrupt() {
            Some(MoveError::Interrupted(waiting_on))
        } else {
            None
        }
    }

    /// Claims the snake's first cell: a random free cell of the first column,
    /// or any free cell when that column is full
    pub fn place(&self, board: &Board) -> Result<Position, MoveError> {
        if let Some(head) = self.head() {
            return Ok(head);
        }
        if board.is_finished() {
            return Err(MoveError::GameOver);
        }

        let grid = board.grid();
        let column: Vec<Position> = (0..grid.height())
            .map(|y| Position::new(0, y))
            .filter(|position| grid.cell(*position).is_vacant())
            .collect();
        let start = match column.choose(&mut rand::rng()) {
            Some(position) => *position,
            None => grid
                .find_vacant(board.config().search.random_samples)
                .ok_or(MoveError::Trapped(Position::new(0, 0)))?,
        };

        self.place_at(board, start)
    }

    /// Claims `start` as the snake's first cell
    pub fn place_at(&self, board: &Board, start: Position) -> Result<Position, MoveError> {
        if let Some(head) = self.head() {
            return Ok(head);
        }
        let cell = board
            .grid()
            .get(start)
            .ok_or(MoveError::OutOfBounds(start))?;
        cell.claim(self.id, || self.abort_reason(board, start))?;
        self.state.lock().path.push_back(start);

        info!("{} starting at {}", self.id, start);
        board.notify(Change::SnakeMoved {
            snake: self.id,
            head: start,
        });
        Ok(start)
    }

    /// Moves the head onto `target`
    ///
    /// Blocks while another snake or an obstacle holds the cell. Stepping on
    /// the goal captures it and credits its value as pending growth. The tail
    /// is released unless growth is pending.
    pub fn move_to(&self, board: &Board, target: Position) -> Result<Advance, MoveError> {
        if board.is_finished() {
            return Err(MoveError::GameOver);
        }
        let cell = board
            .grid()
            .get(target)
            .ok_or(MoveError::OutOfBounds(target))?;
        if self.occupies(target) {
            return Err(MoveError::OwnBody(target));
        }

        cell.claim(self.id, || self.abort_reason(board, target))?;
        self.state.lock().path.push_back(target);

        let captured = if cell.has_goal() {
            transaction::capture_goal(board, self.id, target).map(|capture| capture.credited)
        } else {
            None
        };

        let vacated = {
            let mut state = self.state.lock();
            if let Some(value) = captured {
                state.growth_pending += value;
            }
            if state.path.len() > self.size && state.growth_pending == 0 {
                state.path.pop_front()
            } else {
                state.growth_pending = state.growth_pending.saturating_sub(1);
                None
            }
        };
        if let Some(tail) = vacated {
            board.grid().cell(tail).release();
        }

        debug!("{} moved to {}", self.id, target);
        board.notify(Change::SnakeMoved {
            snake: self.id,
            head: target,
        });

        Ok(Advance {
            head: target,
            captured,
            vacated,
        })
    }

    /// Releases every cell of the path. Used when the snake leaves the board.
    pub(crate) fn vacate(&self, board: &Board) {
        let path: Vec<Position> = {
            let mut state = self.state.lock();
            state.growth_pending = 0;
            state.path.drain(..).collect()
        };
        for position in path {
            board.grid().cell(position).release();
        }
    }
}
