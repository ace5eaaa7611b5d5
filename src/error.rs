// Error taxonomy for the movement core
//
// Contention inside a two-cell transfer is retried locally and never shows up
// here. Everything below is reported to the driver, which decides whether to
// re-plan or stop.

use thiserror::Error;

use crate::types::Position;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    /// The caller was woken while blocked on a busy cell
    #[error("interrupted while waiting for cell {0}")]
    Interrupted(Position),
    #[error("game is already over")]
    GameOver,
    /// No legal neighbour exists around the head
    #[error("trapped at {0}")]
    Trapped(Position),
    #[error("{0} is outside the board")]
    OutOfBounds(Position),
    #[error("{0} is part of the snake's own body")]
    OwnBody(Position),
}

impl MoveError {
    /// Whether the driver should give up instead of re-planning
    pub fn is_fatal_for_driver(&self) -> bool {
        matches!(self, MoveError::GameOver | MoveError::Trapped(_))
    }
}
