// Board-owned mobile elements: the goal and the obstacles
//
// Their cell membership is recorded in the cells themselves (`Element`);
// these types carry the counters and the cached position. Both are only
// mutated inside a two-cell transfer, with both cell locks held.

use parking_lot::Mutex;
use serde::Serialize;

use crate::types::{ObstacleId, Position};

/// The single goal. Its value grows by one on every capture, up to `max_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Goal {
    position: Position,
    value: u32,
    max_value: u32,
}

impl Goal {
    pub fn new(position: Position, initial_value: u32, max_value: u32) -> Self {
        Goal {
            position,
            value: initial_value.min(max_value),
            max_value,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn max_value(&self) -> u32 {
        self.max_value
    }

    /// Value credited to the capturing snake
    pub fn capture(&self) -> u32 {
        self.value
    }

    /// Increments the value by one, saturating at the cap. Returns the new value.
    pub fn increment_value(&mut self) -> u32 {
        if self.value < self.max_value {
            self.value += 1;
        }
        self.value
    }

    pub fn is_maxed(&self) -> bool {
        self.value >= self.max_value
    }

    pub(crate) fn relocate(&mut self, to: Position) {
        self.position = to;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ObstacleState {
    pub position: Position,
    pub remaining_moves: u32,
}

/// A mobile obstacle. Once its move budget is spent it stays put, still blocking its cell.
#[derive(Debug)]
pub struct Obstacle {
    id: ObstacleId,
    state: Mutex<ObstacleState>,
}

impl Obstacle {
    pub fn new(id: ObstacleId, position: Position, moves: u32) -> Self {
        Obstacle {
            id,
            state: Mutex::new(ObstacleState {
                position,
                remaining_moves: moves,
            }),
        }
    }

    pub fn id(&self) -> ObstacleId {
        self.id
    }

    pub fn position(&self) -> Position {
        self.state.lock().position
    }

    pub fn remaining_moves(&self) -> u32 {
        self.state.lock().remaining_moves
    }

    pub fn is_retired(&self) -> bool {
        self.remaining_moves() == 0
    }

    pub fn state(&self) -> ObstacleState {
        *self.state.lock()
    }

    /// Records a relocation to `to` and spends one move.
    ///
    /// Returns the moves left afterwards, or None (and changes nothing) if
    /// the obstacle is already retired.
    pub(crate) fn advance(&self, to: Position) -> Option<u32> {
        let mut state = self.state.lock();
        if state.remaining_moves == 0 {
            return None;
        }
        state.position = to;
        state.remaining_moves -= 1;
        Some(state.remaining_moves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_value_saturates_at_cap() {
        let mut goal = Goal::new(Position::new(0, 0), 1, 3);
        assert_eq!(goal.capture(), 1);
        assert_eq!(goal.increment_value(), 2);
        assert!(!goal.is_maxed());
        assert_eq!(goal.increment_value(), 3);
        assert!(goal.is_maxed());
        assert_eq!(goal.increment_value(), 3);
    }

    #[test]
    fn test_goal_initial_value_is_clamped() {
        let goal = Goal::new(Position::new(1, 1), 12, 10);
        assert_eq!(goal.value(), 10);
        assert!(goal.is_maxed());
    }

    #[test]
    fn test_obstacle_stops_at_zero_moves() {
        let obstacle = Obstacle::new(ObstacleId(0), Position::new(0, 0), 2);
        assert_eq!(obstacle.advance(Position::new(1, 0)), Some(1));
        assert_eq!(obstacle.advance(Position::new(2, 0)), Some(0));
        assert!(obstacle.is_retired());

        assert_eq!(obstacle.advance(Position::new(3, 0)), None);
        assert_eq!(obstacle.position(), Position::new(2, 0));
    }
}
