// Core board types shared by every module
// Positions double as lock-ordering keys, so their ordering must stay total.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 2D coordinate on the board
///
/// Ordered by `x` first, then `y`. Every multi-cell operation acquires cell
/// locks in this order.
#[derive(
    Deserialize, Serialize, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash,
)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Position { x, y }
    }

    /// Euclidean distance, used by the greedy goal chaser
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        (dx * dx + dy * dy).sqrt()
    }

    /// The position one step away in `direction`. May fall outside the board.
    pub fn step(&self, direction: Direction) -> Position {
        direction.apply(self)
    }

    pub fn is_adjacent(&self, other: &Position) -> bool {
        (self.x - other.x).abs() + (self.y - other.y).abs() == 1
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Represents the four possible movement directions for a snake
///
/// `Up` decreases `y`: row 0 is the top of the board.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Returns all possible directions
    pub fn all() -> [Direction; 4] {
        [Direction::Up, Direction::Down, Direction::Left, Direction::Right]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }

    /// Calculates the next position when moving in this direction
    pub fn apply(&self, position: &Position) -> Position {
        match self {
            Direction::Up => Position { x: position.x, y: position.y - 1 },
            Direction::Down => Position { x: position.x, y: position.y + 1 },
            Direction::Left => Position { x: position.x - 1, y: position.y },
            Direction::Right => Position { x: position.x + 1, y: position.y },
        }
    }

    pub fn parse(s: &str) -> Option<Direction> {
        match s.trim().to_lowercase().as_str() {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            _ => None,
        }
    }
}

/// Stable snake identifier, assigned by the board
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnakeId(pub u32);

impl fmt::Display for SnakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "snake-{}", self.0)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObstacleId(pub u32);

impl fmt::Display for ObstacleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obstacle-{}", self.0)
    }
}
