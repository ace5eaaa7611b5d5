// Immutable board copies for renderers and broadcasters
//
// Each cell is read under its own lock, one at a time, so a snapshot taken
// while drivers run is only weakly consistent.

use serde::Serialize;

use crate::board::Board;
use crate::cell::Element;
use crate::entities::Goal;
use crate::snake::SnakeKind;
use crate::types::{ObstacleId, Position, SnakeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellSnapshot {
    pub position: Position,
    pub occupant: Option<SnakeId>,
    pub element: Option<Element>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnakeSnapshot {
    pub id: SnakeId,
    pub kind: SnakeKind,
    /// Tail first
    pub path: Vec<Position>,
    pub growth_pending: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObstacleSnapshot {
    pub id: ObstacleId,
    pub position: Position,
    pub remaining_moves: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardSnapshot {
    pub width: i32,
    pub height: i32,
    /// Non-empty cells only
    pub cells: Vec<CellSnapshot>,
    pub snakes: Vec<SnakeSnapshot>,
    pub obstacles: Vec<ObstacleSnapshot>,
    pub goal: Goal,
    pub finished: bool,
}

impl BoardSnapshot {
    pub(crate) fn capture(board: &Board) -> Self {
        let grid = board.grid();
        let cells = grid
            .cells()
            .iter()
            .filter_map(|cell| {
                let state = cell.state();
                if state.occupant().is_none() && state.element().is_none() {
                    return None;
                }
                Some(CellSnapshot {
                    position: cell.position(),
                    occupant: state.occupant(),
                    element: state.element(),
                })
            })
            .collect();

        let snakes = board
            .snakes()
            .iter()
            .map(|snake| SnakeSnapshot {
                id: snake.id(),
                kind: snake.kind(),
                path: snake.path(),
                growth_pending: snake.growth_pending(),
            })
            .collect();

        let obstacles = board
            .obstacles()
            .iter()
            .map(|obstacle| {
                let state = obstacle.state();
                ObstacleSnapshot {
                    id: obstacle.id(),
                    position: state.position,
                    remaining_moves: state.remaining_moves,
                }
            })
            .collect();

        BoardSnapshot {
            width: grid.width(),
            height: grid.height(),
            cells,
            snakes,
            obstacles,
            goal: board.goal(),
            finished: board.is_finished(),
        }
    }

    pub fn cell(&self, position: Position) -> Option<&CellSnapshot> {
        self.cells.iter().find(|c| c.position == position)
    }

    pub fn snake(&self, id: SnakeId) -> Option<&SnakeSnapshot> {
        self.snakes.iter().find(|s| s.id == id)
    }

    /// Text rendering, one row per line: `.` empty, `#` obstacle, `G` goal,
    /// and the last digit of the snake id for snake cells
    pub fn render_ascii(&self) -> String {
        let mut rows = vec![vec!['.'; self.width.max(0) as usize]; self.height.max(0) as usize];
        for cell in &self.cells {
            let glyph = match (cell.occupant, cell.element) {
                (Some(SnakeId(id)), _) => char::from_digit(id % 10, 10).unwrap_or('S'),
                (None, Some(Element::Obstacle { .. })) => '#',
                (None, Some(Element::Goal)) => 'G',
                (None, None) => '.',
            };
            rows[cell.position.y as usize][cell.position.x as usize] = glyph;
        }
        rows.into_iter()
            .map(|row| row.into_iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
