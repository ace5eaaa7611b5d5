// Fixed-size grid of independently lockable cells
//
// Free-cell searches only take one cell lock at a time, so their answers are
// a best-effort snapshot. Callers secure a position with `Cell::claim` or the
// two-cell transfer and must tolerate losing the race.

use rand::seq::IndexedRandom;
use rand::Rng;
use rayon::prelude::*;

use crate::cell::{Cell, CellState};
use crate::types::{Direction, Position};

#[derive(Debug)]
pub struct Grid {
    width: i32,
    height: i32,
    /// Column-major: index = x * height + y
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(width: i32, height: i32) -> Self {
        let mut cells = Vec::with_capacity((width.max(0) * height.max(0)) as usize);
        for x in 0..width {
            for y in 0..height {
                cells.push(Cell::new(Position::new(x, y)));
            }
        }
        Grid { width, height, cells }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn contains(&self, position: Position) -> bool {
        position.x >= 0 && position.x < self.width && position.y >= 0 && position.y < self.height
    }

    pub fn get(&self, position: Position) -> Option<&Cell> {
        if self.contains(position) {
            Some(&self.cells[self.index(position)])
        } else {
            None
        }
    }

    /// Panics when `position` is off the board. Use `get` for unchecked input.
    pub fn cell(&self, position: Position) -> &Cell {
        &self.cells[self.index(position)]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    fn index(&self, position: Position) -> usize {
        debug_assert!(self.contains(position), "{} is off the board", position);
        (position.x * self.height + position.y) as usize
    }

    /// In-bounds orthogonal neighbours (left, right, up, down)
    pub fn neighbours(&self, position: Position) -> Vec<Position> {
        [Direction::Left, Direction::Right, Direction::Up, Direction::Down]
            .iter()
            .map(|dir| dir.apply(&position))
            .filter(|next| self.contains(*next))
            .collect()
    }

    /// The neighbour in `direction`, or None at the board edge
    pub fn step(&self, position: Position, direction: Direction) -> Option<Position> {
        let next = position.step(direction);
        self.contains(next).then_some(next)
    }

    pub fn random_position(&self) -> Position {
        let mut rng = rand::rng();
        Position::new(
            rng.random_range(0..self.width),
            rng.random_range(0..self.height),
        )
    }

    /// A position no snake or obstacle occupies. Goal cells count as free.
    ///
    /// Returns `origin` when the whole grid is occupied.
    pub fn unoccupied_position(&self, origin: Position, samples: usize) -> Position {
        self.find_unoccupied(samples).unwrap_or(origin)
    }

    pub fn find_unoccupied(&self, samples: usize) -> Option<Position> {
        self.find_free(samples, |state| !state.is_occupied())
    }

    /// A position with neither an occupant nor an element, suitable as a
    /// destination for a goal or obstacle. Returns `origin` when none exists.
    pub fn vacant_position(&self, origin: Position, samples: usize) -> Position {
        self.find_vacant(samples).unwrap_or(origin)
    }

    pub fn find_vacant(&self, samples: usize) -> Option<Position> {
        self.find_free(samples, CellState::is_vacant)
    }

    /// Random probing first, then a full scan with a uniform pick
    fn find_free<F>(&self, samples: usize, accept: F) -> Option<Position>
    where
        F: Fn(&CellState) -> bool + Sync,
    {
        for _ in 0..samples {
            let candidate = self.random_position();
            if accept(&self.cell(candidate).state()) {
                return Some(candidate);
            }
        }

        let free = self.free_positions(&accept);
        free.choose(&mut rand::rng()).copied()
    }

    /// Exhaustive scan of every cell matching `accept`
    pub fn free_positions<F>(&self, accept: F) -> Vec<Position>
    where
        F: Fn(&CellState) -> bool + Sync,
    {
        self.cells
            .par_iter()
            .filter(|cell| accept(&cell.state()))
            .map(Cell::position)
            .collect()
    }

    /// Wakes every waiter on every cell, one lock at a time
    pub fn wake_all(&self) {
        for cell in &self.cells {
            cell.wake();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Element;
    use crate::types::{ObstacleId, SnakeId};

    #[test]
    fn test_cells_keep_their_positions() {
        let grid = Grid::new(4, 3);
        assert_eq!(grid.cells().len(), 12);
        for x in 0..4 {
            for y in 0..3 {
                let position = Position::new(x, y);
                assert_eq!(grid.cell(position).position(), position);
            }
        }
        assert!(grid.get(Position::new(4, 0)).is_none());
        assert!(grid.get(Position::new(0, -1)).is_none());
    }

    #[test]
    fn test_corner_has_two_neighbours() {
        let grid = Grid::new(5, 5);
        let mut corner = grid.neighbours(Position::new(0, 0));
        corner.sort();
        assert_eq!(corner, vec![Position::new(0, 1), Position::new(1, 0)]);
        assert_eq!(grid.neighbours(Position::new(2, 2)).len(), 4);
    }

    #[test]
    fn test_step_respects_bounds() {
        let grid = Grid::new(3, 3);
        assert_eq!(grid.step(Position::new(0, 0), Direction::Up), None);
        assert_eq!(
            grid.step(Position::new(0, 0), Direction::Down),
            Some(Position::new(0, 1))
        );
    }

    #[test]
    fn test_full_grid_returns_origin() {
        let grid = Grid::new(3, 2);
        for (i, cell) in grid.cells().iter().enumerate() {
            cell.claim(SnakeId(i as u32), || None).unwrap();
        }
        let origin = Position::new(1, 1);
        assert_eq!(grid.unoccupied_position(origin, 10), origin);
        assert_eq!(grid.vacant_position(origin, 10), origin);
    }

    #[test]
    fn test_single_free_cell_is_found_by_scan() {
        let grid = Grid::new(3, 3);
        let free = Position::new(2, 1);
        for cell in grid.cells() {
            if cell.position() != free {
                assert!(cell.try_place_element(Element::Obstacle { id: ObstacleId(0) }));
            }
        }
        // zero samples forces the exhaustive path
        assert_eq!(grid.unoccupied_position(Position::new(0, 0), 0), free);
        assert_eq!(grid.vacant_position(Position::new(0, 0), 3), free);
    }

    #[test]
    fn test_goal_cell_is_unoccupied_but_not_vacant() {
        let grid = Grid::new(1, 2);
        grid.cell(Position::new(0, 0)).claim(SnakeId(1), || None).unwrap();
        assert!(grid.cell(Position::new(0, 1)).try_place_element(Element::Goal));

        let origin = Position::new(0, 0);
        assert_eq!(grid.unoccupied_position(origin, 5), Position::new(0, 1));
        assert_eq!(grid.vacant_position(origin, 5), origin);
    }
}
