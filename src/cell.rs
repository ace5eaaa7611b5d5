// Grid cell with its own monitor
//
// Each cell owns a mutex over its mutable state and a condition variable that
// is signalled whenever the cell may have become free. No two cells share a
// lock, and a thread never blocks on a cell while holding another cell's
// lock except inside the ordered two-cell transfer.

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;

use crate::error::MoveError;
use crate::types::{ObstacleId, Position, SnakeId};

/// Board-owned element that can sit in a cell
///
/// A goal never blocks passage. An obstacle always does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Element {
    Goal,
    Obstacle { id: ObstacleId },
}

impl Element {
    pub fn is_goal(&self) -> bool {
        matches!(self, Element::Goal)
    }

    pub fn obstacle_id(&self) -> Option<ObstacleId> {
        match self {
            Element::Obstacle { id } => Some(*id),
            Element::Goal => None,
        }
    }
}

/// Mutable part of a cell, only reachable through the cell's lock
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CellState {
    occupant: Option<SnakeId>,
    element: Option<Element>,
}

impl CellState {
    pub fn occupant(&self) -> Option<SnakeId> {
        self.occupant
    }

    pub fn element(&self) -> Option<Element> {
        self.element
    }

    /// Occupied means a snake holds the cell or an obstacle sits in it
    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some() || matches!(self.element, Some(Element::Obstacle { .. }))
    }

    /// Nothing at all in the cell, so an element may be dropped here
    pub fn is_vacant(&self) -> bool {
        self.occupant.is_none() && self.element.is_none()
    }

    pub fn has_goal(&self) -> bool {
        matches!(self.element, Some(Element::Goal))
    }

    pub fn holds_obstacle(&self, id: ObstacleId) -> bool {
        self.element == Some(Element::Obstacle { id })
    }

    pub(crate) fn take_goal(&mut self) -> Option<Element> {
        if self.has_goal() {
            self.element.take()
        } else {
            None
        }
    }

    pub(crate) fn take_obstacle(&mut self) -> Option<Element> {
        if matches!(self.element, Some(Element::Obstacle { .. })) {
            self.element.take()
        } else {
            None
        }
    }

    /// Callers check `is_vacant` first; an element is never overwritten
    pub(crate) fn put_element(&mut self, element: Element) -> bool {
        if self.element.is_some() {
            return false;
        }
        self.element = Some(element);
        true
    }
}

#[derive(Debug)]
pub struct Cell {
    position: Position,
    state: Mutex<CellState>,
    vacated: Condvar,
}

impl Cell {
    pub fn new(position: Position) -> Self {
        Cell {
            position,
            state: Mutex::new(CellState::default()),
            vacated: Condvar::new(),
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Blocks until the cell is unoccupied, then records `snake` as its occupant
    ///
    /// `abort` is consulted every time the waiter is about to sleep or wakes
    /// up. Returning `Some` abandons the claim with that error.
    pub fn claim<F>(&self, snake: SnakeId, mut abort: F) -> Result<(), MoveError>
    where
        F: FnMut() -> Option<MoveError>,
    {
        let mut state = self.state.lock();
        while state.is_occupied() {
            if let Some(reason) = abort() {
                return Err(reason);
            }
            self.vacated.wait(&mut state);
        }
        state.occupant = Some(snake);
        Ok(())
    }

    /// Clears the occupant and wakes every waiter. Returns the previous occupant.
    pub fn release(&self) -> Option<SnakeId> {
        let previous = {
            let mut state = self.state.lock();
            state.occupant.take()
        };
        self.vacated.notify_all();
        previous
    }

    /// Blocks until nothing occupies the cell and its element slot is empty,
    /// then stores `element`
    ///
    /// Unlike `claim`, a goal also blocks here: a cell carries at most one
    /// element, so a goal and an obstacle never share it.
    pub fn place_element<F>(&self, element: Element, mut abort: F) -> Result<(), MoveError>
    where
        F: FnMut() -> Option<MoveError>,
    {
        let mut state = self.state.lock();
        while !state.is_vacant() {
            if let Some(reason) = abort() {
                return Err(reason);
            }
            self.vacated.wait(&mut state);
        }
        state.element = Some(element);
        Ok(())
    }

    /// Non-blocking placement used during board setup
    pub fn try_place_element(&self, element: Element) -> bool {
        let mut state = self.state.lock();
        if !state.is_vacant() {
            return false;
        }
        state.put_element(element)
    }

    /// Removes the goal if this cell holds it. No-op otherwise.
    pub fn remove_goal(&self) -> Option<Element> {
        let removed = self.state.lock().take_goal();
        if removed.is_some() {
            self.vacated.notify_all();
        }
        removed
    }

    /// Removes an obstacle if this cell holds one. No-op otherwise.
    pub fn remove_obstacle(&self) -> Option<Element> {
        let removed = self.state.lock().take_obstacle();
        if removed.is_some() {
            self.vacated.notify_all();
        }
        removed
    }

    pub fn is_occupied(&self) -> bool {
        self.state.lock().is_occupied()
    }

    pub fn is_vacant(&self) -> bool {
        self.state.lock().is_vacant()
    }

    pub fn has_goal(&self) -> bool {
        self.state.lock().has_goal()
    }

    pub fn occupant(&self) -> Option<SnakeId> {
        self.state.lock().occupant
    }

    pub fn element(&self) -> Option<Element> {
        self.state.lock().element
    }

    /// Copy of the current state, taken under the lock
    pub fn state(&self) -> CellState {
        *self.state.lock()
    }

    /// Wakes every waiter so it can re-check its abort condition.
    ///
    /// The lock is taken first: a waiter that already checked its abort
    /// condition is guaranteed to be parked before the notification lands.
    pub fn wake(&self) {
        let _state = self.state.lock();
        self.vacated.notify_all();
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CellState> {
        self.state.lock()
    }

    pub(crate) fn notify_vacated(&self) {
        self.vacated.notify_all();
    }
}
