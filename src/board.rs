// Board orchestrator
//
// Owns the grid, the goal and the snake/obstacle collections, arbitrates
// element placement and the one-way transition to game over. Collections are
// only mutated when snakes join or leave; per-tick movement goes through the
// cells.

use log::{info, warn};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cell::Element;
use crate::config::Config;
use crate::entities::{Goal, Obstacle};
use crate::grid::Grid;
use crate::snake::{Snake, SnakeKind};
use crate::snapshot::BoardSnapshot;
use crate::types::{ObstacleId, Position, SnakeId};

/// What just happened on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    SnakeMoved {
        snake: SnakeId,
        head: Position,
    },
    SnakeRemoved {
        snake: SnakeId,
    },
    GoalCaptured {
        snake: SnakeId,
        at: Position,
        credited: u32,
        value: u32,
    },
    ObstacleMoved {
        obstacle: ObstacleId,
        to: Position,
        remaining_moves: u32,
    },
    GameOver,
}

/// Change callback. Never invoked while a cell lock is held.
pub type Observer = Arc<dyn Fn(&Board, Change) + Send + Sync>;

pub struct Board {
    config: Config,
    grid: Grid,
    goal: Mutex<Goal>,
    snakes: RwLock<Vec<Arc<Snake>>>,
    obstacles: RwLock<Vec<Arc<Obstacle>>>,
    next_snake_id: AtomicU32,
    finished: AtomicBool,
    finish_lock: Mutex<()>,
    finish_signal: Condvar,
    observer: Option<Observer>,
}

impl Board {
    pub fn builder(config: &Config) -> BoardBuilder {
        BoardBuilder::new(config)
    }

    /// Board populated from `config` alone
    pub fn new(config: &Config) -> Arc<Board> {
        BoardBuilder::new(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn goal(&self) -> Goal {
        *self.goal.lock()
    }

    pub fn goal_position(&self) -> Position {
        self.goal.lock().position()
    }

    /// Only taken while the goal's cell lock is already held
    pub(crate) fn goal_lock(&self) -> MutexGuard<'_, Goal> {
        self.goal.lock()
    }

    pub fn snakes(&self) -> Vec<Arc<Snake>> {
        self.snakes.read().clone()
    }

    pub fn snake(&self, id: SnakeId) -> Option<Arc<Snake>> {
        self.snakes.read().iter().find(|s| s.id() == id).cloned()
    }

    pub fn obstacles(&self) -> Vec<Arc<Obstacle>> {
        self.obstacles.read().clone()
    }

    pub fn obstacle(&self, id: ObstacleId) -> Option<Arc<Obstacle>> {
        self.obstacles.read().iter().find(|o| o.id() == id).cloned()
    }

    /// Registers a new, not yet placed snake
    pub fn add_snake(&self, kind: SnakeKind) -> Arc<Snake> {
        let id = SnakeId(self.next_snake_id.fetch_add(1, Ordering::Relaxed));
        let snake = Arc::new(Snake::new(id, kind, self.config.board.snake_size));
        self.snakes.write().push(snake.clone());
        snake
    }

    /// Takes a snake off the board and releases every cell it held
    pub fn remove_snake(&self, id: SnakeId) -> Option<Arc<Snake>> {
        let removed = {
            let mut snakes = self.snakes.write();
            let index = snakes.iter().position(|s| s.id() == id)?;
            snakes.remove(index)
        };
        removed.vacate(self);
        info!("{} left the board", id);
        self.notify(Change::SnakeRemoved { snake: id });
        Some(removed)
    }

    /// Drops `element` on a random vacant cell, avoiding snakes, obstacles
    /// and the goal. Returns None only when no vacant cell is left.
    pub fn add_element(&self, element: Element) -> Option<Position> {
        let samples = self.config.search.random_samples;
        loop {
            let position = self.grid.find_vacant(samples)?;
            if self.grid.cell(position).try_place_element(element) {
                if element.is_goal() {
                    self.goal.lock().relocate(position);
                    info!("Goal {} placed at {}", self.goal().value(), position);
                }
                return Some(position);
            }
        }
    }

    /// Flags the snake as interrupted and wakes it if it is blocked on a cell
    pub fn interrupt_snake(&self, id: SnakeId) -> bool {
        match self.snake(id) {
            Some(snake) => {
                snake.interrupt();
                self.grid.wake_all();
                true
            }
            None => false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Ends the game. Only the first call has any effect.
    ///
    /// Wakes every waiter on every cell and every paused driver so they
    /// observe the flag. Must not be called while holding a cell lock.
    pub fn mark_terminal(&self) -> bool {
        if self.finished.swap(true, Ordering::AcqRel) {
            return false;
        }
        info!("Game over, goal value {}", self.goal().value());

        self.grid.wake_all();
        {
            let _guard = self.finish_lock.lock();
            self.finish_signal.notify_all();
        }
        self.notify(Change::GameOver);
        true
    }

    /// Sleeps for `duration`, cut short by game over.
    /// Returns true if the game is still running afterwards.
    pub fn pause(&self, duration: Duration) -> bool {
        !self.wait_finished(Some(duration))
    }

    /// Blocks until the game is over or `timeout` elapses. Returns the flag.
    pub fn wait_finished(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.finish_lock.lock();
        while !self.is_finished() {
            match deadline {
                Some(deadline) => {
                    if self.finish_signal.wait_until(&mut guard, deadline).timed_out() {
                        break;
                    }
                }
                None => self.finish_signal.wait(&mut guard),
            }
        }
        self.is_finished()
    }

    pub fn notify(&self, change: Change) {
        if let Some(observer) = &self.observer {
            observer(self, change);
        }
    }

    /// Weakly consistent copy of the whole board
    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot::capture(self)
    }
}

/// Sets up a board: explicit placements first, random ones after
pub struct BoardBuilder {
    config: Config,
    goal_at: Option<Position>,
    obstacles_at: Vec<Position>,
    random_obstacles: Option<usize>,
    observer: Option<Observer>,
}

impl BoardBuilder {
    pub fn new(config: &Config) -> Self {
        BoardBuilder {
            config: config.clone(),
            goal_at: None,
            obstacles_at: Vec::new(),
            random_obstacles: None,
            observer: None,
        }
    }

    pub fn goal_at(mut self, position: Position) -> Self {
        self.goal_at = Some(position);
        self
    }

    pub fn obstacle_at(mut self, position: Position) -> Self {
        self.obstacles_at.push(position);
        self
    }

    /// Number of randomly placed obstacles. Defaults to the configured count
    /// when no obstacle is placed explicitly, zero otherwise.
    pub fn random_obstacles(mut self, count: usize) -> Self {
        self.random_obstacles = Some(count);
        self
    }

    pub fn observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Board, Change) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn build(self) -> Arc<Board> {
        let config = self.config;
        let goal = Goal::new(
            Position::new(0, 0),
            config.goal.initial_value,
            config.goal.max_value,
        );
        let board = Board {
            grid: Grid::new(config.board.width, config.board.height),
            goal: Mutex::new(goal),
            snakes: RwLock::new(Vec::new()),
            obstacles: RwLock::new(Vec::new()),
            next_snake_id: AtomicU32::new(0),
            finished: AtomicBool::new(false),
            finish_lock: Mutex::new(()),
            finish_signal: Condvar::new(),
            observer: self.observer,
            config,
        };

        let moves = board.config.obstacles.moves_per_obstacle;
        let mut obstacles = Vec::new();
        let mut next_id = 0;
        for position in self.obstacles_at {
            let id = ObstacleId(next_id);
            let placed = board
                .grid
                .get(position)
                .is_some_and(|cell| cell.try_place_element(Element::Obstacle { id }));
            if placed {
                obstacles.push(Arc::new(Obstacle::new(id, position, moves)));
                next_id += 1;
            } else {
                warn!("Cannot place obstacle at {}, skipping", position);
            }
        }

        let random = self.random_obstacles.unwrap_or(if obstacles.is_empty() {
            board.config.board.num_obstacles
        } else {
            0
        });
        for _ in 0..random {
            let id = ObstacleId(next_id);
            match board.add_element(Element::Obstacle { id }) {
                Some(position) => {
                    obstacles.push(Arc::new(Obstacle::new(id, position, moves)));
                    next_id += 1;
                }
                None => {
                    warn!("Board is full after {} obstacles", obstacles.len());
                    break;
                }
            }
        }
        *board.obstacles.write() = obstacles;

        let explicit_goal = self.goal_at.filter(|position| {
            board
                .grid
                .get(*position)
                .is_some_and(|cell| cell.try_place_element(Element::Goal))
        });
        match explicit_goal {
            Some(position) => {
                board.goal.lock().relocate(position);
                info!("Goal {} placed at {}", board.goal().value(), position);
            }
            None => {
                if board.add_element(Element::Goal).is_none() {
                    warn!("No room left for the goal");
                }
            }
        }

        info!(
            "Board {}x{} ready with {} obstacles",
            board.grid.width(),
            board.grid.height(),
            board.obstacles.read().len()
        );
        Arc::new(board)
    }
}
