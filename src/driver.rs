// Drivers: the threads of control that move snakes and obstacles
//
// A snake is plain data; a `Controller` decides where it goes next and the
// driver loop turns that into `Snake::move_to` calls. Snake drivers get a
// thread each. Obstacle drivers share a fixed-size rayon pool, so only a
// few obstacles move at the same time.

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::board::Board;
use crate::cell::Element;
use crate::config::Config;
use crate::entities::Obstacle;
use crate::error::MoveError;
use crate::snake::{Snake, SnakeKind};
use crate::transaction;
use crate::types::{Direction, Position, SnakeId};

/// Where a controller wants the snake to go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// A specific neighbouring cell
    Toward(Position),
    /// One step from the head; checked against the board bounds
    Step(Direction),
}

/// Decides the next move of one snake
pub trait Controller: Send {
    fn next_move(&mut self, board: &Board, snake: &Snake) -> Option<Intent>;

    /// Called after the snake was interrupted, before the next plan
    fn interrupted(&mut self) {}

    fn is_trapped(&self, _board: &Board, _snake: &Snake) -> bool {
        false
    }

    /// The controlling party is gone; the snake should leave the board
    fn is_detached(&self) -> bool {
        false
    }
}

/// Greedy goal chaser
///
/// Steps to the free neighbour closest (Euclidean) to the goal. After an
/// interruption it takes one random step instead.
#[derive(Debug, Default)]
pub struct AutomaticController {
    wander_next: bool,
}

impl AutomaticController {
    pub fn new() -> Self {
        AutomaticController::default()
    }

    /// Neighbour of the head closest to the goal, skipping the snake's own
    /// body and retired obstacles
    pub fn toward_goal(board: &Board, snake: &Snake) -> Option<Position> {
        let head = snake.head()?;
        let goal = board.goal_position();
        board
            .grid()
            .neighbours(head)
            .into_iter()
            .filter(|position| !snake.occupies(*position) && !is_wall(board, *position))
            .min_by(|a, b| a.distance_to(&goal).total_cmp(&b.distance_to(&goal)))
    }

    /// Uniformly random unoccupied neighbour of the head
    pub fn random_neighbour(board: &Board, snake: &Snake) -> Option<Position> {
        let head = snake.head()?;
        let free: Vec<Position> = board
            .grid()
            .neighbours(head)
            .into_iter()
            .filter(|position| !board.grid().cell(*position).is_occupied())
            .collect();
        free.choose(&mut rand::rng()).copied()
    }

    /// Every neighbour is either the snake's own body or a retired obstacle
    pub fn trapped(board: &Board, snake: &Snake) -> bool {
        let Some(head) = snake.head() else {
            return false;
        };
        board
            .grid()
            .neighbours(head)
            .into_iter()
            .all(|position| snake.occupies(position) || is_wall(board, position))
    }
}

/// A retired obstacle never moves again
fn is_wall(board: &Board, position: Position) -> bool {
    match board.grid().cell(position).element() {
        Some(Element::Obstacle { id }) => board
            .obstacle(id)
            .map_or(false, |obstacle| obstacle.is_retired()),
        _ => false,
    }
}

impl Controller for AutomaticController {
    fn next_move(&mut self, board: &Board, snake: &Snake) -> Option<Intent> {
        let target = if self.wander_next {
            self.wander_next = false;
            Self::random_neighbour(board, snake)
        } else {
            Self::toward_goal(board, snake)
        };
        target.map(Intent::Toward)
    }

    fn interrupted(&mut self) {
        self.wander_next = true;
    }

    fn is_trapped(&self, board: &Board, snake: &Snake) -> bool {
        Self::trapped(board, snake)
    }
}

/// Direction feed for a human or remote player
#[derive(Debug, Default)]
pub struct DirectionInput {
    direction: Mutex<Option<Direction>>,
    detached: AtomicBool,
}

impl DirectionInput {
    pub fn new() -> Self {
        DirectionInput::default()
    }

    pub fn set_direction(&self, direction: Direction) {
        *self.direction.lock() = Some(direction);
    }

    /// Stop moving until the next direction arrives
    pub fn clear(&self) {
        *self.direction.lock() = None;
    }

    pub fn direction(&self) -> Option<Direction> {
        *self.direction.lock()
    }

    pub fn disconnect(&self) {
        self.detached.store(true, Ordering::Release);
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }
}

/// Moves one step per tick in the direction last set on its input
#[derive(Debug)]
pub struct HumanController {
    input: Arc<DirectionInput>,
}

impl HumanController {
    pub fn new(input: Arc<DirectionInput>) -> Self {
        HumanController { input }
    }
}

impl Controller for HumanController {
    fn next_move(&mut self, _board: &Board, _snake: &Snake) -> Option<Intent> {
        self.input.direction().map(Intent::Step)
    }

    fn is_detached(&self) -> bool {
        self.input.is_detached()
    }
}

/// Counts running drivers so shutdown can wait for them
#[derive(Debug, Default)]
struct DriverGroup {
    active: Mutex<usize>,
    idle: Condvar,
}

impl DriverGroup {
    fn enter(self: &Arc<Self>) -> DriverGuard {
        *self.active.lock() += 1;
        DriverGuard {
            group: Arc::clone(self),
        }
    }

    fn active(&self) -> usize {
        *self.active.lock()
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut active = self.active.lock();
        while *active > 0 {
            if self.idle.wait_until(&mut active, deadline).timed_out() {
                break;
            }
        }
        *active == 0
    }
}

/// Held by a driver for as long as it runs
struct DriverGuard {
    group: Arc<DriverGroup>,
}

impl Drop for DriverGuard {
    fn drop(&mut self) {
        let mut active = self.group.active.lock();
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.group.idle.notify_all();
        }
    }
}

fn run_snake(
    board: Arc<Board>,
    snake: Arc<Snake>,
    mut controller: Box<dyn Controller>,
    startup_delay: Duration,
    _guard: DriverGuard,
) {
    let id = snake.id();
    let interval = board.config().timing.player_interval();

    match snake.place(&board) {
        Ok(_) => {}
        Err(e) => {
            warn!("{} could not be placed: {}", id, e);
            if controller.is_detached() {
                board.remove_snake(id);
            }
            return;
        }
    }

    if board.pause(startup_delay) {
        loop {
            if controller.is_detached() || !board.pause(interval) || controller.is_detached() {
                break;
            }
            if snake.take_interrupt() {
                controller.interrupted();
            }
            if controller.is_trapped(&board, &snake) {
                let head = snake.head().unwrap_or(Position::new(0, 0));
                warn!("{}", MoveError::Trapped(head));
                break;
            }

            let target = match controller.next_move(&board, &snake) {
                Some(Intent::Toward(position)) => position,
                Some(Intent::Step(direction)) => {
                    match snake.head().and_then(|head| board.grid().step(head, direction)) {
                        Some(position) => position,
                        None => continue,
                    }
                }
                None => continue,
            };

            match snake.move_to(&board, target) {
                Ok(_) => {}
                Err(MoveError::Interrupted(at)) => {
                    debug!("{} interrupted while waiting for {}", id, at);
                    controller.interrupted();
                }
                Err(e) if e.is_fatal_for_driver() => break,
                Err(e) => debug!("{} skipped a move: {}", id, e),
            }
        }
    }

    if controller.is_detached() {
        board.remove_snake(id);
    }
    info!("{} driver exiting", id);
}

fn run_obstacle(
    board: Arc<Board>,
    obstacle: Arc<Obstacle>,
    startup_delay: Duration,
    _guard: DriverGuard,
) {
    let interval = board.config().obstacles.move_interval();
    if board.pause(startup_delay) {
        while !obstacle.is_retired() && board.pause(interval) {
            transaction::relocate_obstacle(&board, &obstacle);
        }
    }
    debug!("{} driver exiting", obstacle.id());
}

/// Owns the drivers of one board
pub struct Simulation {
    board: Arc<Board>,
    config: Config,
    drivers: Arc<DriverGroup>,
    snake_threads: Vec<(SnakeId, JoinHandle<()>)>,
    obstacle_pool: Option<rayon::ThreadPool>,
    inputs: HashMap<SnakeId, Arc<DirectionInput>>,
}

impl Simulation {
    pub fn new(board: Arc<Board>) -> Self {
        Simulation {
            config: board.config().clone(),
            board,
            drivers: Arc::new(DriverGroup::default()),
            snake_threads: Vec::new(),
            obstacle_pool: None,
            inputs: HashMap::new(),
        }
    }

    pub fn board(&self) -> &Arc<Board> {
        &self.board
    }

    /// Drivers that have not exited yet, queued obstacle movers included
    pub fn active_drivers(&self) -> usize {
        self.drivers.active()
    }

    /// Adds a snake and starts its driver thread
    pub fn spawn_snake(
        &mut self,
        kind: SnakeKind,
        controller: Box<dyn Controller>,
        startup_delay: Duration,
    ) -> io::Result<SnakeId> {
        let snake = self.board.add_snake(kind);
        let id = snake.id();
        let board = Arc::clone(&self.board);
        let guard = self.drivers.enter();

        let spawned = thread::Builder::new()
            .name(id.to_string())
            .spawn(move || run_snake(board, snake, controller, startup_delay, guard));
        match spawned {
            Ok(handle) => {
                self.snake_threads.push((id, handle));
                Ok(id)
            }
            Err(e) => {
                self.board.remove_snake(id);
                Err(e)
            }
        }
    }

    pub fn spawn_automatic_snake(&mut self) -> io::Result<SnakeId> {
        let delay = self.config.timing.startup_delay();
        self.spawn_snake(
            SnakeKind::Automatic,
            Box::new(AutomaticController::new()),
            delay,
        )
    }

    /// Human snakes start moving as soon as a direction is set
    pub fn spawn_human_snake(&mut self) -> io::Result<(SnakeId, Arc<DirectionInput>)> {
        let input = Arc::new(DirectionInput::new());
        let controller = HumanController::new(Arc::clone(&input));
        let id = self.spawn_snake(SnakeKind::Human, Box::new(controller), Duration::ZERO)?;
        self.inputs.insert(id, Arc::clone(&input));
        Ok((id, input))
    }

    /// Queues one driver per obstacle on a pool of `simultaneous_movers` threads
    pub fn start_obstacle_movers(&mut self) -> Result<usize, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.obstacles.simultaneous_movers.max(1))
            .thread_name(|i| format!("obstacle-mover-{}", i))
            .build()?;

        let delay = self.config.timing.startup_delay();
        let obstacles = self.board.obstacles();
        for obstacle in &obstacles {
            let board = Arc::clone(&self.board);
            let obstacle = Arc::clone(obstacle);
            let guard = self.drivers.enter();
            pool.spawn(move || run_obstacle(board, obstacle, delay, guard));
        }
        self.obstacle_pool = Some(pool);
        info!("Started {} obstacle movers", obstacles.len());
        Ok(obstacles.len())
    }

    pub fn interrupt(&self, id: SnakeId) -> bool {
        self.board.interrupt_snake(id)
    }

    /// Sets a human snake's direction and wakes it if it is stuck behind a busy cell
    pub fn steer(&self, id: SnakeId, direction: Direction) -> bool {
        match self.inputs.get(&id) {
            Some(input) => {
                input.set_direction(direction);
                self.board.interrupt_snake(id);
                true
            }
            None => false,
        }
    }

    /// Detaches a human snake; its driver removes it from the board
    pub fn disconnect(&self, id: SnakeId) -> bool {
        match self.inputs.get(&id) {
            Some(input) => {
                input.disconnect();
                self.board.interrupt_snake(id);
                true
            }
            None => false,
        }
    }

    /// Ends the game and waits up to `grace` for every driver to exit
    ///
    /// Returns true when all drivers stopped in time. Stragglers are detached.
    pub fn shutdown(mut self, grace: Duration) -> bool {
        self.board.mark_terminal();
        let clean = self.drivers.wait_idle(grace);

        for (id, handle) in self.snake_threads.drain(..) {
            // Every guard is gone once the group is idle, so joining is quick
            if clean || handle.is_finished() {
                if handle.join().is_err() {
                    warn!("{} driver panicked", id);
                }
            } else {
                warn!("{} driver still running after {:?}, detaching", id, grace);
            }
        }
        if !clean {
            warn!(
                "{} drivers still running after the shutdown grace period",
                self.drivers.active()
            );
        }
        // Dropping the pool lets its threads finish their current driver and exit
        self.obstacle_pool.take();
        info!("Simulation stopped");
        clean
    }
}
