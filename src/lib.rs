// Library exports for the concurrent snake board
// The binary and the integration tests drive the board through these modules

pub mod board;
pub mod cell;
pub mod config;
pub mod driver;
pub mod entities;
pub mod error;
pub mod grid;
pub mod snake;
pub mod snapshot;
pub mod snapshot_logger;
pub mod transaction;
pub mod types;
