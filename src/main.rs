use log::{error, info, warn};
use std::env;
use std::sync::Arc;

use snake_grid::board::Board;
use snake_grid::config::Config;
use snake_grid::driver::Simulation;
use snake_grid::snapshot_logger::SnapshotLogger;

#[tokio::main]
async fn main() {
    // We default to 'info' level logging. But if the `RUST_LOG` environment variable is set,
    // we keep that value instead.
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }

    env_logger::init();

    info!("Starting snake board...");

    // Load configuration once at startup
    let config = Config::load_or_default();
    let logger = SnapshotLogger::new(config.debug.enabled, &config.debug.log_file_path).await;

    let sink = logger.sink();
    let board = Board::builder(&config)
        .observer(move |board, change| {
            if sink.is_enabled() {
                sink.record(change, board.snapshot());
            }
        })
        .build();

    let mut simulation = Simulation::new(Arc::clone(&board));
    for _ in 0..config.board.num_snakes {
        if let Err(e) = simulation.spawn_automatic_snake() {
            error!("Failed to start snake driver: {}", e);
        }
    }
    if let Err(e) = simulation.start_obstacle_movers() {
        error!("Failed to start obstacle movers: {}", e);
    }

    let waiter = Arc::clone(&board);
    tokio::select! {
        finished = tokio::task::spawn_blocking(move || waiter.wait_finished(None)) => {
            if let Err(e) = finished {
                error!("Game-over watcher failed: {}", e);
            }
        }
        interrupted = tokio::signal::ctrl_c() => {
            match interrupted {
                Ok(()) => info!("Interrupted, stopping the game"),
                Err(e) => error!("Failed to listen for ctrl-c: {}", e),
            }
            board.mark_terminal();
        }
    }

    let grace = config.timing.shutdown_grace();
    match tokio::task::spawn_blocking(move || simulation.shutdown(grace)).await {
        Ok(true) => {}
        Ok(false) => warn!("Some drivers did not stop within {:?}", grace),
        Err(e) => error!("Shutdown failed: {}", e),
    }

    let snapshot = board.snapshot();
    info!(
        "Final board (goal value {}):\n{}",
        snapshot.goal.value(),
        snapshot.render_ascii()
    );

    // The observer holds a sink; the writer drains once the board is gone
    drop(board);
    logger.finish(grace).await;
}
