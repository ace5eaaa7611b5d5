// Configuration module for reading Snake.toml
// This module provides the tunable parameters for the board, its entities and drivers

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure containing all tunable parameters
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub board: BoardConfig,
    pub goal: GoalConfig,
    pub obstacles: ObstacleConfig,
    pub timing: TimingConfig,
    pub search: SearchConfig,
    pub debug: DebugConfig,
}

/// Board dimensions and initial population
#[derive(Debug, Deserialize, Clone)]
pub struct BoardConfig {
    pub width: i32,
    pub height: i32,
    pub num_snakes: usize,
    pub num_obstacles: usize,
    pub snake_size: usize,
}

/// Goal value progression. Reaching `max_value` ends the game.
#[derive(Debug, Deserialize, Clone)]
pub struct GoalConfig {
    pub initial_value: u32,
    pub max_value: u32,
}

/// Mobile obstacle behaviour
#[derive(Debug, Deserialize, Clone)]
pub struct ObstacleConfig {
    pub moves_per_obstacle: u32,
    pub move_interval_ms: u64,
    /// Size of the worker pool shared by all obstacle drivers
    pub simultaneous_movers: usize,
}

impl ObstacleConfig {
    pub fn move_interval(&self) -> Duration {
        Duration::from_millis(self.move_interval_ms)
    }
}

/// Driver pacing and shutdown constants
#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    pub player_interval_ms: u64,
    pub startup_delay_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl TimingConfig {
    pub fn player_interval(&self) -> Duration {
        Duration::from_millis(self.player_interval_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Free-cell search and relocation retry policy
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Random probes before falling back to a full scan
    pub random_samples: usize,
    pub max_relocation_attempts: usize,
}

/// Snapshot logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    pub enabled: bool,
    pub log_file_path: String,
}

impl Config {
    /// Loads configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the Snake.toml configuration file
    ///
    /// # Returns
    /// * `Result<Config, String>` - Parsed configuration or error message
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let contents = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Loads default configuration from Snake.toml in the project root
    pub fn load_default() -> Result<Self, String> {
        Self::from_file("Snake.toml")
    }

    /// Creates a configuration with hardcoded default values as fallback
    /// This should match the constants defined in Snake.toml
    pub fn default_hardcoded() -> Self {
        Config {
            board: BoardConfig {
                width: 30,
                height: 30,
                num_snakes: 2,
                num_obstacles: 25,
                snake_size: 5,
            },
            goal: GoalConfig {
                initial_value: 1,
                max_value: 10,
            },
            obstacles: ObstacleConfig {
                moves_per_obstacle: 3,
                move_interval_ms: 2000,
                simultaneous_movers: 3,
            },
            timing: TimingConfig {
                player_interval_ms: 100,
                startup_delay_ms: 10_000,
                shutdown_grace_ms: 800,
            },
            search: SearchConfig {
                random_samples: 10,
                max_relocation_attempts: 16,
            },
            debug: DebugConfig {
                enabled: false,
                log_file_path: "snake_snapshots.jsonl".to_string(),
            },
        }
    }

    /// Attempts to load from file, falls back to hardcoded defaults on error
    pub fn load_or_default() -> Self {
        Self::load_default().unwrap_or_else(|e| {
            log::warn!("Could not load Snake.toml ({}), using hardcoded defaults", e);
            Self::default_hardcoded()
        })
    }

    /// Rejects values the board cannot be built from
    pub fn validate(&self) -> Result<(), String> {
        if self.board.width <= 0 || self.board.height <= 0 {
            return Err(format!(
                "Board must have positive dimensions, got {}x{}",
                self.board.width, self.board.height
            ));
        }
        let capacity = (self.board.width as usize) * (self.board.height as usize);
        if self.board.num_obstacles + 1 > capacity {
            return Err(format!(
                "{} obstacles and a goal do not fit on a {}-cell board",
                self.board.num_obstacles, capacity
            ));
        }
        if self.board.snake_size == 0 {
            return Err("snake_size must be at least 1".to_string());
        }
        if self.goal.initial_value == 0 || self.goal.initial_value > self.goal.max_value {
            return Err(format!(
                "Goal initial_value {} must be in 1..={}",
                self.goal.initial_value, self.goal.max_value
            ));
        }
        if self.obstacles.simultaneous_movers == 0 {
            return Err("simultaneous_movers must be at least 1".to_string());
        }
        if self.search.max_relocation_attempts == 0 {
            return Err("max_relocation_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_can_be_created() {
        let config = Config::default_hardcoded();
        assert_eq!(config.board.width, 30);
        assert_eq!(config.goal.max_value, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_helpers() {
        let config = Config::default_hardcoded();
        assert_eq!(config.timing.player_interval(), Duration::from_millis(100));
        assert_eq!(config.obstacles.move_interval(), Duration::from_secs(2));
        assert_eq!(config.timing.shutdown_grace(), Duration::from_millis(800));
    }

    #[test]
    fn test_snake_toml_can_be_parsed() {
        // This test ensures Snake.toml is valid and can be parsed
        let result = Config::from_file("Snake.toml");
        assert!(
            result.is_ok(),
            "Failed to parse Snake.toml: {:?}",
            result.err()
        );
    }

    #[test]
    fn test_all_config_values_match_hardcoded_defaults() {
        let file_config = Config::from_file("Snake.toml")
            .expect("Snake.toml should be parseable");
        let hardcoded_config = Config::default_hardcoded();

        assert_eq!(file_config.board.width, hardcoded_config.board.width);
        assert_eq!(file_config.board.height, hardcoded_config.board.height);
        assert_eq!(file_config.board.num_snakes, hardcoded_config.board.num_snakes);
        assert_eq!(
            file_config.board.num_obstacles,
            hardcoded_config.board.num_obstacles
        );
        assert_eq!(file_config.board.snake_size, hardcoded_config.board.snake_size);

        assert_eq!(file_config.goal.initial_value, hardcoded_config.goal.initial_value);
        assert_eq!(file_config.goal.max_value, hardcoded_config.goal.max_value);

        assert_eq!(
            file_config.obstacles.moves_per_obstacle,
            hardcoded_config.obstacles.moves_per_obstacle
        );
        assert_eq!(
            file_config.obstacles.move_interval_ms,
            hardcoded_config.obstacles.move_interval_ms
        );
        assert_eq!(
            file_config.obstacles.simultaneous_movers,
            hardcoded_config.obstacles.simultaneous_movers
        );

        assert_eq!(
            file_config.timing.player_interval_ms,
            hardcoded_config.timing.player_interval_ms
        );
        assert_eq!(
            file_config.timing.startup_delay_ms,
            hardcoded_config.timing.startup_delay_ms
        );
        assert_eq!(
            file_config.timing.shutdown_grace_ms,
            hardcoded_config.timing.shutdown_grace_ms
        );

        assert_eq!(
            file_config.search.random_samples,
            hardcoded_config.search.random_samples
        );
        assert_eq!(
            file_config.search.max_relocation_attempts,
            hardcoded_config.search.max_relocation_attempts
        );

        assert_eq!(file_config.debug.enabled, hardcoded_config.debug.enabled);
        assert_eq!(
            file_config.debug.log_file_path,
            hardcoded_config.debug.log_file_path
        );
    }

    #[test]
    fn test_validate_rejects_overfull_board() {
        let mut config = Config::default_hardcoded();
        config.board.width = 2;
        config.board.height = 2;
        config.board.num_obstacles = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_goal_above_cap() {
        let mut config = Config::default_hardcoded();
        config.goal.initial_value = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        // Test with a non-existent file
        let result = Config::from_file("nonexistent.toml");
        assert!(result.is_err());
    }
}
