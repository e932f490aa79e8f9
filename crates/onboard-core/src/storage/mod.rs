mod config;
pub mod database;
pub mod keys;
mod memory;
mod state;

pub use config::{
    Config, NotificationsConfig, TimersConfig, TourConfig, ONE_DAY_MS, ONE_MINUTE_MS,
};
pub use database::Database;
pub use memory::MemoryStore;
pub use state::{Key, Persisted, StateStore, StateTxn, WriteBatch};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the onboard data directory.
///
/// `ONBOARD_DATA_DIR` wins when set. Otherwise `~/.config/onboard[-dev]/`
/// based on `ONBOARD_ENV` (set `ONBOARD_ENV=dev` for the development directory).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("ONBOARD_DATA_DIR") {
        Some(custom) => PathBuf::from(custom),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("ONBOARD_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("onboard-dev")
            } else {
                base_dir.join("onboard")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
