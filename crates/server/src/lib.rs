pub mod config;
pub mod events;
pub mod server;
pub mod tui;

pub use config::{ConfigError, ServerConfig};
pub use events::{ServerEvent, Severity};
pub use server::{EntityInfo, GameServer, ServerCounters, ServerStats, UPDATE_BATCH};
