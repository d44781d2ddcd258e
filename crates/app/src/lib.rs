pub mod config;
pub mod listener;

pub use config::ListenerConfig;
pub use listener::{MatchEvent, MatchListener};
