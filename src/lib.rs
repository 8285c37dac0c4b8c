pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliArgs, Command};
pub use config::AppConfig;

pub use adapters::{HttpFetcher, HttpSettings, LocalStorage};
pub use crate::core::{Dispatcher, Poller};
pub use utils::error::{ReminderError, Result};
