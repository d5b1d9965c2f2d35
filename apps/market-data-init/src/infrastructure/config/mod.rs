//! Configuration Module
//!
//! Configuration loading for the market-data initializer service.

mod settings;

pub use settings::{
    AppConfig, ConfigError, FeedSettings, InitializerSettings, MAX_INIT_ATTEMPTS, ServerSettings,
};
