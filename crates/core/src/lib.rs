pub mod logger;
pub mod matcher;
pub mod monitor;
pub mod platform;
pub mod settings;
pub mod sleep;
pub mod types;
