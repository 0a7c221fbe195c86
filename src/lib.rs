pub mod config;
pub mod error;
pub mod gateway;
pub mod host;
pub mod menu;
pub mod messages;
pub mod settings;
