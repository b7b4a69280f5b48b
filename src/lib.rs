// Core modules
pub mod api;
pub mod config;
pub mod engine;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod precision;
pub mod strategy;

// Re-export commonly used types
pub use api::{GatewayError, MarketGateway};
pub use models::*;
pub use strategy::Strategy;
