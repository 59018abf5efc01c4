//! Shared errors and configuration for Ringi.
//!
//! This crate provides common pieces used across all other crates:
//! - Application-wide error types
//! - Layered configuration management

pub mod config;
pub mod error;

pub use config::{
    AppConfig, DatabaseConfig, EngineConfig, LogFormat, LoggingConfig, ResolutionPolicy,
    ServerConfig, StorageBackend, StorageConfig, UpstreamConfig,
};
pub use error::{AppError, AppResult};
