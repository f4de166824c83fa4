//! Grounded Core Library
//!
//! This crate provides the foundational utilities shared by the Grounded
//! retrieval-augmented answering workspace:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Workspace configuration

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use logging::LogFormat;
