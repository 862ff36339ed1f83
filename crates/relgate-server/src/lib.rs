//! relgate-server: configuration, logging and scenario runner
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                relgate-server                │
//! ├──────────────────────────────────────────────┤
//! │  config.rs      - Configuration management  │
//! │  observability/ - Structured logging        │
//! │  runner.rs      - Scenario runner           │
//! └──────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod observability;
pub mod runner;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
