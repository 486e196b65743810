//! Foundry E2E Common Library
//!
//! Shared types, configuration, and the structured logging service used by
//! the convergence checks in `foundry-e2e`.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use config::{E2eConfig, ScheduleConfig, TimeoutConfig};
pub use error::{Error, Result};
pub use logging::{init_tracing, LogContext, LogEvent, LogLevel, LogMode, Logger, PageLogger};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
