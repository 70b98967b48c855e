//! # meetroom diagnostics
//!
//! Debugging and diagnostic tools for meetroom.
//! Provides structured logging setup and a hardware handle audit that proves
//! capture handles are released.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod handle_audit;

// Re-export main types
pub use debug_logger::DebugLogger;
pub use handle_audit::{AuditedPlatform, HandleAudit, HandleReport};

use thiserror::Error;

/// Errors raised by diagnostics tooling
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticsError {
    /// The tracing subscriber could not be installed
    #[error("Logging initialization failed: {reason}")]
    LoggingInit {
        /// Failure reason
        reason: String,
    },

    /// A report could not be produced
    #[error("Report generation failed: {reason}")]
    Report {
        /// Failure reason
        reason: String,
    },
}
