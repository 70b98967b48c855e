//! Structured debug logging system

use crate::DiagnosticsError;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<Result<(), DiagnosticsError>> = OnceLock::new();

/// Default directive when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "info";
/// Directive used when debug logging is requested
pub const DEBUG_DIRECTIVE: &str = "meetroom=debug,meetroom_media=debug,meetroom_diagnostics=debug,info";

/// Debug logger for structured logging
#[derive(Debug, Clone)]
pub struct DebugLogger {
    directive: String,
    with_target: bool,
}

impl DebugLogger {
    /// Create new debug logger
    pub fn new() -> Self {
        Self {
            directive: DEFAULT_DIRECTIVE.to_string(),
            with_target: true,
        }
    }

    /// Logger preset for `debug_logging = true`
    pub fn verbose() -> Self {
        Self::new().directive(DEBUG_DIRECTIVE)
    }

    /// Fallback filter directive
    pub fn directive(mut self, directive: &str) -> Self {
        self.directive = directive.to_string();
        self
    }

    /// Include event targets in output
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Filter honouring `RUST_LOG`, falling back to the configured directive
    pub fn env_filter(&self) -> Result<EnvFilter, DiagnosticsError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.directive).map_err(|e| {
                DiagnosticsError::LoggingInit {
                    reason: format!("invalid directive '{}': {}", self.directive, e),
                }
            }),
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    ///
    /// [`DiagnosticsError::LoggingInit`] if the directive is invalid or a
    /// global subscriber is already installed.
    pub fn install(&self) -> Result<(), DiagnosticsError> {
        tracing_subscriber::fmt()
            .with_env_filter(self.env_filter()?)
            .with_target(self.with_target)
            .try_init()
            .map_err(|e| DiagnosticsError::LoggingInit {
                reason: e.to_string(),
            })
    }

    /// Initialize logging system
    ///
    /// Only the first call in a process installs anything; later calls return
    /// its outcome. A subscriber installed by someone else is left in place.
    pub fn init_logging(debug: bool) -> Result<(), DiagnosticsError> {
        INIT.get_or_init(|| {
            if tracing::dispatcher::has_been_set() {
                tracing::debug!("Global subscriber already installed");
                return Ok(());
            }
            let logger = if debug { Self::verbose() } else { Self::new() };
            logger.install()
        })
        .clone()
    }
}

impl Default for DebugLogger {
    fn default() -> Self {
        Self::new()
    }
}
