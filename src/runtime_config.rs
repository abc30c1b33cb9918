//! # Runtime Configuration
//!
//! Coroutine runtime tuning read from the environment.
//!
//! ### `CRUDR_STACK_SIZE`
//!
//! Stack size for each connection coroutine, decimal (`32768`) or hexadecimal (`0x8000`).
//! Default: `0x4000` (16 KB). Handlers that build large nested envelopes or
//! call deep resource code may need `0x8000` or more.
//!
//! ```rust
//! use crudrouter::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! assert!(config.stack_size > 0);
//! ```

use std::env;

const DEFAULT_STACK_SIZE: usize = 0x4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Coroutine stack size in bytes
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

/// Parse `0x`-prefixed hex or decimal; zero and garbage fall back to the default.
fn parse_stack_size(value: &str) -> usize {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    };
    parsed.filter(|n| *n > 0).unwrap_or(DEFAULT_STACK_SIZE)
}

impl RuntimeConfig {
    /// Read the runtime configuration from the environment.
    ///
    /// # Returns
    ///
    /// The configured stack size, or the default when `CRUDR_STACK_SIZE` is unset,
    /// zero or unparsable. Never fails.
    pub fn from_env() -> Self {
        match env::var("CRUDR_STACK_SIZE") {
            Ok(val) => RuntimeConfig {
                stack_size: parse_stack_size(&val),
            },
            Err(_) => RuntimeConfig::default(),
        }
    }

    /// Apply to the global `may` scheduler.
    ///
    /// The stack size only affects coroutines spawned afterwards, so call this before
    /// [`crate::server::HttpServer::start`].
    pub fn apply(&self) {
        may::config().set_stack_size(self.stack_size);
    }
}
