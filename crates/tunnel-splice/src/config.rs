// Copyright 2024-2026 Farlight Networks, LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Registry configuration.

use std::time::Duration;

/// Configuration for a session registry.
#[derive(Debug, Clone)]
pub struct Config {
    /// Expected heartbeat cadence of registered sessions.
    ///
    /// A session that goes two intervals without a mark is considered stale
    /// and eligible for reaping.
    pub keep_alive_interval: Duration,

    /// Dial timeout applied to streams that carry no hint of their own.
    pub default_dial_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_secs(5),
            default_dial_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the heartbeat cadence.
    #[must_use]
    pub const fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Sets the fallback dial timeout.
    #[must_use]
    pub const fn with_default_dial_timeout(mut self, timeout: Duration) -> Self {
        self.default_dial_timeout = timeout;
        self
    }

    /// Age past which an unmarked session is stale: two heartbeat intervals.
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        self.keep_alive_interval * 2
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keep_alive_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "keep_alive_interval must be > 0",
            ));
        }

        if self.default_dial_timeout.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "default_dial_timeout must be > 0",
            ));
        }

        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid interval value.
    #[error("invalid interval: {0}")]
    InvalidInterval(&'static str),
}
