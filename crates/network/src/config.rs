// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Configuration for [`WatchMultiplexer`](crate::multiplexer::WatchMultiplexer) instances.

use std::time::Duration;

use anyhow::Context;
use kubemux_core::correctness::{
    check_in_range_inclusive_f64, check_positive_u64, check_u64_le, check_valid_string,
};
use serde::{Deserialize, Serialize};

/// Configuration for `WatchMultiplexer` instances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplexerConfig {
    /// The origin that relative watch URLs are resolved against.
    pub base_url: String,
    /// The hard timeout (milliseconds) for opening the transport.
    pub connect_timeout_ms: u64,
    /// The delay (milliseconds) before an unreferenced subscription is torn down.
    pub unsubscribe_delay_ms: u64,
    /// If subscriptions still inside their teardown delay are replayed on reconnect.
    pub resubscribe_pending: bool,
    /// If a dropped connection is re-established in the background while
    /// subscriptions remain, rather than on the next subscribe.
    pub auto_reconnect: bool,
    /// The initial reconnect delay (milliseconds).
    pub reconnect_delay_initial_ms: u64,
    /// The maximum reconnect delay (milliseconds).
    pub reconnect_delay_max_ms: u64,
    /// The factor applied to the reconnect delay after each failed attempt.
    pub reconnect_backoff_factor: f64,
    /// The maximum random jitter (milliseconds) added to each reconnect delay.
    pub reconnect_jitter_ms: u64,
}

impl Default for MultiplexerConfig {
    /// Creates a new default [`MultiplexerConfig`] instance.
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4466".to_string(),
            connect_timeout_ms: 30_000,
            unsubscribe_delay_ms: 100,
            resubscribe_pending: true,
            auto_reconnect: false,
            reconnect_delay_initial_ms: 500,
            reconnect_delay_max_ms: 10_000,
            reconnect_backoff_factor: 1.5,
            reconnect_jitter_ms: 100,
        }
    }
}

impl MultiplexerConfig {
    /// Parses a [`MultiplexerConfig`] from TOML, filling absent fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid TOML or fails [`Self::validate`].
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(input).context("Failed to parse multiplexer config")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> anyhow::Result<()> {
        check_valid_string(&self.base_url, "base_url")?;
        url::Url::parse(&self.base_url)
            .with_context(|| format!("invalid `base_url` '{}'", self.base_url))?;
        check_positive_u64(self.connect_timeout_ms, "connect_timeout_ms")?;
        check_positive_u64(self.reconnect_delay_initial_ms, "reconnect_delay_initial_ms")?;
        check_u64_le(
            self.reconnect_delay_initial_ms,
            "reconnect_delay_initial_ms",
            self.reconnect_delay_max_ms,
            "reconnect_delay_max_ms",
        )?;
        check_in_range_inclusive_f64(
            self.reconnect_backoff_factor,
            1.0,
            10.0,
            "reconnect_backoff_factor",
        )?;
        Ok(())
    }

    /// Returns the connection timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the teardown delay for unreferenced subscriptions.
    #[must_use]
    pub const fn unsubscribe_delay(&self) -> Duration {
        Duration::from_millis(self.unsubscribe_delay_ms)
    }
}
