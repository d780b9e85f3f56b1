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

//! Exponential backoff with jitter for the reconnect supervisor.
//!
//! Delays start at the configured initial value and grow by a constant factor on
//! every attempt, capped at a maximum. A random jitter of up to `jitter_ms` is added
//! on top of each delay so that many dashboards dropped by the same server restart
//! do not all reconnect on the same tick.

use std::time::Duration;

use rand::Rng;

use crate::config::MultiplexerConfig;

/// Computes successive reconnect delays.
#[derive(Clone, Debug)]
pub struct ReconnectBackoff {
    delay_max: Duration,
    delay_current: Duration,
    factor: f64,
    jitter_ms: u64,
    attempts: u32,
}

impl ReconnectBackoff {
    /// Creates a new [`ReconnectBackoff`] instance.
    #[must_use]
    pub const fn new(
        delay_initial: Duration,
        delay_max: Duration,
        factor: f64,
        jitter_ms: u64,
    ) -> Self {
        Self {
            delay_max,
            delay_current: delay_initial,
            factor,
            jitter_ms,
            attempts: 0,
        }
    }

    /// Creates a backoff from the reconnect settings of `config`.
    #[must_use]
    pub const fn from_config(config: &MultiplexerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.reconnect_delay_initial_ms),
            Duration::from_millis(config.reconnect_delay_max_ms),
            config.reconnect_backoff_factor,
            config.reconnect_jitter_ms,
        )
    }

    /// Returns the next delay (jitter included) and advances the base delay.
    pub fn next_duration(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);

        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=self.jitter_ms)
        };
        let delay = self.delay_current + Duration::from_millis(jitter);

        let max_nanos = self.delay_max.as_nanos() as u64;
        let next_nanos = (self.delay_current.as_nanos() as f64 * self.factor) as u64;
        self.delay_current = Duration::from_nanos(next_nanos.min(max_nanos));

        delay
    }

    /// Returns the number of delays handed out so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}
