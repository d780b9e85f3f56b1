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

//! Tracing subscriber initialization.
//!
//! Library crates log through the `tracing` macros only; binaries decide where the
//! output goes by calling one of the functions below once at startup.

use std::env;

use tracing_subscriber::EnvFilter;

/// The environment variable read for the tracing filter directives.
pub const RUST_LOG: &str = "RUST_LOG";

/// Initialize tracing.
///
/// Tracing can be configured to filter modules and write up to a specific level by
/// passing a configuration using the `RUST_LOG` environment variable.
///
/// Should only be called once during an application's run, ideally at the
/// beginning of the run.
///
/// # Errors
///
/// Returns an error if tracing subscriber fails to initialize.
pub fn init_tracing() -> anyhow::Result<()> {
    // Skip tracing initialization if `RUST_LOG` is not set
    if let Ok(v) = env::var(RUST_LOG) {
        let env_filter = EnvFilter::new(v.clone());

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))?;

        tracing::debug!("Initialized tracing logs with RUST_LOG={v}");
    }
    Ok(())
}

/// Initialize tracing with `default_directives` used when `RUST_LOG` is not set.
///
/// Logs are written to stderr so that stdout stays free for command output.
///
/// # Errors
///
/// Returns an error if the directives are invalid or the subscriber fails to initialize.
pub fn init_tracing_with_default(default_directives: &str) -> anyhow::Result<()> {
    let directives = env::var(RUST_LOG).unwrap_or_else(|_| default_directives.to_string());
    let env_filter = EnvFilter::try_new(&directives)
        .map_err(|e| anyhow::anyhow!("Invalid tracing directives '{directives}': {e}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))?;

    Ok(())
}
