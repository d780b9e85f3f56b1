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

use std::path::Path;

use anyhow::Context;
use kubemux_core::{
    consts::{ENV_KUBEMUX_URL, ENV_KUBEMUX_USER_ID},
    env::{get_or_env_var, get_or_env_var_opt},
};
use kubemux_network::{config::MultiplexerConfig, transport::websocket::WebSocketConfig};
use serde::Deserialize;

use crate::opt::WatchOpt;

/// Settings for one CLI run: file values first, then command-line and environment
/// overrides.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Multiplexer behavior.
    pub multiplexer: MultiplexerConfig,
    /// Transport settings.
    pub websocket: WebSocketConfig,
    /// Caller identity sent with each frame.
    pub user_id: Option<String>,
}

impl CliConfig {
    /// Parses a [`CliConfig`] from TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid TOML.
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        toml::from_str(input).context("Failed to parse kubemux config")
    }

    /// Loads a [`CliConfig`] from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&input)
    }

    /// Builds the configuration for `opt`, loading its config file when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded, no URL is available, or the
    /// resulting multiplexer settings are invalid.
    pub fn resolve(opt: &WatchOpt) -> anyhow::Result<Self> {
        let mut config = match &opt.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(opt)?;
        Ok(config)
    }

    /// Applies command-line and environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if no URL is available or the multiplexer settings are invalid.
    pub fn apply_overrides(&mut self, opt: &WatchOpt) -> anyhow::Result<()> {
        let file_url = Some(self.websocket.url.clone()).filter(|url| !url.is_empty());
        self.websocket.url = get_or_env_var(opt.url.clone().or(file_url), ENV_KUBEMUX_URL)?;

        self.user_id = get_or_env_var_opt(
            opt.user_id.clone().or_else(|| self.user_id.take()),
            ENV_KUBEMUX_USER_ID,
        );

        if opt.auto_reconnect {
            self.multiplexer.auto_reconnect = true;
        }

        self.multiplexer.validate()?;
        Ok(())
    }
}
