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

use std::path::PathBuf;

use clap::Parser;

/// Main CLI structure for parsing command-line arguments and options.
///
/// This is the entry point for the kubemux command-line interface, which opens
/// watches through a shared multiplexed connection.
#[derive(Debug, Parser)]
#[clap(version, about, author)]
pub struct KubemuxCli {
    /// Default log filter, used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
    #[clap(subcommand)]
    pub command: Commands,
}

/// Available top-level commands for the kubemux CLI.
#[derive(Parser, Debug)]
pub enum Commands {
    Watch(WatchOpt),
}

/// Options for streaming watch events to stdout.
#[derive(Parser, Debug, Clone)]
#[command(about = "Stream watch events through the multiplexer", long_about = None)]
pub struct WatchOpt {
    /// Multiplexer WebSocket URL (falls back to the config file, then `KUBEMUX_URL`).
    #[arg(long)]
    pub url: Option<String>,
    /// Cluster to watch.
    #[arg(long)]
    pub cluster: String,
    /// Resource path to watch, optionally with a query. May be repeated.
    #[arg(long = "path", required = true)]
    pub paths: Vec<String>,
    /// Query applied to every path that carries none.
    #[arg(long)]
    pub query: Option<String>,
    /// Caller identity sent with each frame (falls back to `KUBEMUX_USER_ID`).
    #[arg(long)]
    pub user_id: Option<String>,
    /// TOML file with `[multiplexer]` and `[websocket]` tables.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Reconnect in the background after the connection drops.
    #[arg(long)]
    pub auto_reconnect: bool,
}
