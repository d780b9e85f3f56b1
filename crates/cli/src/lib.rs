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

//! Command-line client that streams Kubernetes watch events through a shared multiplexed
//! WebSocket connection.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]

pub mod config;
pub mod opt;
pub mod watch;

use crate::{
    opt::{Commands, KubemuxCli},
    watch::run_watch,
};

/// Runs the command selected by `opt`.
///
/// # Errors
///
/// Returns an error if the command fails.
pub async fn run(opt: KubemuxCli) -> anyhow::Result<()> {
    match opt.command {
        Commands::Watch(watch_opt) => run_watch(&watch_opt).await?,
    }
    Ok(())
}
