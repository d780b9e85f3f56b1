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

#[cfg(panic = "abort")]
compile_error!("kubemux isolates listener panics and must be built with `panic = \"unwind\"`");

use clap::Parser;
use kubemux_cli::opt::KubemuxCli;
use kubemux_core::logging::init_tracing_with_default;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = KubemuxCli::parse();

    if let Err(e) = init_tracing_with_default(&cli.log_level) {
        eprintln!("{e}");
    }

    if let Err(e) = kubemux_cli::run(cli).await {
        tracing::error!("Error executing kubemux CLI: {e:#}");
        std::process::exit(1);
    }
}
