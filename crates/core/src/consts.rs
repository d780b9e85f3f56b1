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

//! Common constants.

/// The `kubemux` crate version.
pub const KUBEMUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The `User-Agent` header value sent on transport handshakes.
pub const KUBEMUX_USER_AGENT: &str = concat!("kubemux/", env!("CARGO_PKG_VERSION"));

/// Environment variable holding the transport URL.
pub const ENV_KUBEMUX_URL: &str = "KUBEMUX_URL";

/// Environment variable holding the caller identity sent with each frame.
pub const ENV_KUBEMUX_USER_ID: &str = "KUBEMUX_USER_ID";
