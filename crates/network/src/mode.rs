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

//! Connection states reported by the multiplexer.

use strum::{AsRefStr, Display, EnumString};

/// Observable state of the shared transport connection.
#[derive(Clone, Copy, Debug, Default, Display, Hash, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ConnectionMode {
    /// No connection exists and none is being opened.
    #[default]
    Absent,
    /// A connection attempt is in flight; callers wait on its shared result.
    Connecting,
    /// The connection is open and the reader task is running.
    Open,
    /// The connection dropped while subscriptions were active.
    /// The next successful connection replays their REQUEST frames.
    Dropped,
}
