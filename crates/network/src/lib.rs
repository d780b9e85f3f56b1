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

//! Connection multiplexer for Kubernetes watch streams.
//!
//! The `kubemux-network` crate lets a dashboard hold hundreds of concurrent resource
//! watches over a single shared transport connection:
//!
//! - [`multiplexer::WatchMultiplexer`]: listener registry, debounced teardown, shared
//!   connection management, resubscription and inbound routing.
//! - [`hook`]: URL-based entry points for views.
//! - [`transport`]: the connector abstraction with WebSocket and in-memory transports.
//! - [`config`], [`backoff`], [`identity`], [`mode`] and [`error`]: supporting types.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod backoff;
pub mod config;
pub mod error;
pub mod hook;
pub mod identity;
pub mod mode;
pub mod multiplexer;
pub mod transport;
