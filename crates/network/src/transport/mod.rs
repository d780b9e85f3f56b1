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

//! Transport abstraction consumed by the connection manager.
//!
//! A [`TransportConnector`] opens one physical connection and hands back a
//! [`TransportLink`]: an outbound text sender plus a receiver of inbound events.
//! The multiplexer never touches sockets directly, so the same state machine runs over
//! a real WebSocket or the in-memory transport used in tests.

pub mod memory;
pub mod websocket;

use std::fmt::Debug;

use async_trait::async_trait;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::error::TransportError;

/// Inbound event produced by an open transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame from the peer.
    Message(String),
    /// A transport failure. A [`TransportEvent::Closed`] event follows.
    Error(String),
    /// The connection is closed, with the close reason when the peer sent one.
    Closed(Option<String>),
}

/// The two halves of an open transport connection.
///
/// Dropping `sender` asks the transport to close. The `events` stream ends (or yields
/// [`TransportEvent::Closed`]) once the connection is gone.
#[derive(Debug)]
pub struct TransportLink {
    /// Outbound text frames.
    pub sender: UnboundedSender<String>,
    /// Inbound events in arrival order.
    pub events: UnboundedReceiver<TransportEvent>,
}

/// Opens transport connections for a multiplexer.
#[async_trait]
pub trait TransportConnector: Send + Sync + Debug {
    /// Opens a new connection.
    ///
    /// The caller bounds this call with its own timeout and drops the future when it
    /// elapses, so implementations must not leave background tasks behind on
    /// cancellation.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn connect(&self) -> Result<TransportLink, TransportError>;
}
