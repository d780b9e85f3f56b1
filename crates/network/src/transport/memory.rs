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

//! In-memory transport for driving a multiplexer without a network.
//!
//! [`MemoryConnector::new`] returns the connector together with a [`MemoryServer`].
//! Every successful connect produces one [`MemoryPeer`] on the server side, which sees
//! the outbound frames of that connection and can push inbound frames, errors and
//! closes back to the client.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use kubemux_core::MUTEX_POISONED;
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use super::{TransportConnector, TransportEvent, TransportLink};
use crate::error::TransportError;

#[derive(Debug)]
struct MemoryShared {
    peers_tx: UnboundedSender<MemoryPeer>,
    attempts: AtomicUsize,
    refuse_next: AtomicUsize,
    hang: AtomicBool,
    connect_delay: Mutex<Option<Duration>>,
}

/// A [`TransportConnector`] whose connections terminate in a [`MemoryServer`].
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    shared: Arc<MemoryShared>,
}

impl MemoryConnector {
    /// Creates a connector and the server that accepts its connections.
    #[must_use]
    pub fn new() -> (Self, MemoryServer) {
        let (peers_tx, peers_rx) = unbounded_channel();
        let shared = Arc::new(MemoryShared {
            peers_tx,
            attempts: AtomicUsize::new(0),
            refuse_next: AtomicUsize::new(0),
            hang: AtomicBool::new(false),
            connect_delay: Mutex::new(None),
        });
        (Self { shared }, MemoryServer { peers_rx })
    }

    /// Returns how many times `connect` has been called.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Refuses the next `count` connection attempts.
    pub fn refuse_next(&self, count: usize) {
        self.shared.refuse_next.store(count, Ordering::SeqCst);
    }

    /// Makes connection attempts never complete while `hang` is set.
    pub fn set_hang(&self, hang: bool) {
        self.shared.hang.store(hang, Ordering::SeqCst);
    }

    /// Delays every connection attempt by `delay`.
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        *self.shared.connect_delay.lock().expect(MUTEX_POISONED) = delay;
    }
}

#[async_trait]
impl TransportConnector for MemoryConnector {
    async fn connect(&self) -> Result<TransportLink, TransportError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.shared.connect_delay.lock().expect(MUTEX_POISONED);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.shared.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let refused = self
            .shared
            .refuse_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Refused("memory server refused".to_string()));
        }

        let (sender, outbound_rx) = unbounded_channel();
        let (event_tx, events) = unbounded_channel();

        let peer = MemoryPeer {
            outbound_rx,
            event_tx,
        };
        self.shared
            .peers_tx
            .send(peer)
            .map_err(|_| TransportError::Refused("memory server dropped".to_string()))?;

        Ok(TransportLink { sender, events })
    }
}

/// Accepts the connections opened by a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryServer {
    peers_rx: UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    /// Waits for the next accepted connection.
    pub async fn next_peer(&mut self) -> Option<MemoryPeer> {
        self.peers_rx.recv().await
    }

    /// Returns the next accepted connection if one is already waiting.
    pub fn try_next_peer(&mut self) -> Option<MemoryPeer> {
        self.peers_rx.try_recv().ok()
    }
}

/// Server side of one in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    outbound_rx: UnboundedReceiver<String>,
    event_tx: UnboundedSender<TransportEvent>,
}

impl MemoryPeer {
    /// Pushes a text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.event_tx.send(TransportEvent::Message(text.into()));
    }

    /// Pushes a JSON frame to the client.
    pub fn send_json(&self, value: &Value) {
        self.send_text(value.to_string());
    }

    /// Reports a transport error followed by a close.
    pub fn fail(&self, error: impl Into<String>) {
        let _ = self.event_tx.send(TransportEvent::Error(error.into()));
        let _ = self.event_tx.send(TransportEvent::Closed(None));
    }

    /// Closes the connection from the server side.
    pub fn close(&self, reason: Option<&str>) {
        let _ = self
            .event_tx
            .send(TransportEvent::Closed(reason.map(str::to_string)));
    }

    /// Waits for the next frame sent by the client and parses it as JSON.
    ///
    /// Returns `None` once the client has released the connection.
    pub async fn recv_frame(&mut self) -> Option<Value> {
        loop {
            let text = self.outbound_rx.recv().await?;
            match serde_json::from_str(&text) {
                Ok(value) => return Some(value),
                Err(e) => tracing::warn!("Memory peer received invalid JSON: {e}"),
            }
        }
    }

    /// Drains every frame the client has sent so far.
    pub fn try_recv_frames(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.outbound_rx.try_recv() {
            if let Ok(value) = serde_json::from_str(&text) {
                frames.push(value);
            }
        }
        frames
    }

    /// Returns true once the client has released its side of the connection.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.outbound_rx.is_closed() && self.event_tx.is_closed()
    }
}
