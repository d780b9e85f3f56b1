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

//! Lifecycle of the single shared transport connection.
//!
//! The connection moves through `Absent -> Connecting -> Open`, and to `Dropped` when it
//! fails or closes while subscriptions are still held. Callers arriving during
//! `Connecting` park a `oneshot` waiter on the in-flight attempt instead of opening a
//! second transport.

use std::{fmt::Display, sync::Arc};

use kubemux_core::MUTEX_POISONED;
use tokio::{
    sync::{mpsc::UnboundedReceiver, oneshot},
    task::AbortHandle,
};

use super::{MuxInner, MuxState, frame::OutboundFrame, resubscribe::replay_subscriptions};
use crate::{
    backoff::ReconnectBackoff,
    error::{MuxError, MuxResult},
    mode::ConnectionMode,
    transport::{TransportEvent, TransportLink},
};

/// Identifies one opened transport connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Sending half of an open connection.
#[derive(Clone, Debug)]
pub(crate) struct ConnectionHandle {
    pub(crate) id: ConnectionId,
    sender: tokio::sync::mpsc::UnboundedSender<String>,
}

impl ConnectionHandle {
    pub(crate) const fn new(
        id: ConnectionId,
        sender: tokio::sync::mpsc::UnboundedSender<String>,
    ) -> Self {
        Self { id, sender }
    }

    pub(crate) fn send_frame(&self, frame: &OutboundFrame<'_>) -> MuxResult<()> {
        let text = frame.encode().map_err(|e| MuxError::Send(e.to_string()))?;
        tracing::trace!("Sending {text}");
        self.sender
            .send(text)
            .map_err(|_| MuxError::Send(format!("{} is closed", self.id)))
    }
}

#[derive(Debug)]
pub(crate) struct OpenConnection {
    pub(crate) handle: ConnectionHandle,
    reader: AbortHandle,
}

type Waiter = oneshot::Sender<MuxResult<ConnectionHandle>>;

#[derive(Debug, Default)]
pub(crate) enum ConnectionSlot {
    #[default]
    Absent,
    Connecting {
        attempt: u64,
        task: AbortHandle,
        waiters: Vec<Waiter>,
    },
    Open(OpenConnection),
    Dropped,
}

impl ConnectionSlot {
    pub(crate) const fn mode(&self) -> ConnectionMode {
        match self {
            Self::Absent => ConnectionMode::Absent,
            Self::Connecting { .. } => ConnectionMode::Connecting,
            Self::Open(_) => ConnectionMode::Open,
            Self::Dropped => ConnectionMode::Dropped,
        }
    }

    pub(crate) const fn open(&self) -> Option<&OpenConnection> {
        match self {
            Self::Open(open) => Some(open),
            _ => None,
        }
    }

    fn is_current(&self, id: ConnectionId) -> bool {
        self.open().is_some_and(|open| open.handle.id == id)
    }

    fn take_waiters(&mut self, attempt: u64) -> Option<Vec<Waiter>> {
        match self {
            Self::Connecting {
                attempt: current,
                waiters,
                ..
            } if *current == attempt => Some(std::mem::take(waiters)),
            _ => None,
        }
    }
}

impl MuxState {
    /// Marks the connection gone, keeping replay pending while subscriptions remain.
    fn mark_disconnected(&mut self) -> bool {
        self.completed.clear();
        if self.registry.has_records() {
            self.pending_reconnect = true;
            self.connection = ConnectionSlot::Dropped;
            true
        } else {
            self.pending_reconnect = false;
            self.connection = ConnectionSlot::Absent;
            false
        }
    }
}

impl MuxInner {
    /// Returns the open connection, joining or starting a connection attempt as needed.
    pub(crate) async fn ensure_connected(self: &Arc<Self>) -> MuxResult<ConnectionHandle> {
        let rx = {
            let mut guard = self.state.lock().expect(MUTEX_POISONED);
            let state = &mut *guard;

            if let Some(open) = state.connection.open() {
                return Ok(open.handle.clone());
            }

            let (tx, rx) = oneshot::channel();
            if let ConnectionSlot::Connecting { waiters, .. } = &mut state.connection {
                waiters.push(tx);
            } else {
                state.next_attempt += 1;
                let attempt = state.next_attempt;

                tracing::debug!("Starting connection attempt {attempt}");
                let inner = Arc::clone(self);
                let task = self
                    .runtime
                    .spawn(async move { inner.run_attempt(attempt).await });

                // The attempt cannot observe the slot before the lock is released
                state.connection = ConnectionSlot::Connecting {
                    attempt,
                    task: task.abort_handle(),
                    waiters: vec![tx],
                };
            }
            rx
        };

        rx.await
            .map_err(|_| MuxError::Connect("connection attempt abandoned".to_string()))?
    }

    async fn run_attempt(self: Arc<Self>, attempt: u64) {
        let timeout = self.config.connect_timeout();

        // Dropping the connect future on timeout aborts the attempt
        let result = match tokio::time::timeout(timeout, self.connector.connect()).await {
            Ok(Ok(link)) => Ok(link),
            Ok(Err(e)) => Err(MuxError::from(e)),
            Err(_) => Err(MuxError::Timeout(timeout)),
        };

        match result {
            Ok(link) => self.on_open(attempt, link),
            Err(e) => {
                tracing::warn!("Connection attempt {attempt} failed: {e}");
                self.on_attempt_failed(attempt, &e);
            }
        }
    }

    fn on_open(self: &Arc<Self>, attempt: u64, link: TransportLink) {
        let TransportLink { sender, events } = link;
        let user_id = self.identity.user_id();

        let mut guard = self.state.lock().expect(MUTEX_POISONED);
        let state = &mut *guard;

        let Some(waiters) = state.connection.take_waiters(attempt) else {
            tracing::debug!("Discarding connection from superseded attempt {attempt}");
            return;
        };

        state.next_connection_id += 1;
        let id = ConnectionId(state.next_connection_id);
        let handle = ConnectionHandle::new(id, sender);
        state.completed.clear();

        if std::mem::take(&mut state.pending_reconnect) {
            replay_subscriptions(state, &handle, &user_id, self.config.resubscribe_pending);
        }

        let reader = self.spawn_reader(id, events);
        state.connection = ConnectionSlot::Open(OpenConnection {
            handle: handle.clone(),
            reader,
        });
        drop(guard);

        tracing::info!("Connected ({id})");
        for waiter in waiters {
            let _ = waiter.send(Ok(handle.clone()));
        }
    }

    fn on_attempt_failed(&self, attempt: u64, error: &MuxError) {
        let waiters = {
            let mut guard = self.state.lock().expect(MUTEX_POISONED);
            let state = &mut *guard;
            let Some(waiters) = state.connection.take_waiters(attempt) else {
                return;
            };
            state.mark_disconnected();
            waiters
        };

        for waiter in waiters {
            let _ = waiter.send(Err(error.clone()));
        }
    }

    fn spawn_reader(
        self: &Arc<Self>,
        id: ConnectionId,
        mut events: UnboundedReceiver<TransportEvent>,
    ) -> AbortHandle {
        let inner = Arc::downgrade(self);

        let task = self.runtime.spawn(async move {
            tracing::debug!("Started task 'read' for {id}");
            let mut reason = None;

            while let Some(event) = events.recv().await {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                match event {
                    TransportEvent::Message(text) => inner.route(&text),
                    TransportEvent::Error(e) => tracing::error!("Transport error on {id}: {e}"),
                    TransportEvent::Closed(close_reason) => {
                        reason = close_reason;
                        break;
                    }
                }
            }

            if let Some(inner) = inner.upgrade() {
                inner.on_closed(id, reason.as_deref());
            }
            tracing::debug!("Completed task 'read' for {id}");
        });

        task.abort_handle()
    }

    pub(crate) fn on_closed(self: &Arc<Self>, id: ConnectionId, reason: Option<&str>) {
        let mut guard = self.state.lock().expect(MUTEX_POISONED);
        let state = &mut *guard;

        if !state.connection.is_current(id) {
            tracing::debug!("Ignoring close of stale connection {id}");
            return;
        }

        let active = state.mark_disconnected();
        match reason {
            Some(reason) => tracing::warn!("Connection {id} closed: {reason}"),
            None => tracing::warn!("Connection {id} closed"),
        }

        if active && self.config.auto_reconnect {
            self.spawn_reconnect_supervisor(state);
        }
    }

    fn spawn_reconnect_supervisor(self: &Arc<Self>, state: &mut MuxState) {
        if state.reconnect_task.is_some() {
            return;
        }

        let inner = Arc::downgrade(self);
        let mut backoff = ReconnectBackoff::from_config(&self.config);

        let task = self.runtime.spawn(async move {
            tracing::debug!("Started task 'reconnect'");
            loop {
                let Some(inner) = inner.upgrade() else {
                    return;
                };

                {
                    let mut state = inner.state.lock().expect(MUTEX_POISONED);
                    let done = state.connection.open().is_some() || !state.registry.has_records();
                    if done {
                        state.reconnect_task = None;
                        tracing::debug!("Completed task 'reconnect'");
                        return;
                    }
                }

                let result = inner.ensure_connected().await;
                if let Err(e) = result {
                    let delay = backoff.next_duration();
                    tracing::warn!(
                        "Reconnect attempt {} failed: {e}, retrying in {delay:?}",
                        backoff.attempts()
                    );
                    drop(inner);
                    tokio::time::sleep(delay).await;
                }
            }
        });

        state.reconnect_task = Some(task.abort_handle());
    }

    /// Closes the transport without touching subscriptions.
    pub(crate) fn disconnect(&self) {
        let waiters = {
            let mut guard = self.state.lock().expect(MUTEX_POISONED);
            let state = &mut *guard;

            if let Some(task) = state.reconnect_task.take() {
                task.abort();
            }

            let waiters = match std::mem::take(&mut state.connection) {
                ConnectionSlot::Open(open) => {
                    open.reader.abort();
                    tracing::info!("Disconnected ({})", open.handle.id);
                    Vec::new()
                }
                ConnectionSlot::Connecting {
                    attempt,
                    task,
                    waiters,
                } => {
                    // Stops the transport from opening behind the next attempt
                    task.abort();
                    tracing::info!("Abandoned connection attempt {attempt}");
                    waiters
                }
                ConnectionSlot::Absent | ConnectionSlot::Dropped => Vec::new(),
            };
            state.mark_disconnected();
            waiters
        };

        for waiter in waiters {
            let _ = waiter.send(Err(MuxError::Connect("disconnected".to_string())));
        }
    }
}
