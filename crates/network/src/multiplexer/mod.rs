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

//! The watch multiplexer: many listeners, one shared transport connection.
//!
//! A [`WatchMultiplexer`] keeps one listener set per [`SubscriptionKey`] and a single
//! transport connection for all of them. The first listener for a key sends a REQUEST
//! frame; the last one leaving schedules a debounced CLOSE, which a new listener for the
//! same key cancels. After a drop, the next connection replays every held subscription.
//!
//! All state lives behind one mutex that is never held across an `.await`, so every
//! event (subscribe, unsubscribe, timer fire, inbound frame, open, close) is handled
//! atomically. Listener callbacks run outside the lock.

mod connection;
mod debounce;
pub mod frame;
pub mod key;
mod registry;
mod resubscribe;
mod router;
mod subscription;

use std::{
    fmt::Debug,
    sync::{Arc, Mutex},
};

use ahash::AHashSet;
use kubemux_core::MUTEX_POISONED;
use serde_json::Value;
use tokio::{runtime::Handle, task::AbortHandle};

pub use self::{
    connection::ConnectionId,
    key::SubscriptionKey,
    registry::{ListenerId, SubscriptionRecord, WatchCallback},
    subscription::Subscription,
};
use self::{
    connection::{ConnectionHandle, ConnectionSlot},
    debounce::UnsubscribeTimers,
    frame::OutboundFrame,
    registry::ListenerRegistry,
};
use crate::{
    config::MultiplexerConfig,
    error::{MuxError, MuxResult},
    identity::IdentityProvider,
    mode::ConnectionMode,
    transport::TransportConnector,
};

#[derive(Debug, Default)]
pub(crate) struct MuxState {
    pub(crate) registry: ListenerRegistry,
    pub(crate) timers: UnsubscribeTimers,
    pub(crate) completed: AHashSet<SubscriptionKey>,
    pub(crate) connection: ConnectionSlot,
    pub(crate) pending_reconnect: bool,
    pub(crate) next_attempt: u64,
    pub(crate) next_connection_id: u64,
    pub(crate) reconnect_task: Option<AbortHandle>,
}

#[derive(Debug)]
pub(crate) struct MuxInner {
    pub(crate) config: MultiplexerConfig,
    pub(crate) connector: Arc<dyn TransportConnector>,
    pub(crate) identity: Arc<dyn IdentityProvider>,
    pub(crate) runtime: Handle,
    pub(crate) state: Mutex<MuxState>,
}

impl Drop for MuxInner {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut() {
            state.timers.cancel_all();
            if let Some(task) = state.reconnect_task.take() {
                task.abort();
            }
        }
    }
}

/// Shares one transport connection between any number of watch listeners.
///
/// The handle is cheap to clone; clones share the same state.
#[derive(Clone, Debug)]
pub struct WatchMultiplexer {
    inner: Arc<MuxInner>,
}

impl WatchMultiplexer {
    /// Creates a new [`WatchMultiplexer`] instance on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new(
        config: MultiplexerConfig,
        connector: impl TransportConnector + 'static,
        identity: impl IdentityProvider + 'static,
    ) -> MuxResult<Self> {
        Self::with_runtime(config, connector, identity, Handle::current())
    }

    /// Creates a new [`WatchMultiplexer`] instance whose tasks run on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn with_runtime(
        config: MultiplexerConfig,
        connector: impl TransportConnector + 'static,
        identity: impl IdentityProvider + 'static,
        runtime: Handle,
    ) -> MuxResult<Self> {
        config
            .validate()
            .map_err(|e| MuxError::Config(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(MuxInner {
                config,
                connector: Arc::new(connector),
                identity: Arc::new(identity),
                runtime,
                state: Mutex::new(MuxState::default()),
            }),
        })
    }

    /// Registers `on_message` for the watch `(cluster_id, path, query)`.
    ///
    /// A pending teardown of the same key is cancelled. The shared connection is opened
    /// if needed, and a REQUEST frame is sent unless one was already sent for the key on
    /// the current connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened or the REQUEST cannot be sent.
    /// The listener is unsubscribed again in that case.
    pub async fn subscribe<F>(
        &self,
        cluster_id: &str,
        path: &str,
        query: &str,
        on_message: F,
    ) -> MuxResult<Subscription>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let key = SubscriptionKey::new(cluster_id, path, query);

        let listener_id = {
            let mut guard = self.inner.state.lock().expect(MUTEX_POISONED);
            let state = &mut *guard;

            if state.timers.cancel(&key) {
                tracing::debug!("Reclaimed {key} before teardown");
            }
            let (listener_id, created) = state.registry.add_listener(key, Arc::new(on_message));
            if created {
                tracing::debug!("Created subscription {key}");
            }
            listener_id
        };

        // Unsubscribes on any early return, including cancellation of this future
        let subscription = Subscription::new(Arc::downgrade(&self.inner), key, listener_id);

        let handle = self.inner.ensure_connected().await?;
        self.inner.send_request_once(&key, &handle)?;

        Ok(subscription)
    }

    /// Closes the transport connection. Subscriptions stay registered and are replayed
    /// by the next connection, which the next [`Self::subscribe`] opens.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Returns the multiplexer configuration.
    #[must_use]
    pub fn config(&self) -> &MultiplexerConfig {
        &self.inner.config
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn connection_mode(&self) -> ConnectionMode {
        self.lock_state().connection.mode()
    }

    /// Returns the id of the open connection.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.lock_state()
            .connection
            .open()
            .map(|open| open.handle.id)
    }

    /// Returns every key holding a subscription record, sorted.
    #[must_use]
    pub fn active_keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<SubscriptionKey> = self
            .lock_state()
            .registry
            .records()
            .map(|record| record.key)
            .collect();
        keys.sort();
        keys
    }

    /// Returns true if `key` holds a subscription record.
    #[must_use]
    pub fn is_active(&self, key: &SubscriptionKey) -> bool {
        self.lock_state().registry.record(key).is_some()
    }

    /// Returns the number of listeners registered for `key`.
    #[must_use]
    pub fn listener_count(&self, key: &SubscriptionKey) -> usize {
        self.lock_state().registry.listener_count(key)
    }

    /// Returns true if a teardown is scheduled for `key`.
    #[must_use]
    pub fn is_teardown_pending(&self, key: &SubscriptionKey) -> bool {
        self.lock_state().timers.is_pending(key)
    }

    /// Returns the keys with a scheduled teardown, sorted.
    #[must_use]
    pub fn pending_teardowns(&self) -> Vec<SubscriptionKey> {
        let mut keys = self.lock_state().timers.pending_keys();
        keys.sort();
        keys
    }

    /// Returns the subscription record held for `key`.
    #[must_use]
    pub fn record(&self, key: &SubscriptionKey) -> Option<SubscriptionRecord> {
        self.lock_state().registry.record(key).copied()
    }

    /// Returns true if `key` received a COMPLETE frame on the current connection.
    #[must_use]
    pub fn is_completed(&self, key: &SubscriptionKey) -> bool {
        self.lock_state().completed.contains(key)
    }

    /// Returns the keys that received a COMPLETE frame on the current connection, sorted.
    #[must_use]
    pub fn completed_keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<SubscriptionKey> =
            self.lock_state().completed.iter().copied().collect();
        keys.sort();
        keys
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MuxState> {
        self.inner.state.lock().expect(MUTEX_POISONED)
    }
}

impl MuxInner {
    /// Sends the REQUEST for `key` unless it was already sent on `handle`'s connection.
    fn send_request_once(&self, key: &SubscriptionKey, handle: &ConnectionHandle) -> MuxResult<()> {
        let user_id = self.identity.user_id();

        let mut guard = self.state.lock().expect(MUTEX_POISONED);
        let state = &mut *guard;

        // A newer connection replays the record itself
        if state.connection.open().is_none_or(|open| open.handle.id != handle.id) {
            return Ok(());
        }
        let Some(record) = state.registry.record_mut(key) else {
            return Ok(());
        };
        if record.requested_on == Some(handle.id) {
            return Ok(());
        }

        handle.send_frame(&OutboundFrame::request(key, &user_id))?;
        record.requested_on = Some(handle.id);
        tracing::debug!("Requested watch {key} on {}", handle.id);
        Ok(())
    }
}
