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

//! Subscription guards and the debounced teardown behind them.

use std::sync::{Arc, Weak};

use kubemux_core::MUTEX_POISONED;

use super::{
    MuxInner, MuxState,
    connection::ConnectionSlot,
    frame::OutboundFrame,
    key::SubscriptionKey,
    registry::{ListenerId, Removal},
};

/// A registered watch listener.
///
/// Dropping the guard unsubscribes. [`Subscription::unsubscribe`] does the same
/// explicitly and may be called any number of times.
#[derive(Debug)]
#[must_use = "dropping a `Subscription` unsubscribes the listener"]
pub struct Subscription {
    inner: Weak<MuxInner>,
    key: SubscriptionKey,
    listener_id: ListenerId,
    active: bool,
}

impl Subscription {
    pub(crate) const fn new(
        inner: Weak<MuxInner>,
        key: SubscriptionKey,
        listener_id: ListenerId,
    ) -> Self {
        Self {
            inner,
            key,
            listener_id,
            active: true,
        }
    }

    /// Returns the key this listener is registered for.
    #[must_use]
    pub const fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Returns the listener id of this registration.
    #[must_use]
    pub const fn listener_id(&self) -> ListenerId {
        self.listener_id
    }

    /// Returns true until the listener has been unsubscribed.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Removes the listener. Calls after the first are no-ops.
    ///
    /// When this was the last listener for the key, the subscription is torn down after
    /// the configured delay unless another listener registers for the key first.
    pub fn unsubscribe(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.remove_listener(self.key, self.listener_id);
        }
    }

    /// Keeps the listener registered for the lifetime of the multiplexer.
    pub fn detach(mut self) {
        self.active = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl MuxInner {
    pub(crate) fn remove_listener(self: &Arc<Self>, key: SubscriptionKey, listener_id: ListenerId) {
        let mut guard = self.state.lock().expect(MUTEX_POISONED);
        let state = &mut *guard;

        match state.registry.remove_listener(&key, listener_id) {
            Removal::NotFound => {}
            Removal::Remaining(remaining) => {
                tracing::trace!("{remaining} listener(s) remain for {key}");
            }
            Removal::Emptied => self.schedule_teardown(state, key),
        }
    }

    fn schedule_teardown(self: &Arc<Self>, state: &mut MuxState, key: SubscriptionKey) {
        let generation = state.timers.next_generation();
        let delay = self.config.unsubscribe_delay();
        let inner = Arc::downgrade(self);

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.fire_teardown(key, generation);
            }
        });

        // Replacing an outstanding timer aborts it
        state.timers.insert(key, generation, task.abort_handle());
        tracing::debug!("Scheduled teardown of {key} in {delay:?}");
    }

    fn fire_teardown(&self, key: SubscriptionKey, generation: u64) {
        // Read outside the lock so a failing provider cannot poison the state
        let user_id = self.identity.user_id();

        let mut guard = self.state.lock().expect(MUTEX_POISONED);
        let state = &mut *guard;

        if !state.timers.take_if_current(&key, generation) {
            return;
        }
        if state.registry.has_listeners(&key) {
            return;
        }

        state.registry.remove_record(&key);
        state.completed.remove(&key);

        if let Some(open) = state.connection.open() {
            match open.handle.send_frame(&OutboundFrame::close(&key, &user_id)) {
                Ok(()) => tracing::debug!("Closed watch {key}"),
                Err(e) => tracing::warn!("Failed to close watch {key}: {e}"),
            }
        } else {
            tracing::debug!("Dropped watch {key} while disconnected");
        }

        if matches!(state.connection, ConnectionSlot::Dropped) && !state.registry.has_records() {
            state.pending_reconnect = false;
            state.connection = ConnectionSlot::Absent;
        }
    }
}
