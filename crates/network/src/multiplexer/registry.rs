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

//! Listener sets and subscription records, keyed by [`SubscriptionKey`].
//!
//! A record exists for every key with at least one listener, and survives the removal
//! of the last listener until the debounced teardown removes it explicitly.

use std::{fmt::Debug, num::NonZeroUsize, sync::Arc};

use ahash::AHashMap;
use serde_json::Value;

use super::{connection::ConnectionId, key::SubscriptionKey};

/// Callback invoked with every payload routed to a key.
pub type WatchCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifies one registration of a callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// The parameters needed to reissue a REQUEST for a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriptionRecord {
    /// The subscribed key.
    pub key: SubscriptionKey,
    /// The connection on which the REQUEST was last sent.
    pub requested_on: Option<ConnectionId>,
}

/// Outcome of removing a listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Removal {
    /// The listener was not registered (already removed).
    NotFound,
    /// Other listeners remain for the key.
    Remaining(NonZeroUsize),
    /// The key has no listeners left.
    Emptied,
}

/// Per-key listener sets plus the subscription records behind them.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: AHashMap<SubscriptionKey, Vec<(ListenerId, WatchCallback)>>,
    records: AHashMap<SubscriptionKey, SubscriptionRecord>,
    next_listener_id: u64,
}

impl Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ListenerRegistry))
            .field("keys", &self.listeners.len())
            .field("listeners", &self.total_listeners())
            .field("records", &self.records.len())
            .finish()
    }
}

impl ListenerRegistry {
    /// Registers `callback` for `key`.
    ///
    /// Returns the new listener id and whether a subscription record was created.
    pub fn add_listener(
        &mut self,
        key: SubscriptionKey,
        callback: WatchCallback,
    ) -> (ListenerId, bool) {
        self.next_listener_id += 1;
        let id = ListenerId(self.next_listener_id);

        self.listeners.entry(key).or_default().push((id, callback));

        let mut created = false;
        self.records.entry(key).or_insert_with(|| {
            created = true;
            SubscriptionRecord {
                key,
                requested_on: None,
            }
        });

        (id, created)
    }

    /// Removes the listener `id` from `key`, deleting the set once it is empty.
    pub fn remove_listener(&mut self, key: &SubscriptionKey, id: ListenerId) -> Removal {
        let Some(set) = self.listeners.get_mut(key) else {
            return Removal::NotFound;
        };
        let Some(index) = set.iter().position(|(listener_id, _)| *listener_id == id) else {
            return Removal::NotFound;
        };
        set.remove(index);

        match NonZeroUsize::new(set.len()) {
            Some(remaining) => Removal::Remaining(remaining),
            None => {
                self.listeners.remove(key);
                Removal::Emptied
            }
        }
    }

    /// Returns the callbacks registered for `key`, in registration order.
    #[must_use]
    pub fn listeners_for(&self, key: &SubscriptionKey) -> Vec<WatchCallback> {
        self.listeners
            .get(key)
            .map(|set| set.iter().map(|(_, callback)| Arc::clone(callback)).collect())
            .unwrap_or_default()
    }

    /// Returns true if `key` has at least one listener.
    #[must_use]
    pub fn has_listeners(&self, key: &SubscriptionKey) -> bool {
        self.listeners.contains_key(key)
    }

    /// Returns the number of listeners registered for `key`.
    #[must_use]
    pub fn listener_count(&self, key: &SubscriptionKey) -> usize {
        self.listeners.get(key).map_or(0, Vec::len)
    }

    /// Returns the number of listeners across all keys.
    #[must_use]
    pub fn total_listeners(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    /// Returns the record for `key`.
    #[must_use]
    pub fn record(&self, key: &SubscriptionKey) -> Option<&SubscriptionRecord> {
        self.records.get(key)
    }

    /// Returns the record for `key` mutably.
    pub fn record_mut(&mut self, key: &SubscriptionKey) -> Option<&mut SubscriptionRecord> {
        self.records.get_mut(key)
    }

    /// Removes and returns the record for `key`.
    pub fn remove_record(&mut self, key: &SubscriptionKey) -> Option<SubscriptionRecord> {
        self.records.remove(key)
    }

    /// Returns true if any subscription record is held.
    #[must_use]
    pub fn has_records(&self) -> bool {
        !self.records.is_empty()
    }

    /// Returns every held record.
    pub fn records(&self) -> impl Iterator<Item = &SubscriptionRecord> {
        self.records.values()
    }
}
