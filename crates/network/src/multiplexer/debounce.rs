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

//! Pending teardown timers for keys whose last listener left.
//!
//! At most one timer is outstanding per key. Each timer carries a generation number; a
//! timer that already woke up but was superseded or cancelled finds its generation gone
//! and does nothing.

use ahash::AHashMap;
use tokio::task::AbortHandle;

use super::key::SubscriptionKey;

#[derive(Debug)]
struct PendingTeardown {
    generation: u64,
    handle: AbortHandle,
}

/// Outstanding debounced teardowns, keyed by subscription.
#[derive(Debug, Default)]
pub struct UnsubscribeTimers {
    pending: AHashMap<SubscriptionKey, PendingTeardown>,
    next_generation: u64,
}

impl UnsubscribeTimers {
    /// Reserves the generation for the next scheduled teardown.
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Tracks the timer task for `key`, aborting any timer it replaces.
    pub fn insert(&mut self, key: SubscriptionKey, generation: u64, handle: AbortHandle) {
        if let Some(previous) = self.pending.insert(key, PendingTeardown { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Cancels the pending teardown for `key`.
    ///
    /// Returns true if a teardown was pending.
    pub fn cancel(&mut self, key: &SubscriptionKey) -> bool {
        match self.pending.remove(key) {
            Some(teardown) => {
                teardown.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Claims the teardown for `key` if `generation` is still the current one.
    pub fn take_if_current(&mut self, key: &SubscriptionKey, generation: u64) -> bool {
        match self.pending.get(key) {
            Some(teardown) if teardown.generation == generation => {
                self.pending.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Returns true if a teardown is pending for `key`.
    #[must_use]
    pub fn is_pending(&self, key: &SubscriptionKey) -> bool {
        self.pending.contains_key(key)
    }

    /// Returns the keys with a pending teardown.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<SubscriptionKey> {
        self.pending.keys().copied().collect()
    }

    /// Cancels every pending teardown.
    pub fn cancel_all(&mut self) {
        for (_, teardown) in self.pending.drain() {
            teardown.handle.abort();
        }
    }
}
