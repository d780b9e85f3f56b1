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

//! Replays REQUEST frames after a reconnect.

use super::{MuxState, connection::ConnectionHandle, frame::OutboundFrame, key::SubscriptionKey};

/// Sends a REQUEST on `handle` for every subscription held in `state`.
///
/// Keys that still have listeners are always replayed. Keys whose last listener left
/// and whose teardown is still pending are replayed only when `include_pending` is set;
/// the pending teardown then closes them on the new connection.
///
/// Returns the number of REQUEST frames sent.
pub(crate) fn replay_subscriptions(
    state: &mut MuxState,
    handle: &ConnectionHandle,
    user_id: &str,
    include_pending: bool,
) -> usize {
    let mut keys: Vec<SubscriptionKey> = state
        .registry
        .records()
        .map(|record| record.key)
        .filter(|key| {
            state.registry.has_listeners(key) || (include_pending && state.timers.is_pending(key))
        })
        .collect();
    keys.sort();

    let mut replayed = 0;
    for key in keys {
        if let Err(e) = handle.send_frame(&OutboundFrame::request(&key, user_id)) {
            tracing::warn!("Resubscribe of {key} failed: {e}");
            break;
        }
        if let Some(record) = state.registry.record_mut(&key) {
            record.requested_on = Some(handle.id);
        }
        replayed += 1;
    }

    tracing::info!("Resubscribed {replayed} watch(es) on {}", handle.id);
    replayed
}
