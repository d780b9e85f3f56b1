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

//! Routes inbound frames to the listeners of their key.

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
};

use kubemux_core::MUTEX_POISONED;
use serde_json::Value;

use super::{MuxInner, frame::Frame, key::SubscriptionKey, registry::WatchCallback};
use crate::error::FrameError;

impl MuxInner {
    /// Handles one inbound text frame.
    pub(crate) fn route(&self, text: &str) {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(FrameError::MissingAddress) => {
                tracing::trace!("Discarding unaddressed frame");
                return;
            }
            Err(e) => {
                tracing::warn!("Discarding frame: {e}");
                return;
            }
        };

        match frame {
            Frame::Complete { key } => {
                let mut state = self.state.lock().expect(MUTEX_POISONED);
                if state.registry.record(&key).is_some() {
                    state.completed.insert(key);
                    tracing::debug!("Watch {key} completed");
                } else {
                    tracing::trace!("Ignoring completion of inactive {key}");
                }
            }
            Frame::Data { key, payload } => {
                let listeners = self
                    .state
                    .lock()
                    .expect(MUTEX_POISONED)
                    .registry
                    .listeners_for(&key);

                if listeners.is_empty() {
                    tracing::trace!("No listeners for {key}");
                    return;
                }
                dispatch(&key, &listeners, &payload);
            }
            Frame::Request { key } | Frame::Close { key } => {
                tracing::warn!("Ignoring inbound control frame for {key}");
            }
        }
    }
}

/// Invokes every listener with `payload`, isolating panics per listener.
///
/// Isolation requires `panic = "unwind"`; under `abort` a listener panic ends the process.
fn dispatch(key: &SubscriptionKey, listeners: &[WatchCallback], payload: &Value) {
    for listener in listeners {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(payload))) {
            tracing::error!(
                "Listener for {key} panicked: {}",
                panic_message(panic.as_ref())
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text
    } else {
        "non-string panic payload"
    }
}
