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

//! Per-caller entry points that turn a watch URL into a multiplexed subscription.
//!
//! Views describe what they need as a [`WatchRequest`]: a URL relative to the dashboard
//! origin, the cluster to watch and whether the watch is currently wanted. The adapter
//! splits the URL into the path and query that address the watch on the wire.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::{
    error::{MuxError, MuxResult},
    multiplexer::{Subscription, SubscriptionKey, WatchMultiplexer},
};

/// A watch wanted by one caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchRequest {
    /// The watch URL, absolute or relative to the configured base URL.
    pub url: String,
    /// The cluster to watch.
    pub cluster: String,
    /// If false, no subscription is made.
    pub enabled: bool,
}

impl WatchRequest {
    /// Creates a new enabled [`WatchRequest`] instance.
    #[must_use]
    pub fn new(url: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cluster: cluster.into(),
            enabled: true,
        }
    }

    /// Sets whether the watch is wanted.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Resolves `url` against `base` and returns its `(path, query)`.
///
/// The query is returned without the leading `?`, and is empty when absent.
///
/// # Errors
///
/// Returns an error if `base` is not an absolute URL or `url` cannot be joined to it.
pub fn split_watch_url(base: &str, url: &str) -> MuxResult<(String, String)> {
    let base = Url::parse(base).map_err(|e| MuxError::InvalidUrl(format!("{base}: {e}")))?;
    let resolved = base
        .join(url)
        .map_err(|e| MuxError::InvalidUrl(format!("{url}: {e}")))?;

    Ok((
        resolved.path().to_string(),
        resolved.query().unwrap_or_default().to_string(),
    ))
}

/// Subscribes `callback` to the watch described by `request`.
///
/// Returns `Ok(None)` without touching the multiplexer when the request is disabled or
/// its URL is empty.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the subscription fails.
pub async fn watch<F>(
    mux: &WatchMultiplexer,
    request: &WatchRequest,
    callback: F,
) -> MuxResult<Option<Subscription>>
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    if !request.enabled || request.url.is_empty() {
        return Ok(None);
    }

    let (path, query) = split_watch_url(&mux.config().base_url, &request.url)?;
    mux.subscribe(&request.cluster, &path, &query, callback)
        .await
        .map(Some)
}

/// Like [`watch`], but deserializes each payload into `T` first.
///
/// Payloads that do not deserialize are logged and skipped.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the subscription fails.
pub async fn watch_typed<T, F>(
    mux: &WatchMultiplexer,
    request: &WatchRequest,
    callback: F,
) -> MuxResult<Option<Subscription>>
where
    T: DeserializeOwned + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    let url = request.url.clone();
    watch(mux, request, move |payload: &Value| {
        match <T as serde::Deserialize<'_>>::deserialize(payload) {
            Ok(event) => callback(event),
            Err(e) => tracing::warn!("Skipping undecodable event for {url}: {e}"),
        }
    })
    .await
}

/// Subscriptions created together by [`watch_many`].
///
/// Dropping the group unsubscribes every member.
#[derive(Debug, Default)]
#[must_use = "dropping a `WatchGroup` unsubscribes all of its listeners"]
pub struct WatchGroup {
    subscriptions: Vec<Subscription>,
}

impl WatchGroup {
    /// Returns the number of subscriptions in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns true if the group holds no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Returns the keys of the group's subscriptions.
    #[must_use]
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        self.subscriptions.iter().map(|s| *s.key()).collect()
    }

    /// Unsubscribes every member. Calls after the first are no-ops.
    pub fn unsubscribe(&mut self) {
        for subscription in &mut self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

/// Subscribes one shared `callback` to every enabled request.
///
/// Disabled requests and requests with an empty URL are skipped.
///
/// # Errors
///
/// Returns the first failure; subscriptions already made are released.
pub async fn watch_many<F>(
    mux: &WatchMultiplexer,
    requests: &[WatchRequest],
    callback: F,
) -> MuxResult<WatchGroup>
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    let callback = Arc::new(callback);
    let mut group = WatchGroup::default();

    for request in requests {
        let callback = Arc::clone(&callback);
        if let Some(subscription) =
            watch(mux, request, move |payload: &Value| callback(payload)).await?
        {
            group.subscriptions.push(subscription);
        }
    }

    Ok(group)
}
