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

//! Subscription keys.

use std::fmt::Display;

use ustr::Ustr;

/// Canonical identity of one watch: the cluster, the resource path and the query.
///
/// Equal tuples always produce equal keys. The parts are interned, so keys are `Copy`
/// and cheap to hash, and two distinct tuples never collide even when a part contains
/// the `:` separator used by [`Display`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    /// The target cluster routing key.
    pub cluster_id: Ustr,
    /// The resource path being watched.
    pub path: Ustr,
    /// The serialized query parameters, without a leading `?`.
    pub query: Ustr,
}

impl SubscriptionKey {
    /// Creates a new [`SubscriptionKey`] instance.
    #[must_use]
    pub fn new(cluster_id: &str, path: &str, query: &str) -> Self {
        Self {
            cluster_id: Ustr::from(cluster_id),
            path: Ustr::from(path),
            query: Ustr::from(query),
        }
    }
}

impl Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.cluster_id, self.path, self.query)
    }
}
