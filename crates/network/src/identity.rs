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

//! Caller identity attached to every outbound frame.

use std::fmt::Debug;

/// Supplies the `userId` stamped on REQUEST and CLOSE frames.
///
/// The identity is read each time a frame is built, so a provider may change its
/// answer over the lifetime of a multiplexer (for example after a login).
pub trait IdentityProvider: Send + Sync + Debug {
    /// Returns the current caller identity. An empty string is acceptable.
    fn user_id(&self) -> String;
}

/// A fixed caller identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticIdentity(String);

impl StaticIdentity {
    /// Creates a new [`StaticIdentity`] instance.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self(user_id.into())
    }
}

impl IdentityProvider for StaticIdentity {
    fn user_id(&self) -> String {
        self.0.clone()
    }
}
