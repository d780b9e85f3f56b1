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

//! Wire frames exchanged with the multiplexer endpoint.
//!
//! Every frame is a JSON text message addressed by `clusterId`, `path` and `query`.
//! Outbound frames carry the caller identity and a `type` of `REQUEST` or `CLOSE`.
//! Inbound frames either carry a `data` payload or announce with `COMPLETE` that the
//! watch ended.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use super::key::SubscriptionKey;
use crate::error::FrameError;

/// The `type` field of a frame.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum FrameType {
    /// Start watching a key.
    Request,
    /// Stop watching a key.
    Close,
    /// The watch for a key ended.
    Complete,
}

/// A frame sent to the multiplexer endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame<'a> {
    /// The target cluster.
    pub cluster_id: &'a str,
    /// The watched resource path.
    pub path: &'a str,
    /// The watch query.
    pub query: &'a str,
    /// The caller identity.
    pub user_id: &'a str,
    /// The frame type.
    #[serde(rename = "type")]
    pub frame_type: FrameType,
}

impl<'a> OutboundFrame<'a> {
    /// Creates a `REQUEST` frame for `key`.
    #[must_use]
    pub fn request(key: &'a SubscriptionKey, user_id: &'a str) -> Self {
        Self::new(key, user_id, FrameType::Request)
    }

    /// Creates a `CLOSE` frame for `key`.
    #[must_use]
    pub fn close(key: &'a SubscriptionKey, user_id: &'a str) -> Self {
        Self::new(key, user_id, FrameType::Close)
    }

    fn new(key: &'a SubscriptionKey, user_id: &'a str, frame_type: FrameType) -> Self {
        Self {
            cluster_id: key.cluster_id.as_str(),
            path: key.path.as_str(),
            query: key.query.as_str(),
            user_id,
            frame_type,
        }
    }

    /// Serializes the frame to its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(default)]
    cluster_id: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default, rename = "type")]
    frame_type: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// A `REQUEST` frame echoed back by the peer.
    Request {
        /// The addressed key.
        key: SubscriptionKey,
    },
    /// A `CLOSE` frame echoed back by the peer.
    Close {
        /// The addressed key.
        key: SubscriptionKey,
    },
    /// The watch for `key` ended.
    Complete {
        /// The addressed key.
        key: SubscriptionKey,
    },
    /// An event payload for `key`.
    Data {
        /// The addressed key.
        key: SubscriptionKey,
        /// The parsed payload.
        payload: Value,
    },
}

impl Frame {
    /// Decodes and validates an inbound text frame.
    ///
    /// A `data` field holding a string is parsed as JSON; any other JSON value is taken
    /// as the payload as is. A missing `query` means the empty query.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The text is not a JSON object.
    /// - `clusterId` or `path` is missing or empty.
    /// - `type` is not a known frame type.
    /// - A data frame has no payload, or its string payload is not valid JSON.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let raw: RawFrame = serde_json::from_str(text)?;

        let (Some(cluster_id), Some(path)) = (raw.cluster_id, raw.path) else {
            return Err(FrameError::MissingAddress);
        };
        if cluster_id.is_empty() || path.is_empty() {
            return Err(FrameError::MissingAddress);
        }

        let key = SubscriptionKey::new(&cluster_id, &path, raw.query.as_deref().unwrap_or(""));

        let frame_type = match raw.frame_type.as_deref() {
            None | Some("") => None,
            Some(name) => Some(
                name.parse::<FrameType>()
                    .map_err(|_| FrameError::UnknownType(name.to_string()))?,
            ),
        };

        match frame_type {
            Some(FrameType::Request) => Ok(Self::Request { key }),
            Some(FrameType::Close) => Ok(Self::Close { key }),
            Some(FrameType::Complete) => Ok(Self::Complete { key }),
            None => {
                let payload = match raw.data {
                    None | Some(Value::Null) => {
                        return Err(FrameError::MissingPayload(key.to_string()));
                    }
                    Some(Value::String(text)) => {
                        serde_json::from_str(&text).map_err(|e| FrameError::Payload {
                            key: key.to_string(),
                            reason: e.to_string(),
                        })?
                    }
                    Some(value) => value,
                };
                Ok(Self::Data { key, payload })
            }
        }
    }

    /// Returns the key the frame is addressed to.
    #[must_use]
    pub const fn key(&self) -> &SubscriptionKey {
        match self {
            Self::Request { key }
            | Self::Close { key }
            | Self::Complete { key }
            | Self::Data { key, .. } => key,
        }
    }
}
