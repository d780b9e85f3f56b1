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

//! Error types for the watch multiplexer and its transports.

use std::time::Duration;

use thiserror::Error;

/// Result alias for multiplexer operations.
pub type MuxResult<T> = Result<T, MuxError>;

/// Error type for multiplexer failures surfaced to callers.
///
/// The type is `Clone` so that a single failed connection attempt can be delivered
/// to every caller awaiting it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MuxError {
    /// The transport could not be opened.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The transport did not open within the connection timeout.
    #[error("Connection timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// A frame could not be handed to the transport.
    #[error("Send failed: {0}")]
    Send(String),

    /// A watch URL could not be resolved into a path and query.
    #[error("Invalid watch URL: {0}")]
    InvalidUrl(String),

    /// Configuration values failed validation.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<TransportError> for MuxError {
    fn from(error: TransportError) -> Self {
        Self::Connect(error.to_string())
    }
}

/// Error type for inbound frames that cannot be routed.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame is not a JSON object of the expected shape.
    #[error("Invalid frame JSON: {0}")]
    Json(String),

    /// The frame lacks a cluster id or path, so it cannot be addressed to a key.
    #[error("Frame is missing addressing fields")]
    MissingAddress,

    /// A data frame carries no `data` field.
    #[error("Frame for {0} is missing its payload")]
    MissingPayload(String),

    /// The `data` field is a string that does not hold valid JSON.
    #[error("Invalid payload for {key}: {reason}")]
    Payload {
        /// The key the frame was addressed to.
        key: String,
        /// The parse failure.
        reason: String,
    },

    /// The `type` field names no known frame type.
    #[error("Unknown frame type '{0}'")]
    UnknownType(String),
}

impl From<serde_json::Error> for FrameError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

/// Error type for transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying WebSocket error from the tungstenite implementation.
    #[error("WebSocket transport error: {0}")]
    WebSocket(String),

    /// A configured handshake header was invalid.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The peer refused the connection.
    #[error("Connection refused: {0}")]
    Refused(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(error.to_string())
    }
}
