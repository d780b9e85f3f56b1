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

//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Each connection is split into a read half and a write half, each driven by its own
//! task. The write task drains the outbound channel of the [`TransportLink`] and emits
//! heartbeat pings when configured. The read task forwards text frames as
//! [`TransportEvent::Message`] and reports the close.

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use kubemux_core::consts::KUBEMUX_USER_AGENT;
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpStream,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    time::{Instant, Interval},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{
            HeaderValue,
            header::{HeaderName, USER_AGENT},
        },
    },
};

use super::{TransportConnector, TransportEvent, TransportLink};
use crate::error::TransportError;

type MessageWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type MessageReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Configuration for the WebSocket transport.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// The multiplexer endpoint, for example `ws://localhost:4466/wsMultiplexer`.
    pub url: String,
    /// Extra handshake headers.
    pub headers: Vec<(String, String)>,
    /// The optional heartbeat interval (seconds). `None` or zero disables the heartbeat.
    pub heartbeat_secs: Option<u64>,
}

/// Opens WebSocket connections to a multiplexer endpoint.
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    /// Creates a new [`WebSocketConnector`] instance.
    #[must_use]
    pub const fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    /// Returns the connector configuration.
    #[must_use]
    pub const fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    async fn connect_with_server(&self) -> Result<(MessageWriter, MessageReader), TransportError> {
        let mut request = self.config.url.as_str().into_client_request()?;
        let req_headers = request.headers_mut();
        req_headers.insert(USER_AGENT, HeaderValue::from_static(KUBEMUX_USER_AGENT));

        for (key, val) in &self.config.headers {
            let header_name: HeaderName = key
                .parse()
                .map_err(|e| TransportError::InvalidHeader(format!("{key}: {e}")))?;
            let header_value = HeaderValue::from_str(val)
                .map_err(|e| TransportError::InvalidHeader(format!("{key}: {e}")))?;
            req_headers.insert(header_name, header_value);
        }

        let (stream, _response) = connect_async(request).await?;
        Ok(stream.split())
    }
}

#[async_trait]
impl TransportConnector for WebSocketConnector {
    async fn connect(&self) -> Result<TransportLink, TransportError> {
        tracing::debug!("Connecting to {}", self.config.url);
        let (writer, reader) = self.connect_with_server().await?;

        let (sender, outbound_rx) = unbounded_channel();
        let (event_tx, events) = unbounded_channel();

        let heartbeat = self.config.heartbeat_secs.filter(|secs| *secs > 0);
        spawn_write_task(writer, outbound_rx, heartbeat);
        spawn_read_task(reader, event_tx);

        tracing::debug!("Connected to {}", self.config.url);
        Ok(TransportLink { sender, events })
    }
}

fn spawn_write_task(
    mut writer: MessageWriter,
    mut outbound_rx: UnboundedReceiver<String>,
    heartbeat_secs: Option<u64>,
) {
    tracing::debug!("Started task 'write'");

    tokio::spawn(async move {
        let mut heartbeat = heartbeat_secs.map(|secs| {
            let period = Duration::from_secs(secs);
            tokio::time::interval_at(Instant::now() + period, period)
        });

        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    let Some(text) = msg else {
                        tracing::debug!("Writer channel closed, terminating writer task");
                        break;
                    };
                    if let Err(e) = writer.send(Message::Text(text.into())).await {
                        tracing::error!("Failed to send message: {e}");
                        break;
                    }
                }
                () = next_heartbeat(&mut heartbeat) => {
                    if let Err(e) = writer.send(Message::Ping(Vec::new().into())).await {
                        tracing::error!("Failed to send heartbeat: {e}");
                        break;
                    }
                    tracing::trace!("Sent heartbeat");
                }
            }
        }

        // The peer may already be gone
        _ = writer.close().await;

        tracing::debug!("Completed task 'write'");
    });
}

async fn next_heartbeat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn spawn_read_task(mut reader: MessageReader, event_tx: UnboundedSender<TransportEvent>) {
    tracing::debug!("Started task 'read'");

    tokio::spawn(async move {
        let mut close_reason = None;

        loop {
            let next = tokio::select! {
                () = event_tx.closed() => {
                    tracing::debug!("Event receiver dropped, terminating read task");
                    break;
                }
                next = reader.next() => next,
            };

            match next {
                Some(Ok(Message::Text(data))) => {
                    tracing::trace!("Received message: {}", data.as_str());
                    if event_tx
                        .send(TransportEvent::Message(data.as_str().to_owned()))
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        if event_tx.send(TransportEvent::Message(text)).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Discarding non UTF-8 binary message: {e}"),
                },
                Some(Ok(Message::Ping(_))) => tracing::trace!("Received ping"),
                Some(Ok(Message::Pong(_))) => tracing::trace!("Received pong"),
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!("Received close message - terminating");
                    close_reason = frame
                        .map(|frame| frame.reason.as_str().to_owned())
                        .filter(|reason| !reason.is_empty());
                    break;
                }
                Some(Ok(Message::Frame(_))) => (),
                Some(Err(e)) => {
                    tracing::error!("Received error message - terminating: {e}");
                    let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                    break;
                }
                // Tungstenite reports a closed connection by ending the stream
                None => {
                    tracing::debug!("No message received - terminating");
                    break;
                }
            }
        }

        let _ = event_tx.send(TransportEvent::Closed(close_reason));
        tracing::debug!("Completed task 'read'");
    });
}
