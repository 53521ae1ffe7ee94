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

//! WebSocket implementation of [`Transport`] built on `tokio-tungstenite`.
//!
//! **Design**:
//! - Single reader, multiple writer model.
//! - Read half runs in a dedicated task and forwards [`TransportEvent`]s.
//! - Write half runs in a dedicated task connected with a command channel.
//! - No reconnection here: a closed connection is reported once and the owner
//!   (the session controller) decides whether to open a new one.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderName, HeaderValue},
    },
};

use crate::{
    tls::install_cryptographic_provider,
    transport::{Transport, TransportCommand, TransportConnection, TransportError, TransportEvent},
};

type MessageWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type MessageReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Default bound on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket connections carrying one JSON envelope per text frame.
#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    headers: Vec<(String, String)>,
    connect_timeout: Duration,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(Vec::new(), DEFAULT_CONNECT_TIMEOUT)
    }
}

impl WebSocketTransport {
    /// Creates a new [`WebSocketTransport`] sending `headers` with every handshake.
    #[must_use]
    pub const fn new(headers: Vec<(String, String)>, connect_timeout: Duration) -> Self {
        Self {
            headers,
            connect_timeout,
        }
    }

    /// Returns the connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    async fn connect_with_server(
        url: &str,
        headers: &[(String, String)],
    ) -> Result<(MessageWriter, MessageReader), TransportError> {
        let mut request = url.into_client_request()?;
        let req_headers = request.headers_mut();

        for (key, val) in headers {
            let header_value = HeaderValue::from_str(val)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            let header_name = key
                .parse::<HeaderName>()
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            req_headers.insert(header_name, header_value);
        }

        let (stream, _response) = connect_async(request).await?;
        Ok(stream.split())
    }

    fn spawn_read_task(
        url: String,
        mut reader: MessageReader,
        event_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> tokio::task::JoinHandle<()> {
        tracing::debug!("Started task 'read' for {url}");

        tokio::task::spawn(async move {
            loop {
                let event = match reader.next().await {
                    Some(Ok(Message::Text(data))) => {
                        let text = data.as_str().to_owned();
                        tracing::trace!("Received message: {text}");
                        TransportEvent::Text(text)
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => TransportEvent::Text(text),
                        Err(e) => {
                            tracing::warn!("Dropping non UTF-8 binary frame: {e}");
                            continue;
                        }
                    },
                    Some(Ok(Message::Ping(ping))) => {
                        tracing::trace!("Received ping: {ping:?}");
                        continue;
                    }
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!("Received close message: {frame:?}");
                        let (code, reason) = frame.map_or((None, String::new()), |f| {
                            (Some(u16::from(f.code)), f.reason.as_str().to_owned())
                        });
                        let _ = event_tx.send(TransportEvent::Closed { code, reason });
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::debug!("Received error message - terminating: {e}");
                        let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                    // Internally tungstenite considers the connection closed when polling
                    // for the next message in the stream returns None.
                    None => {
                        tracing::debug!("No message received - terminating");
                        let _ = event_tx.send(TransportEvent::Closed {
                            code: None,
                            reason: String::new(),
                        });
                        break;
                    }
                };

                if event_tx.send(event).is_err() {
                    tracing::debug!("Event receiver dropped - terminating");
                    break;
                }
            }

            tracing::debug!("Completed task 'read' for {url}");
        })
    }

    fn spawn_write_task(
        mut writer: MessageWriter,
        mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
    ) -> tokio::task::JoinHandle<()> {
        tracing::debug!("Started task 'write'");

        tokio::task::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    TransportCommand::Send(text) => {
                        tracing::trace!("Sending text: {text:?}");
                        if let Err(e) = writer.send(Message::Text(text.into())).await {
                            tracing::error!("Failed to send message: {e}");
                            break;
                        }
                    }
                    TransportCommand::Close => break,
                }
            }

            // Attempt to close the writer gracefully before exiting,
            // we ignore any error as the writer may already be closed.
            _ = writer.close().await;

            tracing::debug!("Completed task 'write'");
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<TransportConnection, TransportError> {
        install_cryptographic_provider();
        tracing::debug!("Connecting to {url}");

        let (writer, reader) = tokio::time::timeout(
            self.connect_timeout,
            Self::connect_with_server(url, &self.headers),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.connect_timeout))??;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let read_task = Self::spawn_read_task(url.to_string(), reader, event_tx);
        // Detached: exits on `Close` or once the connection drops its command sender
        Self::spawn_write_task(writer, command_rx);

        Ok(TransportConnection::new(
            url,
            event_rx,
            command_tx,
            Some(read_task),
        ))
    }
}
