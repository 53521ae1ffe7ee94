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

//! Abstract message-framed transport used by session controllers.
//!
//! A [`Transport`] opens physical connections. Each [`TransportConnection`] exposes the
//! inbound side as a stream of [`TransportEvent`]s (text frames, close, error) and the
//! outbound side as a command channel drained by a writer task owned by the transport.

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};

/// Error type for transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint URL or a request header could not be used.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The connection or protocol handshake failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The connection attempt did not complete in time.
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// The connection is already closed.
    #[error("Connection closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error;

        match error {
            Error::Url(e) => Self::InvalidRequest(e.to_string()),
            Error::HttpFormat(e) => Self::InvalidRequest(e.to_string()),
            Error::ConnectionClosed | Error::AlreadyClosed => Self::Closed,
            other => Self::Handshake(other.to_string()),
        }
    }
}

/// An inbound event on a physical connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame carrying one message envelope.
    Text(String),
    /// The connection was closed, by either side.
    Closed {
        /// The close code, if the peer sent one.
        code: Option<u16>,
        /// The close reason, empty if none was given.
        reason: String,
    },
    /// The connection failed with an error.
    Error(String),
}

/// A command for the writer side of a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCommand {
    /// Send a text frame.
    Send(String),
    /// Send a close frame and shut the writer down.
    Close,
}

/// One open physical connection.
///
/// Dropping the connection closes it.
#[derive(Debug)]
pub struct TransportConnection {
    url: String,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::UnboundedSender<TransportCommand>,
    read_task: Option<JoinHandle<()>>,
}

impl TransportConnection {
    /// Creates a new [`TransportConnection`] from its channel halves.
    ///
    /// `read_task` is the task feeding `events`, if any; it is aborted when the connection
    /// is dropped.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        commands: mpsc::UnboundedSender<TransportCommand>,
        read_task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            url: url.into(),
            events,
            commands,
            read_task,
        }
    }

    /// Returns the URL this connection was opened against.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Waits for the next inbound event.
    ///
    /// Returns `None` once the inbound side is exhausted.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Queues a text frame for sending.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer has already shut down.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.commands
            .send(TransportCommand::Send(text.into()))
            .map_err(|_| TransportError::Closed)
    }

    /// Closes the connection.
    ///
    /// Safe to call more than once.
    pub fn close(&self) {
        if self.commands.send(TransportCommand::Close).is_err() {
            tracing::trace!("Writer already closed for {}", self.url);
        }
    }
}

impl Drop for TransportConnection {
    fn drop(&mut self) {
        self.close();

        if let Some(task) = self.read_task.take()
            && !task.is_finished()
        {
            task.abort();
            tracing::debug!("Aborted task 'read'");
        }
    }
}

/// Opens physical connections to a push-notification endpoint.
#[async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// Opens a new connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn connect(&self, url: &str) -> Result<TransportConnection, TransportError>;
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[tokio::test]
    async fn test_connection_forwards_events_and_commands() {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let mut connection = TransportConnection::new("ws://test", event_rx, command_tx, None);

        event_tx.send(TransportEvent::Text("hello".into())).unwrap();
        assert_eq!(
            connection.next_event().await,
            Some(TransportEvent::Text("hello".into()))
        );

        connection.send_text("out").unwrap();
        assert_eq!(
            command_rx.recv().await,
            Some(TransportCommand::Send("out".into()))
        );
        assert_eq!(connection.url(), "ws://test");
    }

    #[rstest]
    #[tokio::test]
    async fn test_drop_sends_close() {
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let connection = TransportConnection::new("ws://test", event_rx, command_tx, None);

        drop(connection);

        assert_eq!(command_rx.recv().await, Some(TransportCommand::Close));
        assert_eq!(command_rx.recv().await, None);
    }

    #[rstest]
    fn test_send_after_writer_gone_errors() {
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let connection = TransportConnection::new("ws://test", event_rx, command_tx, None);
        drop(command_rx);

        assert!(matches!(
            connection.send_text("late"),
            Err(TransportError::Closed)
        ));
    }
}
