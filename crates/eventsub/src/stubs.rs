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

//! Test doubles for the session collaborators and builders for inbound frames.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use eventsub_network::transport::{
    Transport, TransportCommand, TransportConnection, TransportError, TransportEvent,
};
use rstest::fixture;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::{
    common::credential::Credential,
    config::EventSubConfig,
    registration::{RegistrationRequest, RegistrationResponse, RegistrationService},
};

#[fixture]
pub fn credential() -> Credential {
    Credential::user("test-token", "test-client", "1234")
}

/// Config requesting a 10 second keepalive with a 3 second margin and a fixed 1 second
/// reconnect delay.
#[fixture]
pub fn config() -> EventSubConfig {
    EventSubConfig::new()
        .with_url("wss://stub.test/ws")
        .with_keepalive_timeout_secs(10)
        .with_keepalive_margin_ms(3_000)
        .with_reconnect_delay_ms(1_000)
}

/// Yields long enough for the controller and registration tasks to catch up.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// The test side of one stub connection.
///
/// Dropping it closes the connection from the remote side.
#[derive(Debug)]
pub struct StubConnection {
    pub url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    commands: mpsc::UnboundedReceiver<TransportCommand>,
}

impl StubConnection {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Text(text.into()));
    }

    pub fn send_close(&self, code: u16) {
        let _ = self.events.send(TransportEvent::Closed {
            code: Some(code),
            reason: "stub".to_string(),
        });
    }

    pub fn send_error(&self, error: &str) {
        let _ = self.events.send(TransportEvent::Error(error.to_string()));
    }

    /// Returns true once the session asked to close this connection.
    pub fn is_closed_by_client(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(TransportCommand::Close) => return true,
                Ok(TransportCommand::Send(_)) => {}
                Err(mpsc::error::TryRecvError::Empty) => return false,
                Err(mpsc::error::TryRecvError::Disconnected) => return true,
            }
        }
    }
}

/// Hands every opened connection to the test over a channel.
#[derive(Debug)]
pub struct StubTransport {
    connections_tx: mpsc::UnboundedSender<StubConnection>,
    urls: Mutex<Vec<String>>,
    fail_remaining: AtomicUsize,
}

impl StubTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<StubConnection>) {
        let (connections_tx, connections_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            connections_tx,
            urls: Mutex::new(Vec::new()),
            fail_remaining: AtomicUsize::new(0),
        });
        (transport, connections_rx)
    }

    /// Fails the next `count` connection attempts.
    pub fn fail_next(&self, count: usize) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Returns the URL of every connection attempt, failed ones included.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.urls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn connect(&self, url: &str) -> Result<TransportConnection, TransportError> {
        self.urls.lock().unwrap().push(url.to_string());

        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Handshake("stub refused".to_string()));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let _ = self.connections_tx.send(StubConnection {
            url: url.to_string(),
            events: events_tx,
            commands: commands_rx,
        });

        Ok(TransportConnection::new(url, events_rx, commands_tx, None))
    }
}

/// Records registration traffic and answers from a configurable script.
#[derive(Debug, Default)]
pub struct StubRegistrationService {
    requests: Mutex<Vec<RegistrationRequest>>,
    unregistered: Mutex<Vec<String>>,
    next_id: AtomicU64,
    fixed_id: Mutex<Option<String>>,
    reject_status: AtomicU16,
    delay: Mutex<Option<Duration>>,
}

impl StubRegistrationService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answers every registration with `status` and no ID.
    pub fn reject_with(&self, status: u16) {
        self.reject_status.store(status, Ordering::SeqCst);
    }

    /// Answers every registration with `registration_id` instead of a fresh one.
    pub fn always_assign(&self, registration_id: &str) {
        *self.fixed_id.lock().unwrap() = Some(registration_id.to_string());
    }

    /// Delays every registration answer by `delay`.
    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn requests(&self) -> Vec<RegistrationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn register_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn unregistered(&self) -> Vec<String> {
        self.unregistered.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistrationService for StubRegistrationService {
    async fn register(
        &self,
        _credential: &Credential,
        request: &RegistrationRequest,
    ) -> RegistrationResponse {
        self.requests.lock().unwrap().push(request.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reject_status = self.reject_status.load(Ordering::SeqCst);
        if reject_status != 0 {
            return RegistrationResponse::rejected(reject_status);
        }

        let fixed_id = self.fixed_id.lock().unwrap().clone();
        let registration_id = fixed_id.unwrap_or_else(|| {
            format!("reg-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
        });
        RegistrationResponse::accepted(registration_id, 202)
    }

    async fn unregister(&self, _credential: &Credential, registration_id: &str) -> u16 {
        self.unregistered
            .lock()
            .unwrap()
            .push(registration_id.to_string());
        204
    }
}

fn frame(message_id: &str, message_type: &str, payload: Value) -> String {
    json!({
        "metadata": {
            "message_id": message_id,
            "message_type": message_type,
            "message_timestamp": "2023-07-19T14:56:51.634234626Z",
        },
        "payload": payload,
    })
    .to_string()
}

pub fn welcome_frame(session_id: &str, keepalive_secs: u64) -> String {
    frame(
        &format!("welcome-{session_id}"),
        "session_welcome",
        json!({
            "session": {
                "id": session_id,
                "status": "connected",
                "connected_at": "2023-07-19T14:56:51.616329898Z",
                "keepalive_timeout_seconds": keepalive_secs,
                "reconnect_url": null,
            }
        }),
    )
}

pub fn keepalive_frame(message_id: &str) -> String {
    frame(message_id, "session_keepalive", json!({}))
}

pub fn notification_frame(
    message_id: &str,
    registration_id: &str,
    topic: &str,
    event: Value,
) -> String {
    frame(
        message_id,
        "notification",
        json!({
            "subscription": {
                "id": registration_id,
                "status": "enabled",
                "type": topic,
                "version": "1",
                "cost": 0,
            },
            "event": event,
        }),
    )
}

pub fn reconnect_frame(session_id: &str, reconnect_url: &str) -> String {
    frame(
        &format!("reconnect-{session_id}"),
        "session_reconnect",
        json!({
            "session": {
                "id": session_id,
                "status": "reconnecting",
                "keepalive_timeout_seconds": null,
                "reconnect_url": reconnect_url,
            }
        }),
    )
}

pub fn revocation_frame(
    message_id: &str,
    registration_id: &str,
    topic: &str,
    status: &str,
) -> String {
    frame(
        message_id,
        "revocation",
        json!({
            "subscription": {
                "id": registration_id,
                "status": status,
                "type": topic,
                "version": "1",
                "cost": 0,
            }
        }),
    )
}
