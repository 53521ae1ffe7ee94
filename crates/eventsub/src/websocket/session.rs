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

//! The EventSub session controller.
//!
//! **Design**:
//! - One controller task owns the physical connection. It is the only code that opens,
//!   closes, or replaces it, and it routes inbound frames in arrival order.
//! - Abnormal close, transport error, and keepalive timeout reconnect to the configured
//!   endpoint after the backoff delay. A redirect frame reconnects to the supplied URL at
//!   once; the URL is used for that single attempt.
//! - Every welcome registers each live subscription again from scratch, whether the
//!   connection was a redirect or not.
//! - Registration calls run as separate tasks and may complete concurrently; stale
//!   completions are discarded by attempt number.
//! - [`EventSubSession::disconnect`] is the only cancellation primitive; it stops the
//!   controller so no reconnect follows.

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::AtomicU8,
    },
    time::Duration,
};

use eventsub_network::{
    backoff::ExponentialBackoff,
    mode::ConnectionState,
    transport::{Transport, TransportEvent},
    watchdog::KeepaliveWatchdog,
    websocket::WebSocketTransport,
};
use serde::de::DeserializeOwned;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use super::{
    messages::SessionWelcome,
    registry::SubscriptionRegistry,
    router::{MessageRouter, RouteDirective},
    subscription::{
        AttemptOutcome, RevokeOutcome, Subscription, SubscriptionHandle, SubscriptionSpec,
    },
};
use crate::{
    common::{consts::DISCONNECT_TIMEOUT, credential::Credential, enums::TokenType},
    config::EventSubConfig,
    error::{EventSubError, EventSubResult},
    http::client::HttpRegistrationService,
    registration::{RegistrationService, is_success_status},
};

/// Why the controller left a connection.
#[derive(Debug)]
enum ConnectionExit {
    Stop,
    Redirect(String),
    KeepaliveTimeout(Duration),
    Closed { code: Option<u16>, reason: String },
    Error(String),
}

/// Session identity and the subscriptions to register on every welcome.
#[derive(Debug)]
struct SessionGate {
    welcomed: bool,
    session_id: Option<String>,
    keepalive_secs: u64,
    live: Vec<Arc<SubscriptionHandle>>,
}

#[derive(Debug)]
struct ControllerRun {
    task: JoinHandle<()>,
    stop_tx: oneshot::Sender<()>,
}

#[derive(Debug)]
pub(crate) struct SessionInner {
    config: EventSubConfig,
    connect_url: String,
    credential: Credential,
    transport: Arc<dyn Transport>,
    registration: Arc<dyn RegistrationService>,
    registry: Arc<SubscriptionRegistry>,
    state: AtomicU8,
    gate: Mutex<SessionGate>,
    run: Mutex<Option<ControllerRun>>,
}

/// A persistent EventSub session delivering events to its subscriptions.
///
/// Cheap to clone, all clones share one session.
#[derive(Clone, Debug)]
pub struct EventSubSession {
    inner: Arc<SessionInner>,
}

impl EventSubSession {
    /// Creates a new disconnected [`EventSubSession`].
    ///
    /// # Errors
    ///
    /// Returns [`EventSubError::Configuration`] if `config` is invalid, or if `credential`
    /// is not a user access token or holds no token.
    pub fn new(
        config: EventSubConfig,
        credential: Credential,
        transport: Arc<dyn Transport>,
        registration: Arc<dyn RegistrationService>,
    ) -> EventSubResult<Self> {
        config.validate()?;

        if credential.token_type() != TokenType::User {
            return Err(EventSubError::config(format!(
                "WebSocket sessions require a {} access token, was {}",
                TokenType::User,
                credential.token_type()
            )));
        }
        if credential.is_empty() {
            return Err(EventSubError::config("credential holds no access token"));
        }

        let connect_url = config.connect_url()?;
        let keepalive_secs = config.default_keepalive_secs;

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                connect_url,
                credential,
                transport,
                registration,
                registry: Arc::new(SubscriptionRegistry::new()),
                state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
                gate: Mutex::new(SessionGate {
                    welcomed: false,
                    session_id: None,
                    keepalive_secs,
                    live: Vec::new(),
                }),
                run: Mutex::new(None),
            }),
        })
    }

    /// Creates a new [`EventSubSession`] using the WebSocket transport and the HTTP
    /// registration service.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or credential is invalid, or if the HTTP
    /// client cannot be created.
    pub fn from_config(config: EventSubConfig, credential: Credential) -> EventSubResult<Self> {
        let transport = Arc::new(WebSocketTransport::new(Vec::new(), config.connect_timeout()));
        let registration = Arc::new(HttpRegistrationService::from_config(&config)?);
        Self::new(config, credential, transport, registration)
    }

    #[must_use]
    pub fn config(&self) -> &EventSubConfig {
        &self.inner.config
    }

    /// Returns the URL of the initial connection.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.connect_url
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_atomic(&self.inner.state)
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }

    /// Returns the session identity, `None` until a welcome frame was received.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.inner.lock_gate().session_id.clone()
    }

    /// Returns the keepalive interval of the current session, in seconds.
    #[must_use]
    pub fn keepalive_secs(&self) -> u64 {
        self.inner.lock_gate().keepalive_secs
    }

    /// Returns the number of subscriptions which are not revoked.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner
            .lock_gate()
            .live
            .iter()
            .filter(|handle| !handle.is_revoked())
            .count()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.inner.registry
    }

    /// Starts the session controller.
    ///
    /// Returns immediately, the connection and welcome handshake happen in the background.
    /// Does nothing if the controller is already running (connecting, awaiting welcome,
    /// live, or reconnecting). Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut run = self.inner.lock_run();

        if let Some(existing) = run.as_ref()
            && !existing.task.is_finished()
        {
            tracing::debug!("Connect ignored, session is {}", self.state());
            return;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        self.inner.set_state(ConnectionState::Connecting);

        let task = tokio::task::spawn(Arc::clone(&self.inner).run_controller(stop_rx));
        *run = Some(ControllerRun { task, stop_tx });
    }

    /// Stops the session controller and closes the connection.
    ///
    /// No reconnect follows. Waits up to five seconds for the controller to finish and
    /// aborts it after that. Subscriptions are kept and register again on the next
    /// [`EventSubSession::connect`].
    pub async fn disconnect(&self) {
        let run = self.inner.lock_run().take();
        let Some(ControllerRun { mut task, stop_tx }) = run else {
            tracing::debug!("Disconnect ignored, session not connected");
            return;
        };

        if stop_tx.send(()).is_err() {
            tracing::debug!("Controller already stopped");
        }

        match tokio::time::timeout(DISCONNECT_TIMEOUT, &mut task).await {
            Ok(Ok(())) => tracing::debug!("Controller task completed"),
            Ok(Err(e)) => tracing::error!("Controller task failed: {e}"),
            Err(_) => {
                tracing::warn!("Timeout waiting for controller task to complete, aborting");
                task.abort();
            }
        }

        self.inner.invalidate_session();
        self.inner.set_state(ConnectionState::Disconnected);
        tracing::info!("Disconnected from {}", self.inner.connect_url);
    }

    /// Waits until the session is live.
    ///
    /// # Errors
    ///
    /// Returns [`EventSubError::NotConnected`] if the session is not live within `timeout`.
    pub async fn wait_until_live(&self, timeout: Duration) -> EventSubResult<()> {
        tokio::time::timeout(timeout, async {
            while !self.is_live() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .map_err(|_| EventSubError::NotConnected)
    }

    /// Creates a subscription delivering `spec` events decoded as `T`.
    ///
    /// The subscription registers once the session is welcomed (at once if it already is)
    /// and again after every later welcome. Registration failures are logged and leave the
    /// subscription `Pending` until the next welcome.
    pub fn create_subscription<T>(&self, spec: SubscriptionSpec) -> Subscription<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(SubscriptionHandle::typed(spec, tx));
        self.inner.install(&handle);
        Subscription::new(handle, rx, self.clone())
    }

    pub(crate) async fn revoke_handle(&self, handle: &Arc<SubscriptionHandle>) -> bool {
        self.inner.revoke(handle).await
    }
}

impl SessionInner {
    fn lock_gate(&self) -> MutexGuard<'_, SessionGate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_run(&self) -> MutexGuard<'_, Option<ControllerRun>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = ConnectionState::from_atomic(&self.state);
        state.store(&self.state);
        if previous != state {
            tracing::debug!("Session state {previous} -> {state}");
        }
    }

    fn invalidate_session(&self) {
        let mut gate = self.lock_gate();
        gate.welcomed = false;
        gate.session_id = None;
    }

    /// Adds `handle` to the live set and registers it if the session is welcomed.
    fn install(self: &Arc<Self>, handle: &Arc<SubscriptionHandle>) {
        let pending = {
            let mut gate = self.lock_gate();
            gate.live.push(Arc::clone(handle));

            match (&gate.session_id, gate.welcomed) {
                (Some(session_id), true) => {
                    SubscriptionHandle::begin_attempt(handle, &self.registry)
                        .map(|attempt| (attempt, session_id.clone()))
                }
                _ => None,
            }
        };

        match pending {
            Some((attempt, session_id)) => {
                self.spawn_registration(Arc::clone(handle), attempt, session_id);
            }
            None => tracing::debug!(
                "Subscription '{}' registers after the next welcome",
                handle.topic()
            ),
        }
    }

    fn on_welcome(self: &Arc<Self>, welcome: &SessionWelcome, keepalive: Duration) {
        let attempts: Vec<(Arc<SubscriptionHandle>, u64)> = {
            let mut gate = self.lock_gate();
            gate.welcomed = true;
            gate.session_id = Some(welcome.session_id.clone());
            gate.keepalive_secs = keepalive.as_secs();
            gate.live.retain(|handle| !handle.is_revoked());

            gate.live
                .iter()
                .filter_map(|handle| {
                    SubscriptionHandle::begin_attempt(handle, &self.registry)
                        .map(|attempt| (Arc::clone(handle), attempt))
                })
                .collect()
        };

        self.set_state(ConnectionState::Live);
        tracing::info!(
            "Session {} welcomed (keepalive {}s), registering {} subscription(s)",
            welcome.session_id,
            keepalive.as_secs(),
            attempts.len()
        );

        for (handle, attempt) in attempts {
            self.spawn_registration(handle, attempt, welcome.session_id.clone());
        }
    }

    fn spawn_registration(
        self: &Arc<Self>,
        handle: Arc<SubscriptionHandle>,
        attempt: u64,
        session_id: String,
    ) {
        let inner = Arc::clone(self);
        tokio::task::spawn(async move {
            inner.register(handle, attempt, session_id).await;
        });
    }

    async fn register(&self, handle: Arc<SubscriptionHandle>, attempt: u64, session_id: String) {
        let request = handle.registration_request(session_id);
        let response = self.registration.register(&self.credential, &request).await;

        let Some(registration_id) = response.accepted_id() else {
            tracing::warn!(
                "Registration of '{}' failed with status {} (filters: {})",
                request.topic,
                response.status,
                request.filters_display()
            );
            return;
        };

        match SubscriptionHandle::complete_attempt(&handle, attempt, registration_id, &self.registry)
        {
            AttemptOutcome::Installed { displaced } => {
                tracing::info!("Registered '{}' as {registration_id}", request.topic);

                if let Some(displaced) = displaced {
                    tracing::warn!(
                        "Registration ID {registration_id} reissued, revoking previous '{}' subscription",
                        displaced.topic()
                    );
                    displaced.revoke();
                }
            }
            AttemptOutcome::Stale => tracing::debug!(
                "Discarding stale registration {registration_id} for '{}'",
                request.topic
            ),
            AttemptOutcome::RevokedByRemote => tracing::warn!(
                "Subscription '{}' ({registration_id}) revoked by remote before registration completed",
                request.topic
            ),
            AttemptOutcome::Revoked => {
                tracing::debug!(
                    "Subscription '{}' revoked while registering, unregistering {registration_id}",
                    request.topic
                );
                let status = self
                    .registration
                    .unregister(&self.credential, registration_id)
                    .await;
                if !is_success_status(status) {
                    tracing::warn!(
                        "Unregistration of {registration_id} failed with status {status}"
                    );
                }
            }
        }
    }

    async fn revoke(&self, handle: &Arc<SubscriptionHandle>) -> bool {
        let registration_id = match handle.revoke() {
            RevokeOutcome::AlreadyRevoked => {
                tracing::debug!("Subscription '{}' already revoked", handle.topic());
                return false;
            }
            RevokeOutcome::Revoked(registration_id) => registration_id,
        };

        self.lock_gate()
            .live
            .retain(|live| !Arc::ptr_eq(live, handle));

        let Some(registration_id) = registration_id else {
            tracing::info!("Revoked pending subscription '{}'", handle.topic());
            return true;
        };

        self.registry.remove_if_same(&registration_id, handle);

        let status = self
            .registration
            .unregister(&self.credential, &registration_id)
            .await;

        if is_success_status(status) {
            tracing::info!("Revoked '{}' ({registration_id})", handle.topic());
            true
        } else {
            tracing::warn!(
                "Unregistration of '{}' ({registration_id}) failed with status {status}",
                handle.topic()
            );
            false
        }
    }

    async fn wait_backoff(
        &self,
        backoff: &mut ExponentialBackoff,
        stop_rx: &mut oneshot::Receiver<()>,
    ) -> bool {
        let delay = backoff.next_duration();
        self.set_state(ConnectionState::Reconnecting);
        tracing::debug!("Reconnecting in {delay:?}");

        tokio::select! {
            biased;
            _ = stop_rx => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    async fn run_controller(self: Arc<Self>, mut stop_rx: oneshot::Receiver<()>) {
        tracing::debug!("Started task 'controller'");

        let mut backoff = self.config.backoff().unwrap_or_else(|e| {
            tracing::error!("Invalid backoff configuration, using fixed delay: {e}");
            ExponentialBackoff::fixed(Duration::from_millis(self.config.reconnect_delay_initial_ms))
        });
        let (watchdog, mut timeout_rx) = KeepaliveWatchdog::new(self.config.keepalive_margin());
        let watchdog = Arc::new(watchdog);
        let mut router = MessageRouter::new(
            Arc::clone(&self.registry),
            Arc::clone(&watchdog),
            self.config.default_keepalive(),
            self.config.message_id_cache_size,
        );

        let mut redirect: Option<String> = None;
        let mut first_attempt = true;

        'controller: loop {
            let url = redirect.take().unwrap_or_else(|| self.connect_url.clone());
            self.set_state(if first_attempt {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            });
            first_attempt = false;

            tracing::debug!("Connecting to {url}");
            let result = tokio::select! {
                biased;
                _ = &mut stop_rx => break 'controller,
                result = self.transport.connect(&url) => result,
            };

            let mut connection = match result {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::warn!("Failed to connect to {url}: {e}");
                    if self.wait_backoff(&mut backoff, &mut stop_rx).await {
                        continue;
                    }
                    break;
                }
            };

            self.set_state(ConnectionState::AwaitingWelcome);
            router.reset_session();
            watchdog.reset(router.keepalive());

            let exit = loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break ConnectionExit::Stop,
                    Some(timeout) = timeout_rx.recv() => {
                        if timeout.generation == watchdog.generation() {
                            break ConnectionExit::KeepaliveTimeout(timeout.deadline);
                        }
                        tracing::trace!("Ignoring superseded watchdog timeout");
                    }
                    event = connection.next_event() => match event {
                        Some(TransportEvent::Text(text)) => {
                            tracing::trace!("Received frame: {text}");
                            match router.route(&text) {
                                RouteDirective::None => {}
                                RouteDirective::Welcome(welcome) => {
                                    backoff.reset();
                                    self.on_welcome(&welcome, router.keepalive());
                                }
                                RouteDirective::Redirect(url) => {
                                    break ConnectionExit::Redirect(url);
                                }
                            }
                        }
                        Some(TransportEvent::Closed { code, reason }) => {
                            break ConnectionExit::Closed { code, reason };
                        }
                        Some(TransportEvent::Error(e)) => break ConnectionExit::Error(e),
                        None => {
                            break ConnectionExit::Closed {
                                code: None,
                                reason: String::new(),
                            };
                        }
                    },
                }
            };

            watchdog.stop();
            connection.close();
            drop(connection);
            self.invalidate_session();

            match exit {
                ConnectionExit::Stop => break,
                ConnectionExit::Redirect(url) => {
                    tracing::info!("Redirected to {url}");
                    redirect = Some(url);
                    continue;
                }
                ConnectionExit::KeepaliveTimeout(deadline) => {
                    tracing::warn!("No frame received within {deadline:?}, reconnecting");
                }
                ConnectionExit::Closed { code, reason } => {
                    tracing::warn!("Connection closed (code={code:?}, reason='{reason}'), reconnecting");
                }
                ConnectionExit::Error(e) => {
                    tracing::error!("Connection error: {e}, reconnecting");
                }
            }

            if !self.wait_backoff(&mut backoff, &mut stop_rx).await {
                break;
            }
        }

        watchdog.stop();
        self.invalidate_session();
        self.set_state(ConnectionState::Disconnected);
        tracing::debug!("Completed task 'controller'");
    }
}
