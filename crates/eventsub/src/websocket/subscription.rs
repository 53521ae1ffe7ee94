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

//! Subscription handles and their typed caller-facing wrapper.
//!
//! A [`SubscriptionHandle`] is the untyped record of caller intent for one topic: its spec,
//! registration status, and a sink decoding notification payloads. The session and the
//! registry share handles by `Arc`; the caller owns the typed [`Subscription`].
//!
//! Lifecycle: `Pending` (no registration ID) -> `Registered` -> `Revoked` (terminal), with
//! `Registered -> Pending` whenever the session registers the handle again after a welcome.
//! Every registration attempt carries a number; a completion for an older attempt is stale
//! and discarded, so a handle never holds two registration IDs.

use std::{
    fmt::Debug,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use ustr::Ustr;

use super::{
    messages::NotificationFrame,
    registry::{InstallOutcome, SubscriptionRegistry},
    session::EventSubSession,
};
use crate::{common::enums::SubscriptionState, registration::RegistrationRequest};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Topic, version, and ordered condition filters of one subscription.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionSpec {
    topic: Ustr,
    version: Ustr,
    filters: Vec<(String, String)>,
}

impl SubscriptionSpec {
    /// Creates a new [`SubscriptionSpec`] with no filters.
    #[must_use]
    pub fn new(topic: impl AsRef<str>, version: impl AsRef<str>) -> Self {
        Self {
            topic: Ustr::from(topic.as_ref()),
            version: Ustr::from(version.as_ref()),
            filters: Vec::new(),
        }
    }

    /// Appends a condition filter; insertion order is kept in the registration request.
    #[must_use]
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub const fn topic(&self) -> Ustr {
        self.topic
    }

    #[must_use]
    pub const fn version(&self) -> Ustr {
        self.version
    }

    #[must_use]
    pub fn filters(&self) -> &[(String, String)] {
        &self.filters
    }
}

/// Receives every routed notification; returns true if it was delivered.
pub type NotificationSink = Box<dyn Fn(&NotificationFrame) -> bool + Send + Sync>;

/// A decoded notification delivered to a [`Subscription`].
#[derive(Clone, Debug, PartialEq)]
pub struct EventNotification<T> {
    pub message_id: String,
    pub registration_id: String,
    pub topic: Ustr,
    pub timestamp: Option<DateTime<Utc>>,
    pub event: T,
}

/// Result of finishing a registration attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// The ID was assigned and installed; `displaced` previously owned it.
    Installed {
        displaced: Option<Arc<SubscriptionHandle>>,
    },
    /// A newer attempt started since; the ID was not assigned.
    Stale,
    /// The handle was revoked while the attempt was in flight.
    Revoked,
    /// The remote revoked the ID before the attempt completed; the handle is now revoked.
    RevokedByRemote,
}

/// Result of revoking a handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// The handle was already revoked.
    AlreadyRevoked,
    /// The handle is now revoked; carries the registration ID it held, if any.
    Revoked(Option<String>),
}

struct HandleInner {
    state: SubscriptionState,
    registration_id: Option<String>,
    attempt: u64,
    sink: Option<NotificationSink>,
}

/// Shared record of one subscription.
pub struct SubscriptionHandle {
    handle_id: u64,
    spec: SubscriptionSpec,
    inner: Mutex<HandleInner>,
}

impl Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (state, registration_id) = match self.inner.lock() {
            Ok(inner) => (inner.state, inner.registration_id.clone()),
            Err(_) => (SubscriptionState::Revoked, None),
        };
        f.debug_struct(stringify!(SubscriptionHandle))
            .field("handle_id", &self.handle_id)
            .field("topic", &self.spec.topic)
            .field("state", &state)
            .field("registration_id", &registration_id)
            .finish()
    }
}

impl SubscriptionHandle {
    /// Creates a new `Pending` [`SubscriptionHandle`].
    #[must_use]
    pub fn new(spec: SubscriptionSpec, sink: NotificationSink) -> Self {
        Self {
            handle_id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            spec,
            inner: Mutex::new(HandleInner {
                state: SubscriptionState::Pending,
                registration_id: None,
                attempt: 0,
                sink: Some(sink),
            }),
        }
    }

    /// Creates a new handle decoding payloads as `T` into `sender`.
    #[must_use]
    pub fn typed<T>(spec: SubscriptionSpec, sender: mpsc::UnboundedSender<EventNotification<T>>) -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        let sink = move |frame: &NotificationFrame| -> bool {
            match serde_json::from_value::<T>(frame.event.clone()) {
                Ok(event) => sender
                    .send(EventNotification {
                        message_id: frame.message_id.clone(),
                        registration_id: frame.registration_id.clone(),
                        topic: frame.topic,
                        timestamp: frame.timestamp,
                        event,
                    })
                    .is_ok(),
                Err(e) => {
                    tracing::warn!(
                        "Dropping '{}' notification {}: failed to decode payload: {e}",
                        frame.topic,
                        frame.message_id
                    );
                    false
                }
            }
        };
        Self::new(spec, Box::new(sink))
    }

    fn lock(&self) -> MutexGuard<'_, HandleInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Returns the process-unique local ID of this handle.
    #[must_use]
    pub const fn handle_id(&self) -> u64 {
        self.handle_id
    }

    #[must_use]
    pub const fn spec(&self) -> &SubscriptionSpec {
        &self.spec
    }

    #[must_use]
    pub const fn topic(&self) -> Ustr {
        self.spec.topic
    }

    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.lock().state
    }

    #[must_use]
    pub fn registration_id(&self) -> Option<String> {
        self.lock().registration_id.clone()
    }

    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.lock().state.is_terminal()
    }

    /// Builds the registration request binding this handle to `session_id`.
    #[must_use]
    pub fn registration_request(&self, session_id: impl Into<String>) -> RegistrationRequest {
        RegistrationRequest {
            topic: self.spec.topic,
            version: self.spec.version,
            filters: self.spec.filters.clone(),
            session_id: session_id.into(),
        }
    }

    /// Starts a new registration attempt and returns its number.
    ///
    /// Any registration ID held is cleared and its registry entry removed. Returns `None`
    /// if the handle is revoked.
    pub fn begin_attempt(handle: &Arc<Self>, registry: &SubscriptionRegistry) -> Option<u64> {
        let mut inner = handle.lock();
        if inner.state.is_terminal() {
            return None;
        }

        if let Some(previous) = inner.registration_id.take() {
            registry.remove_if_same(&previous, handle);
        }
        inner.state = SubscriptionState::Pending;
        inner.attempt += 1;
        Some(inner.attempt)
    }

    /// Finishes registration attempt `attempt` with the server-assigned `registration_id`.
    ///
    /// On success the handle becomes `Registered` and is installed in `registry` before
    /// the handle lock is released. A handle previously installed under the same ID is
    /// returned as displaced; the caller revokes it. An ID the remote already revoked
    /// revokes the handle instead.
    pub fn complete_attempt(
        handle: &Arc<Self>,
        attempt: u64,
        registration_id: &str,
        registry: &SubscriptionRegistry,
    ) -> AttemptOutcome {
        let mut inner = handle.lock();
        if inner.state.is_terminal() {
            return AttemptOutcome::Revoked;
        }
        if inner.attempt != attempt || inner.registration_id.is_some() {
            return AttemptOutcome::Stale;
        }

        match registry.install(registration_id, handle) {
            InstallOutcome::Installed { displaced } => {
                inner.state = SubscriptionState::Registered;
                inner.registration_id = Some(registration_id.to_string());
                AttemptOutcome::Installed { displaced }
            }
            InstallOutcome::RevokedEarly => {
                inner.state = SubscriptionState::Revoked;
                inner.sink = None;
                AttemptOutcome::RevokedByRemote
            }
        }
    }

    /// Marks the handle `Revoked` and closes its notification sink.
    ///
    /// Registry removal is the caller's concern.
    pub fn revoke(&self) -> RevokeOutcome {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return RevokeOutcome::AlreadyRevoked;
        }

        inner.state = SubscriptionState::Revoked;
        inner.sink = None;
        RevokeOutcome::Revoked(inner.registration_id.take())
    }

    /// Passes `notification` to the sink, returning true if it was delivered.
    pub fn deliver(&self, notification: &NotificationFrame) -> bool {
        let inner = self.lock();
        match &inner.sink {
            Some(sink) => sink(notification),
            None => false,
        }
    }
}

/// Caller-facing typed subscription for one topic.
///
/// Dropping a [`Subscription`] does not revoke the registration, call
/// [`Subscription::revoke_subscription`] for that.
pub struct Subscription<T> {
    handle: Arc<SubscriptionHandle>,
    receiver: mpsc::UnboundedReceiver<EventNotification<T>>,
    session: EventSubSession,
}

impl<T> Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Subscription))
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        handle: Arc<SubscriptionHandle>,
        receiver: mpsc::UnboundedReceiver<EventNotification<T>>,
        session: EventSubSession,
    ) -> Self {
        Self {
            handle,
            receiver,
            session,
        }
    }

    /// Waits for the next decoded notification.
    ///
    /// Returns `None` once the subscription is revoked and all queued notifications
    /// were received.
    pub async fn recv(&mut self) -> Option<EventNotification<T>> {
        self.receiver.recv().await
    }

    /// Returns the next queued notification without waiting.
    pub fn try_recv(&mut self) -> Option<EventNotification<T>> {
        self.receiver.try_recv().ok()
    }

    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.handle.state()
    }

    #[must_use]
    pub fn registration_id(&self) -> Option<String> {
        self.handle.registration_id()
    }

    #[must_use]
    pub fn topic(&self) -> Ustr {
        self.handle.topic()
    }

    #[must_use]
    pub const fn handle(&self) -> &Arc<SubscriptionHandle> {
        &self.handle
    }

    /// Revokes the subscription, unregistering it with the remote if registered.
    ///
    /// Returns true if the subscription was revoked by this call and the remote (if it had
    /// to be contacted) answered with a success status.
    pub async fn revoke_subscription(&self) -> bool {
        self.session.revoke_handle(&self.handle).await
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
