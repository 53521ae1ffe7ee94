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

//! Inbound frame routing.
//!
//! The [`MessageRouter`] classifies each text frame and dispatches it to the keepalive
//! watchdog, the matching subscription handle, or back to the session controller as a
//! [`RouteDirective`]. Routing never fails: malformed and unroutable frames are logged and
//! dropped. Every successfully parsed frame resets the watchdog before it is dispatched,
//! malformed frames do not.
//!
//! A welcome keepalive of zero or above [`MAX_KEEPALIVE_SECS`] is replaced by the default
//! interval.
//!
//! A revocation for a registration ID whose `register` call has not returned yet is
//! remembered by the registry, and the subscription is revoked once that call completes.

use std::{sync::Arc, time::Duration};

use eventsub_network::watchdog::KeepaliveWatchdog;

use crate::common::consts::MAX_KEEPALIVE_SECS;

use super::{
    cache::MessageIdCache,
    messages::{EventSubMessage, NotificationFrame, RevocationFrame, SessionReconnect, SessionWelcome},
    parse::parse_frame,
    registry::SubscriptionRegistry,
    subscription::RevokeOutcome,
};

/// Work the session controller must do after a frame was routed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteDirective {
    /// Nothing further.
    None,
    /// The connection was welcomed and the session identity is known.
    Welcome(SessionWelcome),
    /// The remote asked for a migration to the given URL.
    Redirect(String),
}

/// Classifies and dispatches the frames of one session.
#[derive(Debug)]
pub struct MessageRouter {
    registry: Arc<SubscriptionRegistry>,
    watchdog: Arc<KeepaliveWatchdog>,
    message_ids: MessageIdCache,
    default_keepalive: Duration,
    keepalive: Duration,
    session_id: Option<String>,
}

impl MessageRouter {
    /// Creates a new [`MessageRouter`].
    #[must_use]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        watchdog: Arc<KeepaliveWatchdog>,
        default_keepalive: Duration,
        message_id_cache_size: usize,
    ) -> Self {
        Self {
            registry,
            watchdog,
            message_ids: MessageIdCache::new(message_id_cache_size),
            default_keepalive,
            keepalive: default_keepalive,
            session_id: None,
        }
    }

    /// Forgets the session identity and keepalive of the previous connection.
    ///
    /// Recently seen message IDs are kept since the remote may redeliver across connections.
    pub fn reset_session(&mut self) {
        self.session_id = None;
        self.keepalive = self.default_keepalive;
    }

    /// Returns the identity of the current session, if welcomed.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Returns the keepalive interval the watchdog is armed with.
    #[must_use]
    pub const fn keepalive(&self) -> Duration {
        self.keepalive
    }

    /// Routes one inbound text frame.
    pub fn route(&mut self, text: &str) -> RouteDirective {
        let message = match parse_frame(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping malformed frame: {e}");
                tracing::trace!("Malformed frame: {text}");
                return RouteDirective::None;
            }
        };

        if let EventSubMessage::Welcome(welcome) = &message
            && self.session_id.is_none()
            && let Some(secs) = welcome.keepalive_secs
        {
            self.keepalive = self.welcome_keepalive(secs);
        }
        self.watchdog.reset(self.keepalive);

        self.dispatch(message)
    }

    fn welcome_keepalive(&self, secs: u64) -> Duration {
        if (1..=MAX_KEEPALIVE_SECS).contains(&secs) {
            Duration::from_secs(secs)
        } else {
            tracing::warn!(
                "Welcome keepalive {secs}s out of range, using default {:?}",
                self.default_keepalive
            );
            self.default_keepalive
        }
    }

    fn dispatch(&mut self, message: EventSubMessage) -> RouteDirective {
        match message {
            EventSubMessage::Welcome(welcome) => self.handle_welcome(welcome),
            EventSubMessage::Keepalive { message_id } => {
                tracing::trace!("Keepalive {message_id}");
                RouteDirective::None
            }
            EventSubMessage::Notification(notification) => {
                self.handle_notification(&notification);
                RouteDirective::None
            }
            EventSubMessage::Reconnect(reconnect) => self.handle_reconnect(reconnect),
            EventSubMessage::Revocation(revocation) => {
                self.handle_revocation(&revocation);
                RouteDirective::None
            }
            EventSubMessage::Unrecognized { message_type } => {
                tracing::debug!("Dropping unrecognized message type '{message_type}'");
                RouteDirective::None
            }
        }
    }

    fn handle_welcome(&mut self, welcome: SessionWelcome) -> RouteDirective {
        if let Some(current) = &self.session_id {
            tracing::warn!(
                "Ignoring welcome for {} on session {current} already welcomed",
                welcome.session_id
            );
            return RouteDirective::None;
        }

        self.session_id = Some(welcome.session_id.clone());
        RouteDirective::Welcome(welcome)
    }

    fn handle_notification(&mut self, notification: &NotificationFrame) {
        if !self.message_ids.insert(&notification.message_id) {
            tracing::debug!(
                "Dropping duplicate notification {}",
                notification.message_id
            );
            return;
        }

        let Some(handle) = self.registry.get(&notification.registration_id) else {
            tracing::debug!(
                "Dropping '{}' notification for unknown registration {}",
                notification.topic,
                notification.registration_id
            );
            return;
        };

        if !handle.deliver(notification) {
            tracing::debug!(
                "Notification {} not delivered to '{}' subscription",
                notification.message_id,
                handle.topic()
            );
        }
    }

    fn handle_reconnect(&self, reconnect: SessionReconnect) -> RouteDirective {
        match &self.session_id {
            Some(current) if *current == reconnect.session_id => {
                RouteDirective::Redirect(reconnect.reconnect_url)
            }
            current => {
                tracing::warn!(
                    "Ignoring reconnect for session {} (current {current:?})",
                    reconnect.session_id
                );
                RouteDirective::None
            }
        }
    }

    fn handle_revocation(&self, revocation: &RevocationFrame) {
        let Some(handle) = self.registry.revoke_remote(&revocation.registration_id) else {
            tracing::debug!(
                "Revocation for unknown registration {}, remembering it",
                revocation.registration_id
            );
            return;
        };

        if let RevokeOutcome::Revoked(_) = handle.revoke() {
            tracing::warn!(
                "Subscription '{}' ({}) revoked by remote: {}",
                handle.topic(),
                revocation.registration_id,
                revocation.status
            );
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        common::enums::SubscriptionState,
        stubs::{
            keepalive_frame, notification_frame, reconnect_frame, revocation_frame, welcome_frame,
        },
        websocket::subscription::{EventNotification, SubscriptionHandle, SubscriptionSpec},
    };

    struct Fixture {
        router: MessageRouter,
        registry: Arc<SubscriptionRegistry>,
        watchdog: Arc<KeepaliveWatchdog>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (watchdog, _rx) = KeepaliveWatchdog::new(Duration::from_secs(3));
        let watchdog = Arc::new(watchdog);
        let router = MessageRouter::new(
            Arc::clone(&registry),
            Arc::clone(&watchdog),
            Duration::from_secs(10),
            16,
        );
        Fixture {
            router,
            registry,
            watchdog,
        }
    }

    fn registered(
        registry: &SubscriptionRegistry,
        registration_id: &str,
    ) -> (
        Arc<SubscriptionHandle>,
        mpsc::UnboundedReceiver<EventNotification<serde_json::Value>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(SubscriptionHandle::typed(
            SubscriptionSpec::new("channel.ban", "1"),
            tx,
        ));
        let attempt = SubscriptionHandle::begin_attempt(&handle, registry).unwrap();
        SubscriptionHandle::complete_attempt(&handle, attempt, registration_id, registry);
        (handle, rx)
    }

    #[rstest]
    #[tokio::test]
    async fn test_welcome_sets_session_and_keepalive() {
        let mut f = fixture();

        let directive = f.router.route(&welcome_frame("S1", 30));

        assert!(matches!(directive, RouteDirective::Welcome(w) if w.session_id == "S1"));
        assert_eq!(f.router.session_id(), Some("S1"));
        assert_eq!(f.router.keepalive(), Duration::from_secs(30));
        assert_eq!(f.watchdog.generation(), 1);
    }

    #[rstest]
    #[case(0)]
    #[case(MAX_KEEPALIVE_SECS + 1)]
    #[case(u64::MAX)]
    #[tokio::test]
    async fn test_out_of_range_keepalive_uses_default(#[case] secs: u64) {
        let mut f = fixture();

        let directive = f.router.route(&welcome_frame("S1", secs));

        assert!(matches!(directive, RouteDirective::Welcome(_)));
        assert_eq!(f.router.keepalive(), Duration::from_secs(10));
        assert_eq!(f.watchdog.generation(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_second_welcome_is_ignored() {
        let mut f = fixture();
        f.router.route(&welcome_frame("S1", 30));

        let directive = f.router.route(&welcome_frame("S2", 60));

        assert_eq!(directive, RouteDirective::None);
        assert_eq!(f.router.session_id(), Some("S1"));
        assert_eq!(f.router.keepalive(), Duration::from_secs(30));
        assert_eq!(f.watchdog.generation(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_every_parsed_frame_resets_watchdog() {
        let mut f = fixture();
        f.router.route(&welcome_frame("S1", 10));
        f.router.route(&keepalive_frame("k-1"));
        f.router.route(&notification_frame("n-1", "unknown", "channel.ban", json!({})));
        f.router.route(r#"{"metadata":{"message_id":"x","message_type":"other"},"payload":{}}"#);

        assert_eq!(f.watchdog.generation(), 4);
    }

    #[rstest]
    #[tokio::test]
    async fn test_malformed_frame_does_not_reset_watchdog() {
        let mut f = fixture();

        assert_eq!(f.router.route("{not json"), RouteDirective::None);
        assert_eq!(
            f.router
                .route(r#"{"metadata":{"message_id":"1","message_type":"session_welcome"}}"#),
            RouteDirective::None
        );
        assert_eq!(f.watchdog.generation(), 0);
        assert!(f.router.session_id().is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn test_notification_delivered_to_registered_handle() {
        let mut f = fixture();
        let (_handle, mut rx) = registered(&f.registry, "reg-1");

        f.router.route(&notification_frame(
            "n-1",
            "reg-1",
            "channel.ban",
            json!({"user_id": "1234"}),
        ));

        let notification = rx.try_recv().unwrap();
        assert_eq!(notification.message_id, "n-1");
        assert_eq!(notification.event["user_id"], "1234");
    }

    #[rstest]
    #[tokio::test]
    async fn test_duplicate_notification_dropped() {
        let mut f = fixture();
        let (_handle, mut rx) = registered(&f.registry, "reg-1");
        let frame = notification_frame("n-1", "reg-1", "channel.ban", json!({}));

        f.router.route(&frame);
        f.router.route(&frame);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(f.watchdog.generation(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_reconnect_for_current_session_redirects() {
        let mut f = fixture();
        f.router.route(&welcome_frame("S1", 10));

        let directive = f.router.route(&reconnect_frame("S1", "wss://alt"));

        assert_eq!(directive, RouteDirective::Redirect("wss://alt".to_string()));
    }

    #[rstest]
    #[case(None)]
    #[case(Some("S2"))]
    #[tokio::test]
    async fn test_reconnect_for_other_session_ignored(#[case] welcomed: Option<&str>) {
        let mut f = fixture();
        if let Some(session_id) = welcomed {
            f.router.route(&welcome_frame(session_id, 10));
        }

        let directive = f.router.route(&reconnect_frame("S1", "wss://alt"));

        assert_eq!(directive, RouteDirective::None);
    }

    #[rstest]
    #[tokio::test]
    async fn test_revocation_removes_routing() {
        let mut f = fixture();
        let (handle, mut rx) = registered(&f.registry, "reg-1");

        f.router
            .route(&revocation_frame("r-1", "reg-1", "channel.ban", "user_removed"));

        assert_eq!(handle.state(), SubscriptionState::Revoked);
        assert!(handle.registration_id().is_none());
        assert!(f.registry.is_empty());

        f.router
            .route(&notification_frame("n-1", "reg-1", "channel.ban", json!({})));
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_reset_session_restores_default_keepalive() {
        let mut f = fixture();
        f.router.route(&welcome_frame("S1", 30));

        f.router.reset_session();

        assert!(f.router.session_id().is_none());
        assert_eq!(f.router.keepalive(), Duration::from_secs(10));
    }
}
