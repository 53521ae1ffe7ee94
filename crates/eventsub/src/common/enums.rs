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

//! Enumerations modelling EventSub string enums and local lifecycle states.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Kind of access token held by a [`Credential`](crate::common::credential::Credential).
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
#[strum(serialize_all = "snake_case")]
pub enum TokenType {
    /// User access token, required by the WebSocket transport.
    User,
    /// App access token.
    App,
}

/// Local registration status of a subscription handle.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Display,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum SubscriptionState {
    /// Constructed, or waiting to register again, with no registration ID.
    #[default]
    Pending,
    /// The remote accepted the registration.
    Registered,
    /// Terminal.
    Revoked,
}

impl SubscriptionState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Revoked)
    }
}

/// Reason carried by a revocation frame.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RevocationReason {
    /// The user revoked the authorization token the subscription relied on.
    AuthorizationRevoked,
    /// The user in the condition is no longer active.
    UserRemoved,
    /// The callback failed to respond in a timely manner too many times.
    NotificationFailuresExceeded,
    /// The subscribed type and version is no longer supported.
    VersionRemoved,
    /// Any status the client does not know about.
    Other,
}

impl RevocationReason {
    /// Parses a revocation status, mapping unknown values to [`RevocationReason::Other`].
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        status.parse().unwrap_or(Self::Other)
    }
}

/// Value of `metadata.message_type` on an inbound envelope.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageType {
    SessionWelcome,
    SessionKeepalive,
    Notification,
    SessionReconnect,
    Revocation,
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("authorization_revoked", RevocationReason::AuthorizationRevoked)]
    #[case("user_removed", RevocationReason::UserRemoved)]
    #[case(
        "notification_failures_exceeded",
        RevocationReason::NotificationFailuresExceeded
    )]
    #[case("version_removed", RevocationReason::VersionRemoved)]
    #[case("moderator_removed", RevocationReason::Other)]
    #[case("", RevocationReason::Other)]
    fn test_revocation_reason_from_status(#[case] status: &str, #[case] expected: RevocationReason) {
        assert_eq!(RevocationReason::from_status(status), expected);
    }

    #[rstest]
    #[case("session_welcome", Some(MessageType::SessionWelcome))]
    #[case("session_keepalive", Some(MessageType::SessionKeepalive))]
    #[case("notification", Some(MessageType::Notification))]
    #[case("session_reconnect", Some(MessageType::SessionReconnect))]
    #[case("revocation", Some(MessageType::Revocation))]
    #[case("session_goodbye", None)]
    fn test_message_type_parse(#[case] raw: &str, #[case] expected: Option<MessageType>) {
        assert_eq!(MessageType::from_str(raw).ok(), expected);
    }

    #[rstest]
    fn test_token_type_is_case_insensitive() {
        assert_eq!(TokenType::from_str("USER").unwrap(), TokenType::User);
        assert_eq!(TokenType::App.to_string(), "app");
    }

    #[rstest]
    fn test_subscription_state_display_and_default() {
        assert_eq!(SubscriptionState::default(), SubscriptionState::Pending);
        assert_eq!(SubscriptionState::Registered.to_string(), "REGISTERED");
        assert!(SubscriptionState::Revoked.is_terminal());
        assert!(!SubscriptionState::Pending.is_terminal());
    }
}
