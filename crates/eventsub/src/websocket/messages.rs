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

//! Inbound frame envelopes and their classified form.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use ustr::Ustr;

use crate::common::enums::RevocationReason;

/// Raw envelope carried by every text frame.
#[derive(Clone, Debug, Deserialize)]
pub struct EventSubFrame {
    pub metadata: EventSubMetadata,
    #[serde(default)]
    pub payload: EventSubPayload,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventSubMetadata {
    pub message_id: String,
    pub message_type: String,
    #[serde(default)]
    pub message_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subscription_type: Option<Ustr>,
    #[serde(default)]
    pub subscription_version: Option<Ustr>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EventSubPayload {
    #[serde(default)]
    pub session: Option<SessionPayload>,
    #[serde(default)]
    pub subscription: Option<SubscriptionPayload>,
    #[serde(default)]
    pub event: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionPayload {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub keepalive_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub reconnect_url: Option<String>,
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SubscriptionPayload {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "type", default)]
    pub topic: Option<Ustr>,
    #[serde(default)]
    pub version: Option<Ustr>,
    #[serde(default)]
    pub condition: Option<serde_json::Value>,
    #[serde(default)]
    pub cost: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A welcome frame: the session identity of a new connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionWelcome {
    pub message_id: String,
    pub session_id: String,
    /// Keepalive interval chosen by the remote, if supplied.
    pub keepalive_secs: Option<u64>,
}

/// A redirect frame instructing the client to migrate to `reconnect_url`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReconnect {
    pub message_id: String,
    pub session_id: String,
    pub reconnect_url: String,
}

/// A notification frame for one registration.
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationFrame {
    pub message_id: String,
    pub registration_id: String,
    pub topic: Ustr,
    pub timestamp: Option<DateTime<Utc>>,
    pub event: serde_json::Value,
}

/// A revocation frame ending one registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevocationFrame {
    pub message_id: String,
    pub registration_id: String,
    pub topic: Option<Ustr>,
    pub reason: RevocationReason,
    /// The raw status the reason was parsed from.
    pub status: String,
}

/// A successfully parsed inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum EventSubMessage {
    Welcome(SessionWelcome),
    Keepalive { message_id: String },
    Notification(NotificationFrame),
    Reconnect(SessionReconnect),
    Revocation(RevocationFrame),
    /// A well-formed envelope of a message type this client does not handle.
    Unrecognized { message_type: String },
}

impl EventSubMessage {
    /// Returns a short name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Welcome(_) => "welcome",
            Self::Keepalive { .. } => "keepalive",
            Self::Notification(_) => "notification",
            Self::Reconnect(_) => "reconnect",
            Self::Revocation(_) => "revocation",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}
