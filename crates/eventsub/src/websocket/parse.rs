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

//! Classification of raw text frames into [`EventSubMessage`]s.
//!
//! A frame is malformed when it is not a JSON envelope with `metadata.message_id` and
//! `metadata.message_type`, or when a known message type lacks the payload it requires.
//! Malformed frames are errors here; a well-formed envelope of an unknown type is
//! [`EventSubMessage::Unrecognized`].

use std::str::FromStr;

use ustr::Ustr;

use super::messages::{
    EventSubFrame, EventSubMessage, NotificationFrame, RevocationFrame, SessionReconnect,
    SessionWelcome,
};
use crate::{
    common::enums::{MessageType, RevocationReason},
    error::{EventSubError, EventSubResult},
};

/// Parses one inbound text frame.
///
/// # Errors
///
/// Returns [`EventSubError::Json`] if the frame is malformed.
pub fn parse_frame(text: &str) -> EventSubResult<EventSubMessage> {
    let frame: EventSubFrame = serde_json::from_str(text)?;
    classify(frame)
}

fn missing(message_type: MessageType, field: &str) -> EventSubError {
    EventSubError::Json(format!("{message_type} frame without '{field}'"))
}

fn classify(frame: EventSubFrame) -> EventSubResult<EventSubMessage> {
    let EventSubFrame { metadata, payload } = frame;

    let Ok(message_type) = MessageType::from_str(&metadata.message_type) else {
        return Ok(EventSubMessage::Unrecognized {
            message_type: metadata.message_type,
        });
    };

    match message_type {
        MessageType::SessionWelcome => {
            let session = payload
                .session
                .ok_or_else(|| missing(message_type, "payload.session"))?;

            Ok(EventSubMessage::Welcome(SessionWelcome {
                message_id: metadata.message_id,
                session_id: session.id,
                keepalive_secs: session.keepalive_timeout_seconds,
            }))
        }
        MessageType::SessionKeepalive => Ok(EventSubMessage::Keepalive {
            message_id: metadata.message_id,
        }),
        MessageType::Notification => {
            let subscription = payload
                .subscription
                .ok_or_else(|| missing(message_type, "payload.subscription"))?;
            let event = payload
                .event
                .ok_or_else(|| missing(message_type, "payload.event"))?;
            let topic = subscription
                .topic
                .or(metadata.subscription_type)
                .unwrap_or_else(|| Ustr::from(""));

            Ok(EventSubMessage::Notification(NotificationFrame {
                message_id: metadata.message_id,
                registration_id: subscription.id,
                topic,
                timestamp: metadata.message_timestamp,
                event,
            }))
        }
        MessageType::SessionReconnect => {
            let session = payload
                .session
                .ok_or_else(|| missing(message_type, "payload.session"))?;
            let reconnect_url = session
                .reconnect_url
                .filter(|url| !url.is_empty())
                .ok_or_else(|| missing(message_type, "payload.session.reconnect_url"))?;

            Ok(EventSubMessage::Reconnect(SessionReconnect {
                message_id: metadata.message_id,
                session_id: session.id,
                reconnect_url,
            }))
        }
        MessageType::Revocation => {
            let subscription = payload
                .subscription
                .ok_or_else(|| missing(message_type, "payload.subscription"))?;
            let status = subscription.status.unwrap_or_default();

            Ok(EventSubMessage::Revocation(RevocationFrame {
                message_id: metadata.message_id,
                registration_id: subscription.id,
                topic: subscription.topic.or(metadata.subscription_type),
                reason: RevocationReason::from_status(&status),
                status,
            }))
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
