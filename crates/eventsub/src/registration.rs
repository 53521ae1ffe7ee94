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

//! Server-side subscription registration collaborator.
//!
//! A subscription is only routed to once the remote has accepted a registration binding its
//! topic and filters to the current session identity. The session issues one
//! [`RegistrationRequest`] per subscription after every welcome frame.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{
    Serialize, Serializer,
    ser::{SerializeMap, SerializeStruct},
};
use ustr::Ustr;

use crate::common::{consts::WEBSOCKET_TRANSPORT_METHOD, credential::Credential};

/// Returns true for a 2xx HTTP status.
#[must_use]
pub const fn is_success_status(status: u16) -> bool {
    status >= 200 && status < 300
}

/// A request binding one topic to a session identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub topic: Ustr,
    pub version: Ustr,
    /// Condition filters, in insertion order.
    pub filters: Vec<(String, String)>,
    pub session_id: String,
}

impl RegistrationRequest {
    /// Renders the filters as `key=value` pairs for logging.
    #[must_use]
    pub fn filters_display(&self) -> String {
        self.filters
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Serializes the request body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

struct Condition<'a>(&'a [(String, String)]);

impl Serialize for Condition<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct WebSocketTransport<'a> {
    method: &'static str,
    session_id: &'a str,
}

impl Serialize for RegistrationRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RegistrationRequest", 4)?;
        state.serialize_field("type", self.topic.as_str())?;
        state.serialize_field("version", self.version.as_str())?;
        state.serialize_field("condition", &Condition(&self.filters))?;
        state.serialize_field(
            "transport",
            &WebSocketTransport {
                method: WEBSOCKET_TRANSPORT_METHOD,
                session_id: &self.session_id,
            },
        )?;
        state.end()
    }
}

/// Outcome of a registration call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationResponse {
    /// Server-assigned registration ID, if the remote returned one.
    pub registration_id: Option<String>,
    /// HTTP status, `0` if the request never reached the remote.
    pub status: u16,
}

impl RegistrationResponse {
    #[must_use]
    pub fn accepted(registration_id: impl Into<String>, status: u16) -> Self {
        Self {
            registration_id: Some(registration_id.into()),
            status,
        }
    }

    #[must_use]
    pub const fn rejected(status: u16) -> Self {
        Self {
            registration_id: None,
            status,
        }
    }

    /// Returns the registration ID if the status is 2xx and an ID is present.
    #[must_use]
    pub fn accepted_id(&self) -> Option<&str> {
        if !is_success_status(self.status) {
            return None;
        }
        self.registration_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Registers and unregisters subscriptions with the remote.
///
/// Implementations never fail across this boundary: errors are reported as a status code
/// (`0` when no response was received) and logged by the implementation.
#[async_trait]
pub trait RegistrationService: Debug + Send + Sync + 'static {
    /// Registers `request` and returns the server-assigned ID with the HTTP status.
    async fn register(
        &self,
        credential: &Credential,
        request: &RegistrationRequest,
    ) -> RegistrationResponse;

    /// Deletes the registration `registration_id` and returns the HTTP status.
    async fn unregister(&self, credential: &Credential, registration_id: &str) -> u16;
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn request(filters: Vec<(&str, &str)>) -> RegistrationRequest {
        RegistrationRequest {
            topic: Ustr::from("channel.ban"),
            version: Ustr::from("1"),
            filters: filters
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            session_id: "S1".to_string(),
        }
    }

    #[rstest]
    fn test_body_keeps_filter_insertion_order() {
        let body = request(vec![("to_broadcaster_user_id", "2"), ("from_broadcaster_user_id", "1")])
            .to_body()
            .unwrap();

        assert_eq!(
            body,
            r#"{"type":"channel.ban","version":"1","condition":{"to_broadcaster_user_id":"2","from_broadcaster_user_id":"1"},"transport":{"method":"websocket","session_id":"S1"}}"#
        );
    }

    #[rstest]
    fn test_body_with_no_filters() {
        let body = request(vec![]).to_body().unwrap();
        assert!(body.contains(r#""condition":{}"#));
    }

    #[rstest]
    fn test_filters_display() {
        let request = request(vec![("a", "1"), ("b", "2")]);
        assert_eq!(request.filters_display(), "a=1,b=2");
    }

    #[rstest]
    #[case(RegistrationResponse::accepted("abc", 202), Some("abc"))]
    #[case(RegistrationResponse::accepted("abc", 409), None)]
    #[case(RegistrationResponse::accepted("", 202), None)]
    #[case(RegistrationResponse::rejected(202), None)]
    #[case(RegistrationResponse::rejected(0), None)]
    fn test_accepted_id(#[case] response: RegistrationResponse, #[case] expected: Option<&str>) {
        assert_eq!(response.accepted_id(), expected);
    }

    #[rstest]
    #[case(199, false)]
    #[case(200, true)]
    #[case(204, true)]
    #[case(299, true)]
    #[case(300, false)]
    #[case(0, false)]
    fn test_is_success_status(#[case] status: u16, #[case] expected: bool) {
        assert_eq!(is_success_status(status), expected);
    }
}
