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

//! Error types for EventSub session and registration operations.

use eventsub_network::transport::TransportError;
use thiserror::Error;

/// Result alias for EventSub operations.
pub type EventSubResult<T> = Result<T, EventSubError>;

/// Error type for EventSub failures.
///
/// Only [`EventSubError::Configuration`] is returned when constructing a session, every
/// other failure inside the session is logged and recovered from.
#[derive(Debug, Error)]
pub enum EventSubError {
    /// Wrong or missing credential, or an invalid configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Underlying transport error.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Failed to parse or serialize JSON payloads.
    #[error("JSON error: {0}")]
    Json(String),

    /// The registration service answered with a non-success status.
    #[error("Registration of '{topic}' failed with status {status}")]
    Registration { status: u16, topic: String },

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The session is not live.
    #[error("Session not connected")]
    NotConnected,
}

impl EventSubError {
    pub(crate) fn config(msg: impl ToString) -> Self {
        Self::Configuration(msg.to_string())
    }
}

impl From<TransportError> for EventSubError {
    fn from(error: TransportError) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for EventSubError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

impl From<reqwest::Error> for EventSubError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http(error.to_string())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
