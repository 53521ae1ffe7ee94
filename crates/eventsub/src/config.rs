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

//! Configuration for an EventSub session and its registration client.

use std::time::Duration;

use eventsub_network::backoff::ExponentialBackoff;
use serde::Deserialize;
use url::Url;

use crate::{
    common::consts::{
        DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_KEEPALIVE_MARGIN_MS,
        DEFAULT_KEEPALIVE_SECS, DEFAULT_MESSAGE_ID_CACHE_SIZE, DEFAULT_RECONNECT_DELAY_MS,
        EVENTSUB_WS_URL, HELIX_API_URL, KEEPALIVE_TIMEOUT_PARAM, MAX_KEEPALIVE_SECS,
        MIN_KEEPALIVE_SECS,
    },
    error::{EventSubError, EventSubResult},
};

/// Configuration for [`EventSubSession`](crate::websocket::session::EventSubSession).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EventSubConfig {
    /// WebSocket endpoint of the EventSub service.
    pub url: String,
    /// Keepalive interval requested from the remote, in seconds (10 to 600).
    pub keepalive_timeout_secs: Option<u64>,
    /// Keepalive interval assumed until a welcome frame supplies one.
    pub default_keepalive_secs: u64,
    /// Fixed margin added to the keepalive interval before declaring a timeout.
    pub keepalive_margin_ms: u64,
    /// Initial reconnect delay in milliseconds.
    pub reconnect_delay_initial_ms: u64,
    /// Maximum reconnect delay in milliseconds.
    pub reconnect_delay_max_ms: u64,
    /// Factor applied to the reconnect delay after each failed attempt.
    pub reconnect_backoff_factor: f64,
    /// Maximum random jitter added to each reconnect delay, in milliseconds.
    pub reconnect_jitter_ms: u64,
    /// Bound on each physical connection attempt, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Number of recent notification message IDs remembered for duplicate suppression.
    pub message_id_cache_size: usize,
    /// Base URL of the REST API used for registration.
    pub api_url: String,
    /// HTTP timeout in seconds.
    pub http_timeout_secs: u64,
}

impl Default for EventSubConfig {
    fn default() -> Self {
        Self {
            url: EVENTSUB_WS_URL.to_string(),
            keepalive_timeout_secs: None,
            default_keepalive_secs: DEFAULT_KEEPALIVE_SECS,
            keepalive_margin_ms: DEFAULT_KEEPALIVE_MARGIN_MS,
            reconnect_delay_initial_ms: DEFAULT_RECONNECT_DELAY_MS,
            reconnect_delay_max_ms: DEFAULT_RECONNECT_DELAY_MS,
            reconnect_backoff_factor: 1.0,
            reconnect_jitter_ms: 0,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            message_id_cache_size: DEFAULT_MESSAGE_ID_CACHE_SIZE,
            api_url: HELIX_API_URL.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl EventSubConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    #[must_use]
    pub const fn with_keepalive_timeout_secs(mut self, secs: u64) -> Self {
        self.keepalive_timeout_secs = Some(secs);
        self
    }

    #[must_use]
    pub const fn with_keepalive_margin_ms(mut self, margin_ms: u64) -> Self {
        self.keepalive_margin_ms = margin_ms;
        self
    }

    /// Sets a fixed reconnect delay.
    #[must_use]
    pub const fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_initial_ms = delay_ms;
        self.reconnect_delay_max_ms = delay_ms;
        self.reconnect_backoff_factor = 1.0;
        self.reconnect_jitter_ms = 0;
        self
    }

    #[must_use]
    pub const fn with_message_id_cache_size(mut self, size: usize) -> Self {
        self.message_id_cache_size = size;
        self
    }

    /// Checks every value the session depends on.
    ///
    /// # Errors
    ///
    /// Returns [`EventSubError::Configuration`] for an empty or non-WebSocket URL, an
    /// out-of-range keepalive, a zero message ID cache size, or invalid backoff settings.
    pub fn validate(&self) -> EventSubResult<()> {
        if self.url.trim().is_empty() {
            return Err(EventSubError::config("url must not be empty"));
        }

        self.connect_url()?;

        if let Some(secs) = self.keepalive_timeout_secs
            && !(MIN_KEEPALIVE_SECS..=MAX_KEEPALIVE_SECS).contains(&secs)
        {
            return Err(EventSubError::config(format!(
                "keepalive_timeout_secs must be within {MIN_KEEPALIVE_SECS}..={MAX_KEEPALIVE_SECS}, was {secs}"
            )));
        }

        if self.default_keepalive_secs == 0 {
            return Err(EventSubError::config("default_keepalive_secs must be positive"));
        }

        if self.message_id_cache_size == 0 {
            return Err(EventSubError::config("message_id_cache_size must be positive"));
        }

        self.backoff()?;
        Ok(())
    }

    /// Returns the URL of the initial connection, carrying the requested keepalive.
    ///
    /// # Errors
    ///
    /// Returns [`EventSubError::Configuration`] if the URL cannot be parsed or is not a
    /// `ws://` or `wss://` URL.
    pub fn connect_url(&self) -> EventSubResult<String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| EventSubError::config(format!("invalid url '{}': {e}", self.url)))?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(EventSubError::config(format!(
                    "url scheme must be ws or wss, was '{other}'"
                )));
            }
        }

        if let Some(secs) = self.keepalive_timeout_secs {
            url.query_pairs_mut()
                .append_pair(KEEPALIVE_TIMEOUT_PARAM, &secs.to_string());
        }

        Ok(url.into())
    }

    /// Returns the reconnect backoff policy.
    ///
    /// # Errors
    ///
    /// Returns [`EventSubError::Configuration`] if the backoff settings are invalid.
    pub fn backoff(&self) -> EventSubResult<ExponentialBackoff> {
        ExponentialBackoff::new(
            Duration::from_millis(self.reconnect_delay_initial_ms),
            Duration::from_millis(self.reconnect_delay_max_ms),
            self.reconnect_backoff_factor,
            self.reconnect_jitter_ms,
        )
        .map_err(EventSubError::config)
    }

    #[must_use]
    pub const fn default_keepalive(&self) -> Duration {
        Duration::from_secs(self.default_keepalive_secs)
    }

    #[must_use]
    pub const fn keepalive_margin(&self) -> Duration {
        Duration::from_millis(self.keepalive_margin_ms)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_defaults_are_valid_and_fixed_backoff() {
        let config = EventSubConfig::default();
        config.validate().unwrap();

        assert_eq!(config.url, EVENTSUB_WS_URL);
        assert_eq!(config.keepalive_margin(), Duration::from_secs(3));

        let mut backoff = config.backoff().unwrap();
        assert_eq!(backoff.next_duration(), Duration::from_secs(1));
        assert_eq!(backoff.next_duration(), Duration::from_secs(1));
    }

    #[rstest]
    fn test_connect_url_without_keepalive_is_unchanged() {
        let config = EventSubConfig::default();
        assert_eq!(config.connect_url().unwrap(), EVENTSUB_WS_URL);
    }

    #[rstest]
    fn test_connect_url_appends_keepalive() {
        let config = EventSubConfig::default().with_keepalive_timeout_secs(30);
        assert_eq!(
            config.connect_url().unwrap(),
            "wss://eventsub.wss.twitch.tv/ws?keepalive_timeout_seconds=30"
        );
    }

    #[rstest]
    #[case(EventSubConfig::default().with_url(""))]
    #[case(EventSubConfig::default().with_url("not a url"))]
    #[case(EventSubConfig::default().with_url("https://eventsub.example.com"))]
    #[case(EventSubConfig::default().with_keepalive_timeout_secs(5))]
    #[case(EventSubConfig::default().with_keepalive_timeout_secs(601))]
    #[case(EventSubConfig::default().with_message_id_cache_size(0))]
    fn test_validate_rejects(#[case] config: EventSubConfig) {
        assert!(matches!(
            config.validate(),
            Err(EventSubError::Configuration(_))
        ));
    }

    #[rstest]
    fn test_validate_rejects_shrinking_backoff() {
        let config = EventSubConfig {
            reconnect_backoff_factor: 0.5,
            ..EventSubConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EventSubError::Configuration(_))
        ));
    }

    #[rstest]
    fn test_deserialize_partial_uses_defaults() {
        let config: EventSubConfig =
            serde_json::from_str(r#"{"keepalive_timeout_secs": 60, "keepalive_margin_ms": 500}"#)
                .unwrap();

        assert_eq!(config.keepalive_timeout_secs, Some(60));
        assert_eq!(config.keepalive_margin(), Duration::from_millis(500));
        assert_eq!(config.api_url, HELIX_API_URL);
        config.validate().unwrap();
    }
}
