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

//! Core constants shared across the EventSub components.

use std::time::Duration;

pub const EVENTSUB_WS_URL: &str = "wss://eventsub.wss.twitch.tv/ws";
pub const HELIX_API_URL: &str = "https://api.twitch.tv/helix";

pub const EVENTSUB_SUBSCRIPTIONS_PATH: &str = "eventsub/subscriptions";
pub const WEBSOCKET_TRANSPORT_METHOD: &str = "websocket";

/// Query parameter requesting a keepalive interval on the initial connection.
pub const KEEPALIVE_TIMEOUT_PARAM: &str = "keepalive_timeout_seconds";

/// Bounds accepted by the remote for a requested keepalive interval.
pub const MIN_KEEPALIVE_SECS: u64 = 10;
pub const MAX_KEEPALIVE_SECS: u64 = 600;

/// Keepalive interval assumed until a welcome frame supplies one.
pub const DEFAULT_KEEPALIVE_SECS: u64 = 10;
pub const DEFAULT_KEEPALIVE_MARGIN_MS: u64 = 3_000;

pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MESSAGE_ID_CACHE_SIZE: usize = 512;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Upper bound on waiting for the controller task during disconnect.
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub const HEADER_CLIENT_ID: &str = "client-id";
