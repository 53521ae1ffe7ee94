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

//! Data transfer objects for the `eventsub/subscriptions` REST endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ustr::Ustr;

/// Transport block of a registered subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelixTransport {
    pub method: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub disconnected_at: Option<DateTime<Utc>>,
}

/// A subscription as returned by the create and list endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HelixSubscription {
    pub id: String,
    pub status: String,
    #[serde(rename = "type")]
    pub topic: Ustr,
    pub version: Ustr,
    #[serde(default)]
    pub condition: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub transport: HelixTransport,
    #[serde(default)]
    pub cost: u64,
}

/// Response envelope of the create and list endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HelixSubscriptionList {
    pub data: Vec<HelixSubscription>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub total_cost: u64,
    #[serde(default)]
    pub max_total_cost: u64,
}

/// Error body returned with non-success statuses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelixErrorResponse {
    pub error: String,
    pub status: u16,
    #[serde(default)]
    pub message: String,
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
