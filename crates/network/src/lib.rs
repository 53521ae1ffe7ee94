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

//! Network machinery for long-lived push-notification sessions.
//!
//! The `eventsub-network` crate provides the protocol-agnostic building blocks a session
//! controller is assembled from:
//!
//! - [`transport`]: an abstract message-framed connection with inbound events.
//! - [`websocket`]: a `tokio-tungstenite` implementation of the transport.
//! - [`watchdog`]: a restartable keepalive timer.
//! - [`backoff`]: the reconnect delay policy.
//! - [`mode`]: the atomic connection state.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_panics_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod backoff;
pub mod mode;
pub mod tls;
pub mod transport;
pub mod watchdog;
pub mod websocket;
