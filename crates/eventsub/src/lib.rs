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

//! Session lifecycle controller and subscription registry for EventSub push notifications.
//!
//! The `eventsub` crate maintains one persistent, authenticated WebSocket session against an
//! EventSub endpoint and delivers typed events to independently registered subscriptions
//! for the lifetime of that session. Connection loss, keepalive silence, and server-directed
//! redirects are recovered transparently, and every live subscription is registered again
//! against the new session identity.
//!
//! # Overview
//!
//! - [`websocket::session::EventSubSession`]: the session controller and caller-facing API.
//! - [`websocket::subscription::Subscription`]: a typed handle for one topic.
//! - [`websocket::registry::SubscriptionRegistry`]: registration ID to handle mapping.
//! - [`websocket::router::MessageRouter`]: inbound frame classification and dispatch.
//! - [`registration::RegistrationService`]: the server-side registration collaborator,
//!   implemented over HTTP by [`http::client::HttpRegistrationService`].
//!
//! # Documentation
//!
//! The EventSub WebSocket protocol is described at
//! <https://dev.twitch.tv/docs/eventsub/handling-websocket-events>.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_panics_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod common;
pub mod config;
pub mod error;
pub mod http;
pub mod registration;
pub mod websocket;

#[cfg(test)]
mod stubs;
