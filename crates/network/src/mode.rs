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

use std::sync::atomic::{AtomicU8, Ordering};

use strum::{AsRefStr, Display, EnumString};

/// Lifecycle state of a session connection (managed via an atomic flag).
///
/// ```text
/// Disconnected -> Connecting -> AwaitingWelcome -> Live
///                                     ^              |
///                                     |        (failure)
///                                     +-- Reconnecting
/// ```
///
/// `Disconnected` is also the terminal state reached after an explicit stop.
#[derive(Clone, Copy, Debug, Default, Display, Hash, PartialEq, Eq, AsRefStr, EnumString)]
#[repr(u8)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No physical connection and no controller running.
    #[default]
    Disconnected = 0,
    /// A physical connection is being opened.
    Connecting = 1,
    /// The connection is open and the welcome frame has not arrived yet.
    AwaitingWelcome = 2,
    /// The welcome frame has been received and the session identity is known.
    Live = 3,
    /// The previous connection was lost and a replacement is being established.
    Reconnecting = 4,
}

impl ConnectionState {
    /// Convert a u8 to [`ConnectionState`], useful when loading from an `AtomicU8`.
    ///
    /// Unknown values map to `Disconnected`.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::AwaitingWelcome,
            3 => Self::Live,
            4 => Self::Reconnecting,
            _ => Self::Disconnected,
        }
    }

    #[inline]
    pub fn from_atomic(value: &AtomicU8) -> Self {
        Self::from_u8(value.load(Ordering::SeqCst))
    }

    /// Convert a [`ConnectionState`] to a u8, useful when storing to an `AtomicU8`.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Stores this state into the given atomic.
    #[inline]
    pub fn store(self, value: &AtomicU8) {
        value.store(self.as_u8(), Ordering::SeqCst);
    }

    /// Returns true if the session has a welcomed connection.
    #[inline]
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Returns true if no controller is running.
    #[inline]
    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Returns true if a connection is being established or awaiting its welcome.
    #[inline]
    #[must_use]
    pub const fn is_establishing(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::AwaitingWelcome | Self::Reconnecting
        )
    }
}
