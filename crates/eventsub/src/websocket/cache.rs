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

//! Bounded set of recently seen message IDs.
//!
//! The remote delivers notifications at least once, so the same `message_id` may arrive
//! more than once. The cache remembers the last `capacity` IDs and evicts the oldest first.

use std::collections::VecDeque;

use ahash::AHashSet;

/// A first-in first-out bounded set of message IDs.
#[derive(Debug)]
pub struct MessageIdCache {
    capacity: usize,
    seen: AHashSet<String>,
    order: VecDeque<String>,
}

impl MessageIdCache {
    /// Creates a new [`MessageIdCache`] holding at most `capacity` IDs (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            seen: AHashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Records `message_id`, returning false if it was already present.
    pub fn insert(&mut self, message_id: &str) -> bool {
        if self.seen.contains(message_id) {
            return false;
        }

        if self.order.len() == self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }

        self.seen.insert(message_id.to_string());
        self.order.push_back(message_id.to_string());
        true
    }

    /// Forgets `message_id`, returning true if it was present.
    pub fn remove(&mut self, message_id: &str) -> bool {
        if !self.seen.remove(message_id) {
            return false;
        }
        self.order.retain(|id| id != message_id);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
