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

//! Keepalive watchdog detecting silent connection death.
//!
//! The watchdog is a single-shot timer: every [`KeepaliveWatchdog::reset`] cancels the
//! pending timer and arms a new one for `interval + margin`. If the timer elapses a
//! [`WatchdogTimeout`] is sent on the channel returned by [`KeepaliveWatchdog::new`].

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{sync::mpsc, task::JoinHandle};

/// Default margin added to the remote keepalive interval to absorb jitter.
pub const DEFAULT_KEEPALIVE_MARGIN: Duration = Duration::from_secs(3);

/// Reported when no reset happened within `interval + margin`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchdogTimeout {
    /// Arming generation which elapsed.
    pub generation: u64,
    /// The full deadline which elapsed (interval plus margin).
    pub deadline: Duration,
}

/// A cancel-and-rearm keepalive timer.
#[derive(Debug)]
pub struct KeepaliveWatchdog {
    margin: Duration,
    generation: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
    timeout_tx: mpsc::UnboundedSender<WatchdogTimeout>,
}

impl KeepaliveWatchdog {
    /// Creates a new disarmed [`KeepaliveWatchdog`] and the receiver for its timeouts.
    #[must_use]
    pub fn new(margin: Duration) -> (Self, mpsc::UnboundedReceiver<WatchdogTimeout>) {
        let (timeout_tx, timeout_rx) = mpsc::unbounded_channel();
        let watchdog = Self {
            margin,
            generation: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
            timeout_tx,
        };
        (watchdog, timeout_rx)
    }

    /// Returns the current arming generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Cancels any pending timer and arms a new one for `interval + margin`.
    ///
    /// The deadline saturates at [`Duration::MAX`]. Must be called from within a tokio runtime.
    pub fn reset(&self, interval: Duration) {
        let deadline = interval.saturating_add(self.margin);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.generation);
        let timeout_tx = self.timeout_tx.clone();

        // Deadline is fixed now, not when the task is first polled
        let sleep = tokio::time::sleep(deadline);

        let task = tokio::task::spawn(async move {
            sleep.await;

            // A reset which raced the timer wins
            if current.load(Ordering::SeqCst) != generation {
                return;
            }

            tracing::debug!("Keepalive watchdog elapsed after {deadline:?}");
            let _ = timeout_tx.send(WatchdogTimeout {
                generation,
                deadline,
            });
        });

        self.replace_task(Some(task));
        tracing::trace!("Keepalive watchdog armed for {deadline:?} (generation {generation})");
    }

    /// Cancels any pending timer, safe to call when none is pending.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.replace_task(None);
    }

    fn replace_task(&self, task: Option<JoinHandle<()>>) {
        let previous = match self.task.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, task),
            Err(e) => {
                tracing::error!("Watchdog lock poisoned: {e}");
                return;
            }
        };

        if let Some(previous) = previous
            && !previous.is_finished()
        {
            previous.abort();
        }
    }
}

impl Drop for KeepaliveWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
