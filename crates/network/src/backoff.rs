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

//! Reconnection delay policy for session controllers.
//!
//! The delay grows by a configurable factor up to a maximum, with optional random jitter
//! to avoid synchronized reconnection storms. A factor of `1.0` with zero jitter yields a
//! fixed interval, which is what a session uses unless configured otherwise.

use std::time::Duration;

use rand::Rng;

/// An exponential backoff with optional jitter.
///
/// Each call to [`ExponentialBackoff::next_duration`] returns the current delay (plus
/// jitter) and then multiplies the stored delay by `factor`, capped at `delay_max`.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    /// The initial backoff delay.
    delay_initial: Duration,
    /// The maximum delay to cap the backoff.
    delay_max: Duration,
    /// The current backoff delay.
    delay_current: Duration,
    /// The factor to multiply the delay on each iteration.
    factor: f64,
    /// The maximum random jitter to add (in milliseconds).
    jitter_ms: u64,
}

impl ExponentialBackoff {
    /// Creates a new [`ExponentialBackoff`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if `factor` is below `1.0` or not finite, or if `delay_max` is
    /// less than `delay_initial`.
    pub fn new(
        delay_initial: Duration,
        delay_max: Duration,
        factor: f64,
        jitter_ms: u64,
    ) -> anyhow::Result<Self> {
        if !factor.is_finite() || factor < 1.0 {
            anyhow::bail!("backoff factor must be finite and >= 1.0, was {factor}");
        }
        if delay_max < delay_initial {
            anyhow::bail!(
                "max delay {delay_max:?} must be >= initial delay {delay_initial:?}"
            );
        }

        Ok(Self {
            delay_initial,
            delay_max,
            delay_current: delay_initial,
            factor,
            jitter_ms,
        })
    }

    /// Creates a backoff which always yields `delay`.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            delay_initial: delay,
            delay_max: delay,
            delay_current: delay,
            factor: 1.0,
            jitter_ms: 0,
        }
    }

    /// Return the next backoff delay with jitter and update the internal state.
    pub fn next_duration(&mut self) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=self.jitter_ms)
        };
        let delay_with_jitter = self.delay_current + Duration::from_millis(jitter);

        let current_nanos = self.delay_current.as_nanos();
        let max_nanos = self.delay_max.as_nanos() as u64;
        let next_nanos = (current_nanos as f64 * self.factor) as u64;
        self.delay_current = Duration::from_nanos(std::cmp::min(next_nanos, max_nanos));

        delay_with_jitter
    }

    /// Reset the backoff to its initial state.
    pub const fn reset(&mut self) {
        self.delay_current = self.delay_initial;
    }

    /// Returns the current base delay without jitter.
    #[must_use]
    pub const fn current_delay(&self) -> Duration {
        self.delay_current
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_fixed_backoff_never_grows() {
        let mut backoff = ExponentialBackoff::fixed(Duration::from_secs(1));

        for _ in 0..5 {
            assert_eq!(backoff.next_duration(), Duration::from_secs(1));
        }
    }

    #[rstest]
    fn test_no_jitter_exponential_growth() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_millis(800);
        let mut backoff = ExponentialBackoff::new(initial, max, 2.0, 0).unwrap();

        assert_eq!(backoff.next_duration(), Duration::from_millis(100));
        assert_eq!(backoff.next_duration(), Duration::from_millis(200));
        assert_eq!(backoff.next_duration(), Duration::from_millis(400));
        assert_eq!(backoff.next_duration(), Duration::from_millis(800));

        // Capped
        assert_eq!(backoff.next_duration(), Duration::from_millis(800));
    }

    #[rstest]
    fn test_reset() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_millis(1600);
        let mut backoff = ExponentialBackoff::new(initial, max, 2.0, 0).unwrap();

        let _ = backoff.next_duration();
        assert_eq!(backoff.current_delay(), Duration::from_millis(200));

        backoff.reset();
        assert_eq!(backoff.next_duration(), initial);
    }

    #[rstest]
    fn test_jitter_within_bounds() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_millis(1000);
        let jitter = 50;

        for _ in 0..10 {
            let mut backoff = ExponentialBackoff::new(initial, max, 2.0, jitter).unwrap();
            let base = backoff.current_delay();
            let delay = backoff.next_duration();

            assert!(delay >= base, "Delay {delay:?} is less than {base:?}");
            assert!(
                delay <= base + Duration::from_millis(jitter),
                "Delay {delay:?} exceeds base plus jitter"
            );
        }
    }

    #[rstest]
    #[case(0.5)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn test_invalid_factor_rejected(#[case] factor: f64) {
        let result = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(200),
            factor,
            0,
        );
        assert!(result.is_err());
    }

    #[rstest]
    fn test_max_below_initial_rejected() {
        let result = ExponentialBackoff::new(
            Duration::from_millis(500),
            Duration::from_millis(100),
            2.0,
            0,
        );
        assert!(result.is_err());
    }
}
