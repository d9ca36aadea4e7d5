// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Time and jitter sources.
//!
//! Schedulers never call `Utc::now()` directly; they take a [`Clock`] from the
//! controller context so tests can pin time.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Add up to `percent` of `base` as random jitter.
#[must_use]
pub fn with_jitter(base: Duration, percent: u8) -> Duration {
    let fraction = if percent == 0 {
        0.0
    } else {
        rand::random_range(0.0..=1.0)
    };
    apply_jitter(base, percent, fraction)
}

/// Deterministic core of [`with_jitter`]: `fraction` in `[0, 1]` selects how
/// much of the jitter window is used.
#[must_use]
pub fn apply_jitter(base: Duration, percent: u8, fraction: f64) -> Duration {
    let window = base.mul_f64(f64::from(percent.min(100)) / 100.0);
    base + window.mul_f64(fraction.clamp(0.0, 1.0))
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod clock_tests;
