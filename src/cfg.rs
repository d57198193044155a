// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use serde::{Deserialize, Serialize};

/// Tunables for a `Member`. All durations are counted in host ticks, i.e.
/// calls to `Member::tick`; the host decides how long a tick is.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ticks to wait after a declined lock attempt before retrying, if the
    /// member outranks the peer holding the lock that declined it. Otherwise
    /// it waits twice as long, doubling again on each consecutive failure.
    pub base_backoff_tick: u32,

    /// Cap on the doubling of `base_backoff_tick`.
    pub max_backoff_shift: u32,

    /// Ticks a joiner waits for a welcome before giving up. `None` waits
    /// forever.
    pub greeting_timeout_tick: Option<u32>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            base_backoff_tick: 1,
            max_backoff_shift: 5,
            greeting_timeout_tick: None,
        }
    }
}

impl Config {
    /// Backoff after the `failures`th consecutive declined attempt.
    pub fn backoff_tick(&self, failures: u32, outranks_blockers: bool) -> u32 {
        let base = self.base_backoff_tick.max(1);
        if outranks_blockers {
            return base;
        }
        let shift = failures.max(1).min(self.max_backoff_shift);
        base.saturating_mul(1u32 << shift.min(31))
    }
}
