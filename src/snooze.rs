// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Update prompt debouncing.
//!
//! The user can snooze update notices for a number of hours. The deadline is
//! stored as a UNIX timestamp under the `snooze` key of a [`StateStore`].
//! Reading the deadline fails open: a missing, unreadable, or corrupted value
//! simply means "not snoozed", so a bad state file can never block updates.

use crate::state::{StateError, StateStore};

use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const SNOOZE_KEY: &str = "snooze";
const SECONDS_PER_HOUR: u64 = 3600;

/// Snooze deadline manager.
#[derive(Debug)]
pub struct Snooze<'store, S>
where
    S: StateStore,
{
    store: &'store S,
}

impl<'store, S> Snooze<'store, S>
where
    S: StateStore,
{
    pub fn new(store: &'store S) -> Self {
        Self { store }
    }

    /// Snooze update notices for a number of hours from now.
    ///
    /// Returns the new deadline as a UNIX timestamp.
    ///
    /// # Errors
    ///
    /// - Return [`SnoozeError::InvalidHours`] if hours is not a positive
    ///   integer.
    /// - Return [`SnoozeError::State`] if deadline cannot be stored.
    pub fn set(&self, hours: &str) -> Result<u64> {
        self.set_at(hours, now())
    }

    fn set_at(&self, hours: &str, now: u64) -> Result<u64> {
        let hours = hours
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|hours| *hours > 0)
            .ok_or_else(|| SnoozeError::InvalidHours(hours.to_string()))?;

        let until = now.saturating_add(hours.saturating_mul(SECONDS_PER_HOUR));
        self.store.write(SNOOZE_KEY, &until.to_string())?;
        debug!("snoozed until {until}");

        Ok(until)
    }

    /// Check if update notices are currently snoozed.
    pub fn is_active(&self) -> bool {
        self.is_active_at(now())
    }

    fn is_active_at(&self, now: u64) -> bool {
        self.deadline().is_some_and(|until| until > now)
    }

    /// Seconds left until the snooze expires, if it is active.
    pub fn remaining(&self) -> Option<u64> {
        let now = now();
        self.deadline()
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Lift the snooze. Does nothing if there is none.
    ///
    /// # Errors
    ///
    /// - Return [`SnoozeError::State`] if stored deadline cannot be removed.
    pub fn clear(&self) -> Result<()> {
        Ok(self.store.remove(SNOOZE_KEY)?)
    }

    fn deadline(&self) -> Option<u64> {
        let value = match self.store.read(SNOOZE_KEY) {
            Ok(value) => value?,
            Err(err) => {
                warn!("ignoring unreadable snooze state: {err}");
                return None;
            }
        };

        match value.trim().parse::<u64>() {
            Ok(until) => Some(until),
            Err(_) => {
                debug!("ignoring malformed snooze state {value:?}");
                None
            }
        }
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Snooze error types.
#[derive(Debug, thiserror::Error)]
pub enum SnoozeError {
    /// Snooze duration is not a positive whole number of hours.
    #[error("snooze duration must be a positive number of hours, got {0:?}")]
    InvalidHours(String),

    /// Deadline cannot be persisted.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Friendly result alias :3
pub type Result<T, E = SnoozeError> = std::result::Result<T, E>;
