use std::sync::Mutex;

use chrono::NaiveDateTime;

use crate::models::{AvailabilityPool, SlotWindow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The request fell inside this window, which has been removed from the pool.
    Matched(SlotWindow),
    /// Nothing contained the request; the pool is untouched.
    Unmatched { proposed: Vec<SlotWindow> },
    /// The requested date/time could not be read as a timestamp.
    InvalidRequest { reason: String },
}

/// Reads `"2026-02-21"` + `"10:00 AM"` as one timestamp.
pub fn parse_requested(date: &str, time: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(&format!("{} {}", date.trim(), time.trim()), "%Y-%m-%d %I:%M %p")
}

/// Finds the first window in `pool` containing the requested instant and removes it.
///
/// When nothing matches, windows whose label mentions `date` are proposed instead, falling back
/// to every parseable window when that date has none.
pub fn match_request(date: &str, time: &str, pool: &mut AvailabilityPool) -> MatchOutcome {
    let requested = match parse_requested(date, time) {
        Ok(dt) => dt,
        Err(e) => {
            return MatchOutcome::InvalidRequest {
                reason: format!("could not parse requested date/time {date:?} {time:?}: {e}"),
            }
        }
    };

    let matched = pool.windows().find(|w| w.contains(&requested));
    if let Some(window) = matched {
        pool.remove(&window.label);
        return MatchOutcome::Matched(window);
    }

    let same_date: Vec<SlotWindow> = pool.windows().filter(|w| w.label.contains(date)).collect();
    let proposed = if same_date.is_empty() {
        pool.windows().collect()
    } else {
        same_date
    };

    MatchOutcome::Unmatched { proposed }
}

/// The clinic's canonical slot pool. Match-then-remove happens under one lock, so concurrent
/// runs cannot claim the same window.
#[derive(Debug, Default)]
pub struct SlotInventory {
    pool: Mutex<AvailabilityPool>,
}

impl SlotInventory {
    pub fn new(pool: AvailabilityPool) -> Self {
        Self {
            pool: Mutex::new(pool),
        }
    }

    /// Runs the matcher against the inventory and returns the outcome together with a snapshot
    /// of what remains.
    pub fn claim(&self, date: &str, time: &str) -> (MatchOutcome, AvailabilityPool) {
        let mut pool = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        let outcome = match_request(date, time, &mut pool);
        (outcome, pool.clone())
    }

    /// Returns a claimed window to the pool when its booking could not be completed.
    pub fn restore(&self, window: &SlotWindow) -> AvailabilityPool {
        let mut pool = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        pool.restore(window);
        pool.clone()
    }

    pub fn snapshot(&self) -> AvailabilityPool {
        self.pool.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn replace(&self, pool: AvailabilityPool) {
        *self.pool.lock().unwrap_or_else(|e| e.into_inner()) = pool;
    }
}

impl From<Vec<String>> for SlotInventory {
    fn from(labels: Vec<String>) -> Self {
        Self::new(AvailabilityPool::new(labels))
    }
}
