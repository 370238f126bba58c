use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

static SLOT_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d{4}-\d{2}-\d{2}) from (\d{1,2}[:.]\d{2}\s*(?:AM|PM)?) to (\d{1,2}[:.]\d{2}\s*(?:AM|PM)?)",
    )
    .expect("slot label pattern is valid")
});

/// A bounded interval of availability on one calendar date, parsed from a label such as
/// `"2026-02-21 from 9:00AM to 10:00AM"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotWindow {
    pub date: NaiveDate,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub label: String,
}

impl SlotWindow {
    /// Parses a slot label. Returns `None` for anything that does not fit the label shape or
    /// whose times are not valid 12-hour clock values.
    ///
    /// A time without a meridiem is read as PM, so `"11.00"` becomes 11:00 PM. Start is not
    /// required to precede end.
    pub fn parse(label: &str) -> Option<Self> {
        let caps = SLOT_LABEL.captures(label)?;
        let date_str = caps.get(1)?.as_str();
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()?;
        let start = parse_clock(date_str, caps.get(2)?.as_str())?;
        let end = parse_clock(date_str, caps.get(3)?.as_str())?;

        Some(Self {
            date,
            start,
            end,
            label: label.to_string(),
        })
    }

    /// Half-open containment: `start <= at < end` on the window's own date.
    pub fn contains(&self, at: &NaiveDateTime) -> bool {
        self.date == at.date() && self.start <= *at && *at < self.end
    }
}

fn normalize_clock(raw: &str) -> String {
    let mut t: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '.' { ':' } else { c })
        .collect::<String>()
        .to_uppercase();
    if !(t.ends_with("AM") || t.ends_with("PM")) {
        t.push_str("PM");
    }
    t
}

fn parse_clock(date: &str, raw: &str) -> Option<NaiveDateTime> {
    let clock = normalize_clock(raw);
    NaiveDateTime::parse_from_str(&format!("{date} {clock}"), "%Y-%m-%d %I:%M%p").ok()
}

/// Unbooked capacity, kept as raw labels in the order they were supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvailabilityPool {
    labels: Vec<String>,
}

impl AvailabilityPool {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Parseable windows in pool order. Malformed labels are skipped.
    pub fn windows(&self) -> impl Iterator<Item = SlotWindow> + '_ {
        self.labels.iter().filter_map(|l| SlotWindow::parse(l))
    }

    /// Labels that fail to parse; they stay in the pool but never match.
    pub fn unparseable(&self) -> Vec<String> {
        self.labels
            .iter()
            .filter(|l| SlotWindow::parse(l).is_none())
            .cloned()
            .collect()
    }

    /// Removes the first entry equal to `label`. Returns whether anything was removed.
    pub fn remove(&mut self, label: &str) -> bool {
        match self.labels.iter().position(|l| l == label) {
            Some(idx) => {
                self.labels.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Puts a previously removed window back, ahead of the first window that starts later.
    pub fn restore(&mut self, window: &SlotWindow) {
        let idx = self
            .labels
            .iter()
            .position(|l| SlotWindow::parse(l).is_some_and(|w| w.start > window.start))
            .unwrap_or(self.labels.len());
        self.labels.insert(idx, window.label.clone());
    }

    pub fn into_labels(self) -> Vec<String> {
        self.labels
    }
}

impl From<Vec<String>> for AvailabilityPool {
    fn from(labels: Vec<String>) -> Self {
        Self::new(labels)
    }
}

/// The slot list the demo clinic starts with.
pub fn seed_slots() -> Vec<String> {
    [
        "2026-02-21 from 9:00AM to 10:00AM",
        "2026-02-21 from 10:00AM to 11:00AM",
        "2026-02-21 from 11:00AM to 12:00PM",
        "2026-02-21 from 1:00PM to 2:00PM",
        "2026-02-21 from 2:00PM to 3:00PM",
        "2026-02-21 from 3:00PM to 4:00PM",
        "2026-02-22 from 10:00AM to 11:00AM",
        "2026-02-22 from 1:00PM to 2:00PM",
        "2026-02-22 from 2:00PM to 3:00PM",
        "2026-02-22 from 3:00PM to 4:00PM",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
