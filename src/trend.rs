use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;

use crate::models::{ClassifiedSession, SessionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendWindow {
    pub months: usize,
}

impl TrendWindow {
    pub fn months(months: usize) -> Self {
        Self { months }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketValue {
    Count,
    Percentage,
}

#[derive(Debug, Clone)]
pub struct TrendEvent<C> {
    pub date: NaiveDate,
    pub category: C,
    pub weight: u64,
}

impl<C> TrendEvent<C> {
    pub fn new(date: NaiveDate, category: C) -> Self {
        Self {
            date,
            category,
            weight: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyBucket<C: Ord> {
    pub label: String,
    pub year: i32,
    pub month: u32,
    /// Number of events that fell into this month.
    pub events: usize,
    /// Sum of event weights across all categories.
    pub population: u64,
    pub counts: BTreeMap<C, u64>,
}

impl<C: Ord> MonthlyBucket<C> {
    pub fn count(&self, category: &C) -> u64 {
        self.counts.get(category).copied().unwrap_or(0)
    }

    /// Share of this month's own events, 0.0 for an empty month.
    pub fn percentage(&self, category: &C) -> f64 {
        if self.population == 0 {
            0.0
        } else {
            self.count(category) as f64 / self.population as f64 * 100.0
        }
    }

    pub fn value(&self, category: &C, mode: BucketValue) -> f64 {
        match mode {
            BucketValue::Count => self.count(category) as f64,
            BucketValue::Percentage => self.percentage(category),
        }
    }
}

/// Buckets events into the `window.months` calendar months ending at `now`.
///
/// Every month in the window is present, oldest first, even when empty.
/// Events outside the window are dropped.
pub fn bucket<C: Ord + Clone>(
    events: &[TrendEvent<C>],
    window: TrendWindow,
    now: DateTime<Utc>,
) -> Vec<MonthlyBucket<C>> {
    if window.months == 0 {
        return Vec::new();
    }

    let today = now.date_naive();
    let last = month_index(today.year(), today.month());
    let first = last - (window.months as i64 - 1);

    let mut buckets: Vec<MonthlyBucket<C>> = (first..=last)
        .map(|index| {
            let (year, month) = from_month_index(index);
            MonthlyBucket {
                label: month_label(year, month),
                year,
                month,
                events: 0,
                population: 0,
                counts: BTreeMap::new(),
            }
        })
        .collect();

    for event in events {
        let index = month_index(event.date.year(), event.date.month());
        if index < first || index > last {
            continue;
        }
        let bucket = &mut buckets[(index - first) as usize];
        bucket.events += 1;
        bucket.population += event.weight;
        *bucket.counts.entry(event.category.clone()).or_insert(0) += event.weight;
    }

    buckets
}

/// Turns counted sessions into trend events keyed by outcome.
pub fn session_events(sessions: &[ClassifiedSession]) -> Vec<TrendEvent<SessionStatus>> {
    sessions
        .iter()
        .filter(|session| session.status != SessionStatus::Excluded)
        .filter_map(|session| {
            session
                .session_date
                .map(|date| TrendEvent::new(date, session.status))
        })
        .collect()
}

/// Completed sessions weighted by coached minutes, for the billing summary.
pub fn billing_events(sessions: &[ClassifiedSession]) -> Vec<TrendEvent<SessionStatus>> {
    sessions
        .iter()
        .filter(|session| session.status == SessionStatus::Completed)
        .filter_map(|session| {
            session.session_date.map(|date| TrendEvent {
                date,
                category: SessionStatus::Completed,
                weight: session.duration_minutes.unwrap_or(0).max(0) as u64,
            })
        })
        .collect()
}

fn month_index(year: i32, month: u32) -> i64 {
    year as i64 * 12 + (month as i64 - 1)
}

fn from_month_index(index: i64) -> (i32, u32) {
    (index.div_euclid(12) as i32, (index.rem_euclid(12) + 1) as u32)
}

fn month_label(year: i32, month: u32) -> String {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|date| date.format("%b %Y").to_string())
        .unwrap_or_else(|| format!("{year}-{month:02}"))
}
