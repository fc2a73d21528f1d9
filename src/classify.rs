use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::models::SessionStatus;

const EXCLUDED_STATUSES: &[&str] = &["canceled", "cancelled"];
const NO_SHOW_MARKERS: &[&str] = &["no show", "noshow", "late cancel", "client no show"];
const COMPLETED_MARKER: &str = "completed";
const NO_LABEL: &str = "no label";

/// Classifies a free-text session status.
///
/// Cancellation is an exact match so that "Late Cancel" still lands in
/// `NoShow`. A missing date is never treated as past.
pub fn classify(
    status_text: &str,
    session_date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> SessionStatus {
    let status = status_text.trim().to_lowercase();

    if EXCLUDED_STATUSES.contains(&status.as_str()) {
        return SessionStatus::Excluded;
    }

    if NO_SHOW_MARKERS.iter().any(|marker| status.contains(marker)) {
        return SessionStatus::NoShow;
    }

    let in_past = session_date.is_some_and(|date| is_before(date, now));
    if status.contains(COMPLETED_MARKER) || ((status.is_empty() || status == NO_LABEL) && in_past)
    {
        return SessionStatus::Completed;
    }

    SessionStatus::Scheduled
}

fn is_before(date: NaiveDate, now: DateTime<Utc>) -> bool {
    date.and_time(NaiveTime::MIN).and_utc() < now
}
