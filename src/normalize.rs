//! Maps each source's raw record shape onto one canonical field set.
//!
//! Field fallbacks are declared as ordered accessor tables; the first
//! non-blank value wins.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{
    EmployeeRecord, RawEmployeeRecord, RawSessionRecord, RawSurveyRecord, SessionRecord,
    Snapshot, SurveyRecord, UNASSIGNED_PROGRAM,
};

type Accessor<R> = fn(&R) -> Option<&str>;

const EMPLOYEE_PROGRAM_PRECEDENCE: &[Accessor<RawEmployeeRecord>] = &[
    employee_program_title,
    employee_program,
    employee_coaching_program,
];

const SESSION_PROGRAM_PRECEDENCE: &[Accessor<RawSessionRecord>] =
    &[session_program_title, session_coaching_program];

const SURVEY_PROGRAM_PRECEDENCE: &[Accessor<RawSurveyRecord>] = &[survey_program_title];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const ZONED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Roster,
    Session,
    Survey,
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecordSource::Roster => "roster",
            RecordSource::Session => "session",
            RecordSource::Survey => "survey",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("{origin} record {id} has neither an email nor a usable name")]
    MissingIdentity { origin: RecordSource, id: String },
    #[error("survey record {id} has no email")]
    MissingEmail { id: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipTally {
    pub employees: usize,
    pub sessions: usize,
    pub surveys: usize,
}

impl SkipTally {
    pub fn total(&self) -> usize {
        self.employees + self.sessions + self.surveys
    }

    fn record(&mut self, reason: &SkipReason) {
        tracing::debug!(%reason, "skipping record");
        match reason {
            SkipReason::MissingIdentity {
                origin: RecordSource::Roster,
                ..
            } => self.employees += 1,
            SkipReason::MissingIdentity {
                origin: RecordSource::Session,
                ..
            } => self.sessions += 1,
            SkipReason::MissingIdentity {
                origin: RecordSource::Survey,
                ..
            }
            | SkipReason::MissingEmail { .. } => self.surveys += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedSnapshot {
    pub employees: Vec<EmployeeRecord>,
    pub sessions: Vec<SessionRecord>,
    pub surveys: Vec<SurveyRecord>,
    pub skipped: SkipTally,
}

pub fn normalize_snapshot(snapshot: &Snapshot) -> NormalizedSnapshot {
    let mut skipped = SkipTally::default();

    let mut employees = Vec::with_capacity(snapshot.employees.len());
    for raw in &snapshot.employees {
        match normalize_employee(raw) {
            Ok(record) => employees.push(record),
            Err(reason) => skipped.record(&reason),
        }
    }

    let roster: HashMap<&str, &EmployeeRecord> = employees
        .iter()
        .map(|employee| (employee.id.as_str(), employee))
        .collect();

    let mut sessions = Vec::with_capacity(snapshot.sessions.len());
    for raw in &snapshot.sessions {
        match normalize_session(raw, &roster) {
            Ok(record) => sessions.push(record),
            Err(reason) => skipped.record(&reason),
        }
    }

    let mut surveys = Vec::with_capacity(snapshot.surveys.len());
    for raw in &snapshot.surveys {
        match normalize_survey(raw) {
            Ok(record) => surveys.push(record),
            Err(reason) => skipped.record(&reason),
        }
    }

    NormalizedSnapshot {
        employees,
        sessions,
        surveys,
        skipped,
    }
}

pub fn normalize_employee(raw: &RawEmployeeRecord) -> Result<EmployeeRecord, SkipReason> {
    let email = normalize_email(raw.email.as_deref());
    let display_name = full_name(&raw.first_name, &raw.last_name);

    let display_name = match (display_name, &email) {
        (Some(name), _) => name,
        (None, Some(email)) => email.clone(),
        (None, None) => {
            return Err(SkipReason::MissingIdentity {
                origin: RecordSource::Roster,
                id: raw.id.clone(),
            })
        }
    };

    Ok(EmployeeRecord {
        id: raw.id.trim().to_string(),
        email,
        display_name,
        program: first_present(raw, EMPLOYEE_PROGRAM_PRECEDENCE)
            .unwrap_or_else(|| UNASSIGNED_PROGRAM.to_string()),
        cohort: clean(raw.cohort.as_deref()),
        avatar_url: clean(raw.avatar_url.as_deref()),
    })
}

/// Sessions that only carry an employee id borrow email and name from the roster.
pub fn normalize_session(
    raw: &RawSessionRecord,
    roster: &HashMap<&str, &EmployeeRecord>,
) -> Result<SessionRecord, SkipReason> {
    let employee_id = clean(raw.employee_id.as_deref());
    let linked = employee_id
        .as_deref()
        .and_then(|id| roster.get(id).copied());

    let email = normalize_email(raw.employee_email.as_deref())
        .or_else(|| linked.and_then(|employee| employee.email.clone()));
    let display_name = clean(raw.employee_name.as_deref())
        .map(|name| collapse_whitespace(&name))
        .or_else(|| linked.map(|employee| employee.display_name.clone()));

    if email.is_none() && display_name.is_none() {
        return Err(SkipReason::MissingIdentity {
            origin: RecordSource::Session,
            id: raw.id.clone(),
        });
    }

    Ok(SessionRecord {
        id: raw.id.trim().to_string(),
        employee_id,
        email,
        display_name,
        session_date: parse_date(&raw.session_date),
        status_text: raw.status.clone(),
        program: first_present(raw, SESSION_PROGRAM_PRECEDENCE),
        cohort: clean(raw.cohort.as_deref()),
        duration_minutes: raw.duration_minutes.filter(|minutes| *minutes >= 0),
    })
}

pub fn normalize_survey(raw: &RawSurveyRecord) -> Result<SurveyRecord, SkipReason> {
    let Some(email) = normalize_email(Some(&raw.email)) else {
        return Err(SkipReason::MissingEmail { id: raw.id.clone() });
    };

    Ok(SurveyRecord {
        id: raw.id.trim().to_string(),
        email,
        display_name: full_name(&raw.first_name, &raw.last_name),
        program: first_present(raw, SURVEY_PROGRAM_PRECEDENCE),
        submitted_at: parse_timestamp(&raw.submitted_at),
    })
}

/// Lower-cased, trimmed, whitespace-collapsed name used as a fallback key.
pub fn normalized_name_key(name: &str) -> String {
    collapse_whitespace(&name.to_lowercase())
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .or_else(|| parse_timestamp(value).map(|timestamp| timestamp.date_naive()))
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }
    if let Some(timestamp) = ZONED_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(value, format).ok())
    {
        return Some(timestamp.with_timezone(&Utc));
    }
    if let Some(naive) = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
    {
        return Some(naive.and_utc());
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn employee_program_title(record: &RawEmployeeRecord) -> Option<&str> {
    record.program_title.as_deref()
}

fn employee_program(record: &RawEmployeeRecord) -> Option<&str> {
    record.program.as_deref()
}

fn employee_coaching_program(record: &RawEmployeeRecord) -> Option<&str> {
    record.coaching_program.as_deref()
}

fn session_program_title(record: &RawSessionRecord) -> Option<&str> {
    record.program_title.as_deref()
}

fn session_coaching_program(record: &RawSessionRecord) -> Option<&str> {
    record.coaching_program.as_deref()
}

fn survey_program_title(record: &RawSurveyRecord) -> Option<&str> {
    record.program_title.as_deref()
}

fn first_present<R>(record: &R, precedence: &[Accessor<R>]) -> Option<String> {
    precedence
        .iter()
        .find_map(|accessor| clean(accessor(record)))
}

fn normalize_email(value: Option<&str>) -> Option<String> {
    clean(value)
        .filter(|email| email.contains('@'))
        .map(|email| email.to_lowercase())
}

fn full_name(first: &str, last: &str) -> Option<String> {
    let joined = collapse_whitespace(&format!("{first} {last}"));
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
