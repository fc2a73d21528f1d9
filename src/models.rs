use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const UNASSIGNED_PROGRAM: &str = "Unassigned";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEmployeeRecord {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    pub program: Option<String>,
    pub program_title: Option<String>,
    pub coaching_program: Option<String>,
    pub cohort: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSessionRecord {
    pub id: String,
    pub employee_id: Option<String>,
    pub employee_name: Option<String>,
    pub employee_email: Option<String>,
    #[serde(default)]
    pub session_date: String,
    #[serde(default)]
    pub status: String,
    pub program_title: Option<String>,
    pub coaching_program: Option<String>,
    pub cohort: Option<String>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSurveyRecord {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub program_title: Option<String>,
    #[serde(default)]
    pub submitted_at: String,
}

/// A fetched, immutable view of all three sources.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub employees: Vec<RawEmployeeRecord>,
    pub sessions: Vec<RawSessionRecord>,
    pub surveys: Vec<RawSurveyRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeRecord {
    pub id: String,
    pub email: Option<String>,
    pub display_name: String,
    pub program: String,
    pub cohort: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub employee_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub session_date: Option<NaiveDate>,
    pub status_text: String,
    pub program: Option<String>,
    pub cohort: Option<String>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurveyRecord {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub program: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    NoShow,
    Scheduled,
    Excluded,
}

impl SessionStatus {
    pub fn label(self) -> &'static str {
        match self {
            SessionStatus::Completed => "completed",
            SessionStatus::NoShow => "no-show",
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Excluded => "excluded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifiedSession {
    pub session_date: Option<NaiveDate>,
    /// Program the session was delivered under.
    pub program: Option<String>,
    pub status: SessionStatus,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    Active,
    PendingMatch,
}

/// Unified engagement profile for one person.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonAggregate {
    pub key: String,
    pub email: Option<String>,
    pub display_name: String,
    pub program: String,
    pub cohort: Option<String>,
    pub avatar_url: Option<String>,
    pub completed: u32,
    pub no_show: u32,
    pub scheduled: u32,
    pub total: u32,
    pub latest_session_date: Option<NaiveDate>,
    pub status: AggregateStatus,
    pub survey_submitted_at: Option<DateTime<Utc>>,
}

impl PersonAggregate {
    pub fn new(key: String, display_name: String, program: String) -> Self {
        Self {
            key,
            email: None,
            display_name,
            program,
            cohort: None,
            avatar_url: None,
            completed: 0,
            no_show: 0,
            scheduled: 0,
            total: 0,
            latest_session_date: None,
            status: AggregateStatus::Active,
            survey_submitted_at: None,
        }
    }

    /// Counts one non-excluded session. Excluded sessions are ignored.
    pub fn record_session(&mut self, status: SessionStatus, date: Option<NaiveDate>) {
        match status {
            SessionStatus::Completed => self.completed += 1,
            SessionStatus::NoShow => self.no_show += 1,
            SessionStatus::Scheduled => self.scheduled += 1,
            SessionStatus::Excluded => return,
        }
        self.total += 1;
        if let Some(date) = date {
            self.latest_session_date = Some(match self.latest_session_date {
                Some(current) => current.max(date),
                None => date,
            });
        }
    }

    pub fn completion_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramSummary {
    pub program: String,
    pub people: usize,
    pub sessions: u32,
    pub completion_rate: f64,
}
