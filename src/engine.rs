//! Folds roster, session and survey records into per-person aggregates.
//!
//! Stages run in the fixed order of [`PIPELINE`]. Later stages only touch
//! the fields they own: sessions overwrite the roster's name and program,
//! surveys only ever mark people without sessions as pending a match.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::classify;
use crate::identity::find_matching_key;
use crate::models::{
    AggregateStatus, ClassifiedSession, EmployeeRecord, PersonAggregate, SessionRecord,
    SessionStatus, Snapshot, SurveyRecord, UNASSIGNED_PROGRAM,
};
use crate::normalize::{normalize_snapshot, normalized_name_key, NormalizedSnapshot, SkipTally};
use crate::suppression::{SuppressedIdentities, SuppressionSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Roster,
    Sessions,
    Surveys,
}

pub const PIPELINE: [Stage; 3] = [Stage::Roster, Stage::Sessions, Stage::Surveys];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub skipped: SkipTally,
    pub suppressed: usize,
    pub excluded_sessions: usize,
    pub counted_sessions: usize,
    pub created: usize,
    pub merged: usize,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub aggregates: Vec<PersonAggregate>,
    /// Sessions of non-suppressed people, excluded ones included.
    pub sessions: Vec<ClassifiedSession>,
    pub stats: IngestStats,
}

pub fn ingest(
    snapshot: &Snapshot,
    suppression: &SuppressionSet,
    now: DateTime<Utc>,
) -> IngestOutcome {
    ingest_normalized(normalize_snapshot(snapshot), suppression, now)
}

#[tracing::instrument(skip_all, fields(
    employees = normalized.employees.len(),
    sessions = normalized.sessions.len(),
    surveys = normalized.surveys.len()
))]
pub fn ingest_normalized(
    mut normalized: NormalizedSnapshot,
    suppression: &SuppressionSet,
    now: DateTime<Utc>,
) -> IngestOutcome {
    canonical_order(&mut normalized);

    let suppressed = SuppressedIdentities::resolve(suppression, &normalized.employees);
    let mut fold = Fold {
        pool: AggregatePool::default(),
        suppressed,
        now,
        session_emails: HashSet::new(),
        sessions: Vec::new(),
        session_slots: Vec::new(),
        stats: IngestStats {
            skipped: normalized.skipped,
            ..IngestStats::default()
        },
    };

    for stage in PIPELINE {
        match stage {
            Stage::Roster => fold.roster(&normalized.employees),
            Stage::Sessions => fold.sessions(&normalized.sessions),
            Stage::Surveys => fold.surveys(&normalized.surveys),
        }
        tracing::debug!(?stage, aggregates = fold.pool.entries.len(), "stage folded");
    }

    let Fold {
        pool,
        mut sessions,
        session_slots,
        stats,
        ..
    } = fold;

    // Counted sessions report the program their person ended up in.
    for (session, slot) in sessions.iter_mut().zip(session_slots) {
        if let Some(slot) = slot {
            session.program = Some(pool.entries[slot].program.clone());
        }
    }

    let mut aggregates = pool.entries;
    aggregates.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.key.cmp(&b.key))
    });

    tracing::info!(
        aggregates = aggregates.len(),
        counted_sessions = stats.counted_sessions,
        excluded_sessions = stats.excluded_sessions,
        suppressed = stats.suppressed,
        skipped = stats.skipped.total(),
        "ingest complete"
    );

    IngestOutcome {
        aggregates,
        sessions,
        stats,
    }
}

/// Sorts every source so that results never depend on fetch order.
/// Sessions go oldest first, which lets the most recent session win the
/// name and program overwrite.
fn canonical_order(normalized: &mut NormalizedSnapshot) {
    normalized.employees.sort_by(|a, b| {
        a.id.cmp(&b.id)
            .then_with(|| a.email.cmp(&b.email))
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
    normalized.sessions.sort_by(|a, b| {
        a.session_date
            .cmp(&b.session_date)
            .then_with(|| a.id.cmp(&b.id))
    });
    normalized.surveys.sort_by(|a, b| {
        a.submitted_at
            .cmp(&b.submitted_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[derive(Debug, Default)]
struct AggregatePool {
    entries: Vec<PersonAggregate>,
    index: HashMap<String, usize>,
}

impl AggregatePool {
    fn resolve(&self, email: Option<&str>, name: Option<&str>) -> Option<usize> {
        find_matching_key(&self.entries, email, name).and_then(|key| self.index.get(key).copied())
    }

    /// Inserts a new aggregate, or hands back the slot already holding its key.
    fn insert(&mut self, aggregate: PersonAggregate) -> (usize, bool) {
        if let Some(&slot) = self.index.get(&aggregate.key) {
            return (slot, false);
        }
        let slot = self.entries.len();
        self.index.insert(aggregate.key.clone(), slot);
        self.entries.push(aggregate);
        (slot, true)
    }
}

struct Fold<'a> {
    pool: AggregatePool,
    suppressed: SuppressedIdentities<'a>,
    now: DateTime<Utc>,
    session_emails: HashSet<String>,
    sessions: Vec<ClassifiedSession>,
    /// Pool slot of each counted entry in `sessions`, `None` for excluded ones.
    session_slots: Vec<Option<usize>>,
    stats: IngestStats,
}

impl Fold<'_> {
    fn roster(&mut self, employees: &[EmployeeRecord]) {
        for employee in employees {
            if self.suppressed.employee(employee) {
                self.stats.suppressed += 1;
                continue;
            }

            let email = employee.email.as_deref();
            let slot = match self
                .pool
                .resolve(email, Some(employee.display_name.as_str()))
            {
                Some(slot) => {
                    self.stats.merged += 1;
                    slot
                }
                None => {
                    let aggregate = PersonAggregate::new(
                        identity_key(email, &employee.display_name),
                        employee.display_name.clone(),
                        employee.program.clone(),
                    );
                    self.create(aggregate)
                }
            };

            let aggregate = &mut self.pool.entries[slot];
            if aggregate.program == UNASSIGNED_PROGRAM && employee.program != UNASSIGNED_PROGRAM {
                aggregate.program = employee.program.clone();
            }
            fill(&mut aggregate.email, &employee.email);
            fill(&mut aggregate.cohort, &employee.cohort);
            fill(&mut aggregate.avatar_url, &employee.avatar_url);
        }
    }

    fn sessions(&mut self, sessions: &[SessionRecord]) {
        for session in sessions {
            let ids: Vec<&str> = session.employee_id.iter().map(String::as_str).collect();
            if self.suppressed.person(
                &ids,
                session.email.as_deref(),
                session.display_name.as_deref(),
            ) {
                self.stats.suppressed += 1;
                continue;
            }

            let status = classify(&session.status_text, session.session_date, self.now);
            if status == SessionStatus::Excluded {
                self.stats.excluded_sessions += 1;
                self.sessions.push(ClassifiedSession {
                    session_date: session.session_date,
                    program: session.program.clone(),
                    status,
                    duration_minutes: session.duration_minutes,
                });
                self.session_slots.push(None);
                continue;
            }

            let email = session.email.as_deref();
            let name = session.display_name.as_deref();
            let slot = match self.pool.resolve(email, name) {
                Some(slot) => {
                    self.stats.merged += 1;
                    slot
                }
                None => {
                    let display_name = name.or(email).unwrap_or_default().to_string();
                    let aggregate = PersonAggregate::new(
                        identity_key(email, &display_name),
                        display_name,
                        UNASSIGNED_PROGRAM.to_string(),
                    );
                    self.create(aggregate)
                }
            };

            let aggregate = &mut self.pool.entries[slot];
            if let Some(name) = name {
                aggregate.display_name = name.to_string();
            }
            if let Some(program) = &session.program {
                aggregate.program = program.clone();
            }
            fill(&mut aggregate.email, &session.email);
            fill(&mut aggregate.cohort, &session.cohort);
            aggregate.status = AggregateStatus::Active;
            aggregate.record_session(status, session.session_date);
            self.stats.counted_sessions += 1;
            self.sessions.push(ClassifiedSession {
                session_date: session.session_date,
                program: Some(aggregate.program.clone()),
                status,
                duration_minutes: session.duration_minutes,
            });
            self.session_slots.push(Some(slot));

            if let Some(email) = &aggregate.email {
                self.session_emails.insert(email.to_lowercase());
            }
            if let Some(email) = &session.email {
                self.session_emails.insert(email.to_lowercase());
            }
        }
    }

    fn surveys(&mut self, surveys: &[SurveyRecord]) {
        for survey in surveys {
            if self.session_emails.contains(&survey.email) {
                continue;
            }
            if self.suppressed.person(
                &[],
                Some(survey.email.as_str()),
                survey.display_name.as_deref(),
            ) {
                self.stats.suppressed += 1;
                continue;
            }

            match self
                .pool
                .resolve(Some(survey.email.as_str()), survey.display_name.as_deref())
            {
                Some(slot) => {
                    let aggregate = &mut self.pool.entries[slot];
                    if aggregate.total > 0 {
                        continue;
                    }
                    self.stats.merged += 1;
                    aggregate.status = AggregateStatus::PendingMatch;
                    aggregate.survey_submitted_at =
                        aggregate.survey_submitted_at.max(survey.submitted_at);
                    if aggregate.email.is_none() {
                        aggregate.email = Some(survey.email.clone());
                    }
                }
                None => {
                    let mut aggregate = PersonAggregate::new(
                        survey.email.clone(),
                        survey
                            .display_name
                            .clone()
                            .unwrap_or_else(|| survey.email.clone()),
                        survey
                            .program
                            .clone()
                            .unwrap_or_else(|| UNASSIGNED_PROGRAM.to_string()),
                    );
                    aggregate.email = Some(survey.email.clone());
                    aggregate.status = AggregateStatus::PendingMatch;
                    aggregate.survey_submitted_at = survey.submitted_at;
                    self.create(aggregate);
                }
            }
        }
    }

    fn create(&mut self, aggregate: PersonAggregate) -> usize {
        let (slot, created) = self.pool.insert(aggregate);
        if created {
            self.stats.created += 1;
        } else {
            self.stats.merged += 1;
        }
        slot
    }
}

fn identity_key(email: Option<&str>, display_name: &str) -> String {
    match email {
        Some(email) => email.to_lowercase(),
        None => normalized_name_key(display_name),
    }
}

fn fill(target: &mut Option<String>, value: &Option<String>) {
    if target.is_none() {
        target.clone_from(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawEmployeeRecord, RawSessionRecord, RawSurveyRecord};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    fn employee(id: &str, first: &str, last: &str, email: Option<&str>) -> RawEmployeeRecord {
        RawEmployeeRecord {
            id: id.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: email.map(str::to_string),
            program: Some("GROW".into()),
            ..Default::default()
        }
    }

    fn session(id: &str, name: Option<&str>, email: Option<&str>, status: &str, date: &str) -> RawSessionRecord {
        RawSessionRecord {
            id: id.to_string(),
            employee_name: name.map(str::to_string),
            employee_email: email.map(str::to_string),
            session_date: date.to_string(),
            status: status.to_string(),
            ..Default::default()
        }
    }

    fn survey(id: &str, email: &str, first: &str, last: &str) -> RawSurveyRecord {
        RawSurveyRecord {
            id: id.to_string(),
            email: email.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            program_title: None,
            submitted_at: "2026-01-10T09:00:00Z".into(),
        }
    }

    fn assert_counters_consistent(aggregates: &[PersonAggregate]) {
        for aggregate in aggregates {
            assert_eq!(
                aggregate.total,
                aggregate.completed + aggregate.no_show + aggregate.scheduled,
                "{}",
                aggregate.key
            );
        }
    }

    #[test]
    fn roster_and_completed_session_make_one_active_aggregate() {
        let snapshot = Snapshot {
            employees: vec![employee("e1", "Alice", "Johnson", Some("alice@x.com"))],
            sessions: vec![session("s1", Some("Alice Johnson"), None, "Completed", "2026-02-01")],
            surveys: vec![],
        };
        let outcome = ingest(&snapshot, &SuppressionSet::default(), now());

        assert_eq!(outcome.aggregates.len(), 1);
        let alice = &outcome.aggregates[0];
        assert_eq!(alice.key, "alice@x.com");
        assert_eq!(alice.program, "GROW");
        assert_eq!((alice.completed, alice.total), (1, 1));
        assert_eq!(alice.status, AggregateStatus::Active);
    }

    #[test]
    fn survey_only_person_is_pending_match() {
        let snapshot = Snapshot {
            surveys: vec![survey("v1", "bob@x.com", "Bob", "Reyes")],
            ..Default::default()
        };
        let outcome = ingest(&snapshot, &SuppressionSet::default(), now());

        assert_eq!(outcome.aggregates.len(), 1);
        let bob = &outcome.aggregates[0];
        assert_eq!(bob.status, AggregateStatus::PendingMatch);
        assert_eq!(bob.total, 0);
        assert!(bob.survey_submitted_at.is_some());
    }

    #[test]
    fn late_cancel_counts_and_cancel_is_excluded() {
        let snapshot = Snapshot {
            sessions: vec![
                session("s1", Some("Jules Moreno"), Some("jules@x.com"), "Late Cancel", "2026-02-01"),
                session("s2", Some("Jules Moreno"), Some("jules@x.com"), "Canceled", "2026-02-08"),
            ],
            ..Default::default()
        };
        let outcome = ingest(&snapshot, &SuppressionSet::default(), now());

        let jules = &outcome.aggregates[0];
        assert_eq!((jules.no_show, jules.total), (1, 1));
        assert_eq!(jules.latest_session_date, chrono::NaiveDate::from_ymd_opt(2026, 2, 1));
        assert_eq!(outcome.stats.excluded_sessions, 1);
        assert_eq!(outcome.stats.counted_sessions, 1);
        assert_eq!(outcome.sessions.len(), 2);
    }

    #[test]
    fn nickname_merges_roster_and_session_without_email() {
        let snapshot = Snapshot {
            employees: vec![employee("e1", "Mike", "Johnson", None)],
            sessions: vec![session("s1", Some("Michael Johnson"), None, "", "2026-02-01")],
            surveys: vec![],
        };
        let outcome = ingest(&snapshot, &SuppressionSet::default(), now());

        assert_eq!(outcome.aggregates.len(), 1);
        let michael = &outcome.aggregates[0];
        assert_eq!(michael.key, "mike johnson");
        assert_eq!(michael.display_name, "Michael Johnson");
        assert_eq!((michael.completed, michael.total), (1, 1));
    }

    #[test]
    fn same_email_across_all_sources_yields_one_aggregate() {
        let snapshot = Snapshot {
            employees: vec![employee("e1", "Kiara", "Patel", Some("kiara@x.com"))],
            sessions: vec![session("s1", Some("Kiara Patel"), Some("KIARA@x.com"), "No Show", "2026-02-01")],
            surveys: vec![survey("v1", "kiara@x.com", "Kiara", "Patel")],
        };
        let outcome = ingest(&snapshot, &SuppressionSet::default(), now());

        assert_eq!(outcome.aggregates.len(), 1);
        let kiara = &outcome.aggregates[0];
        assert_eq!(kiara.status, AggregateStatus::Active);
        assert_eq!(kiara.survey_submitted_at, None);
        assert_eq!(kiara.no_show, 1);
    }

    #[test]
    fn survey_marks_roster_only_person_pending() {
        let snapshot = Snapshot {
            employees: vec![employee("e1", "Avery", "Lee", Some("avery@x.com"))],
            surveys: vec![survey("v1", "avery@x.com", "Avery", "Lee")],
            ..Default::default()
        };
        let outcome = ingest(&snapshot, &SuppressionSet::default(), now());

        assert_eq!(outcome.aggregates.len(), 1);
        assert_eq!(outcome.aggregates[0].status, AggregateStatus::PendingMatch);
        assert_eq!(outcome.aggregates[0].program, "GROW");
    }

    #[test]
    fn survey_never_touches_a_person_with_sessions_matched_by_name() {
        let snapshot = Snapshot {
            sessions: vec![session("s1", Some("Ed Sorenson"), None, "Completed", "2026-02-01")],
            surveys: vec![survey("v1", "eddie@x.com", "Eddie", "Sorensen")],
            ..Default::default()
        };
        let outcome = ingest(&snapshot, &SuppressionSet::default(), now());

        assert_eq!(outcome.aggregates.len(), 1);
        let ed = &outcome.aggregates[0];
        assert_eq!(ed.status, AggregateStatus::Active);
        assert_eq!(ed.survey_submitted_at, None);
        assert_eq!(ed.email, None);
    }

    #[test]
    fn survey_from_secondary_session_email_is_skipped() {
        let snapshot = Snapshot {
            employees: vec![employee("e1", "Alice", "Johnson", Some("alice@x.com"))],
            sessions: vec![session(
                "s1",
                Some("Alice Johnson"),
                Some("ajohnson@corp.com"),
                "Completed",
                "2026-02-01",
            )],
            surveys: vec![survey("v1", "ajohnson@corp.com", "", "")],
        };
        let outcome = ingest(&snapshot, &SuppressionSet::default(), now());

        assert_eq!(outcome.aggregates.len(), 1);
        let alice = &outcome.aggregates[0];
        assert_eq!(alice.key, "alice@x.com");
        assert_eq!(alice.status, AggregateStatus::Active);
        assert_eq!(alice.total, 1);
        assert!(alice.survey_submitted_at.is_none());
    }

    #[test]
    fn counted_sessions_carry_the_final_program() {
        let snapshot = Snapshot {
            sessions: vec![
                session("s1", Some("Avery Lee"), None, "Completed", "2026-01-05"),
                RawSessionRecord {
                    program_title: Some("GROW".into()),
                    ..session("s2", Some("Avery Lee"), None, "No Show", "2026-02-02")
                },
                RawSessionRecord {
                    program_title: Some("LEAD".into()),
                    ..session("s3", Some("Avery Lee"), None, "Canceled", "2026-02-09")
                },
            ],
            ..Default::default()
        };
        let outcome = ingest(&snapshot, &SuppressionSet::default(), now());

        assert_eq!(outcome.aggregates.len(), 1);
        assert_eq!(outcome.aggregates[0].program, "GROW");
        let programs: Vec<Option<&str>> = outcome
            .sessions
            .iter()
            .map(|session| session.program.as_deref())
            .collect();
        assert_eq!(programs, [Some("GROW"), Some("GROW"), Some("LEAD")]);
    }

    #[test]
    fn sessions_overwrite_roster_name_and_program() {
        let mut roster = employee("e1", "Jules", "Moreno", Some("jules@x.com"));
        roster.program = None;
        let mut later = session("s2", Some("Julianne Moreno"), Some("jules@x.com"), "Completed", "2026-02-09");
        later.program_title = Some("LEAD".into());
        let mut earlier = session("s1", Some("Jules Moreno"), Some("jules@x.com"), "Completed", "2026-01-09");
        earlier.program_title = Some("GROW".into());

        let snapshot = Snapshot {
            employees: vec![roster],
            sessions: vec![later, earlier],
            surveys: vec![],
        };
        let outcome = ingest(&snapshot, &SuppressionSet::default(), now());

        let jules = &outcome.aggregates[0];
        assert_eq!(jules.display_name, "Julianne Moreno");
        assert_eq!(jules.program, "LEAD");
        assert_eq!(jules.total, 2);
    }

    #[test]
    fn unassigned_roster_program_is_upgraded_by_later_roster_row() {
        let mut first = employee("e1", "Avery", "Lee", Some("avery@x.com"));
        first.program = None;
        let mut second = employee("e2", "Avery", "Lee", Some("avery@x.com"));
        second.program = Some("LEAD".into());
        let mut third = employee("e3", "Avery", "Lee", Some("avery@x.com"));
        third.program = Some("GROW".into());

        let snapshot = Snapshot {
            employees: vec![third, second, first],
            ..Default::default()
        };
        let outcome = ingest(&snapshot, &SuppressionSet::default(), now());

        assert_eq!(outcome.aggregates.len(), 1);
        assert_eq!(outcome.aggregates[0].program, "LEAD");
        assert_eq!(outcome.stats.merged, 2);
    }

    #[test]
    fn suppressed_person_never_materializes() {
        let snapshot = Snapshot {
            employees: vec![employee("e1", "Mike", "Johnson", Some("mike@x.com"))],
            sessions: vec![
                session("s1", Some("Michael Johnson"), None, "Completed", "2026-02-01"),
                RawSessionRecord {
                    employee_id: Some("e1".into()),
                    ..session("s2", None, None, "Completed", "2026-02-02")
                },
            ],
            surveys: vec![survey("v1", "mike@x.com", "Mike", "Johnson")],
        };
        let outcome = ingest(&snapshot, &SuppressionSet::new(["e1"]), now());

        assert!(outcome.aggregates.is_empty());
        assert_eq!(outcome.stats.suppressed, 4);
        assert!(outcome.sessions.is_empty());
    }

    #[test]
    fn test_accounts_are_dropped_from_roster() {
        let snapshot = Snapshot {
            employees: vec![
                employee("e1", "Test", "User", Some("admin@x.com")),
                employee("e2", "Avery", "Lee", Some("avery@x.com")),
            ],
            ..Default::default()
        };
        let outcome = ingest(&snapshot, &SuppressionSet::default(), now());
        assert_eq!(outcome.aggregates.len(), 1);
        assert_eq!(outcome.aggregates[0].display_name, "Avery Lee");
    }

    #[test]
    fn anonymous_records_are_tallied_not_counted() {
        let snapshot = Snapshot {
            sessions: vec![session("s1", None, None, "Completed", "2026-02-01")],
            ..Default::default()
        };
        let outcome = ingest(&snapshot, &SuppressionSet::default(), now());
        assert!(outcome.aggregates.is_empty());
        assert_eq!(outcome.stats.skipped.sessions, 1);
    }

    #[test]
    fn output_is_independent_of_input_order() {
        let employees = vec![
            employee("e1", "Avery", "Lee", Some("avery@x.com")),
            employee("e2", "Brad", "Pitt", None),
            employee("e3", "Kiara", "Patel", Some("kiara@x.com")),
        ];
        let sessions = vec![
            session("s1", Some("Bradley Pitt"), None, "Completed", "2026-01-05"),
            session("s2", Some("Avery Lee"), Some("avery@x.com"), "No Show", "2026-02-05"),
            session("s3", Some("Kiara Patel"), None, "", "2026-04-05"),
            session("s4", Some("Jules Moreno"), Some("jules@x.com"), "Canceled", "2026-02-05"),
        ];
        let surveys = vec![
            survey("v1", "bob@x.com", "Bob", "Reyes"),
            survey("v2", "avery@x.com", "Avery", "Lee"),
        ];

        let forward = Snapshot {
            employees: employees.clone(),
            sessions: sessions.clone(),
            surveys: surveys.clone(),
        };
        let reversed = Snapshot {
            employees: employees.into_iter().rev().collect(),
            sessions: sessions.into_iter().rev().collect(),
            surveys: surveys.into_iter().rev().collect(),
        };

        let first = ingest(&forward, &SuppressionSet::default(), now());
        let second = ingest(&forward, &SuppressionSet::default(), now());
        let third = ingest(&reversed, &SuppressionSet::default(), now());

        assert_eq!(first.aggregates, second.aggregates);
        assert_eq!(first.aggregates, third.aggregates);
        assert_counters_consistent(&first.aggregates);

        let names: Vec<&str> = first
            .aggregates
            .iter()
            .map(|aggregate| aggregate.display_name.as_str())
            .collect();
        assert_eq!(names, ["Avery Lee", "Bob Reyes", "Bradley Pitt", "Kiara Patel"]);
        assert_eq!(first.aggregates[3].scheduled, 1);
    }
}
