use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::engine::{IngestOutcome, IngestStats};
use crate::models::{
    AggregateStatus, ClassifiedSession, PersonAggregate, ProgramSummary, SessionStatus,
};
use crate::trend::{self, MonthlyBucket, TrendWindow};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Headline {
    pub headcount: usize,
    pub active: usize,
    pub pending_match: usize,
    pub sessions: u32,
    pub completed: u32,
    pub no_show: u32,
    pub scheduled: u32,
    pub completion_rate: f64,
}

pub fn headline(aggregates: &[PersonAggregate]) -> Headline {
    let mut headline = Headline {
        headcount: aggregates.len(),
        ..Headline::default()
    };

    for aggregate in aggregates {
        match aggregate.status {
            AggregateStatus::Active => headline.active += 1,
            AggregateStatus::PendingMatch => headline.pending_match += 1,
        }
        headline.sessions += aggregate.total;
        headline.completed += aggregate.completed;
        headline.no_show += aggregate.no_show;
        headline.scheduled += aggregate.scheduled;
    }

    let resolved = headline.completed + headline.no_show;
    if resolved > 0 {
        headline.completion_rate = headline.completed as f64 / resolved as f64 * 100.0;
    }
    headline
}

pub fn summarize_by_program(aggregates: &[PersonAggregate]) -> Vec<ProgramSummary> {
    let mut map: BTreeMap<&str, (usize, u32, u32)> = BTreeMap::new();

    for aggregate in aggregates {
        let entry = map.entry(aggregate.program.as_str()).or_insert((0, 0, 0));
        entry.0 += 1;
        entry.1 += aggregate.total;
        entry.2 += aggregate.completed;
    }

    let mut summaries: Vec<ProgramSummary> = map
        .into_iter()
        .map(|(program, (people, sessions, completed))| ProgramSummary {
            program: program.to_string(),
            people,
            sessions,
            completion_rate: if sessions == 0 {
                0.0
            } else {
                completed as f64 / sessions as f64 * 100.0
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.people.cmp(&a.people).then_with(|| a.program.cmp(&b.program)));
    summaries
}

/// Narrows an outcome to one program, matched case-insensitively.
///
/// Session counters are recomputed for the program; skip and suppression
/// tallies stay snapshot-wide since those records never reach a program.
pub fn scoped(outcome: &IngestOutcome, program: Option<&str>) -> IngestOutcome {
    let Some(program) = program else {
        return outcome.clone();
    };
    let matches = |candidate: &str| candidate.eq_ignore_ascii_case(program.trim());

    let sessions: Vec<ClassifiedSession> = outcome
        .sessions
        .iter()
        .filter(|session| session.program.as_deref().is_some_and(|p| matches(p)))
        .cloned()
        .collect();
    let excluded_sessions = sessions
        .iter()
        .filter(|session| session.status == SessionStatus::Excluded)
        .count();

    IngestOutcome {
        aggregates: outcome
            .aggregates
            .iter()
            .filter(|aggregate| matches(aggregate.program.as_str()))
            .cloned()
            .collect(),
        stats: IngestStats {
            excluded_sessions,
            counted_sessions: sessions.len() - excluded_sessions,
            ..outcome.stats
        },
        sessions,
    }
}

pub fn session_trend(
    outcome: &IngestOutcome,
    window: TrendWindow,
    now: DateTime<Utc>,
) -> Vec<MonthlyBucket<SessionStatus>> {
    trend::bucket(&trend::session_events(&outcome.sessions), window, now)
}

pub fn billing_trend(
    outcome: &IngestOutcome,
    window: TrendWindow,
    now: DateTime<Utc>,
) -> Vec<MonthlyBucket<SessionStatus>> {
    trend::bucket(&trend::billing_events(&outcome.sessions), window, now)
}

pub fn build_report(
    scope: Option<&str>,
    now: DateTime<Utc>,
    window: TrendWindow,
    outcome: &IngestOutcome,
) -> String {
    let aggregates = &outcome.aggregates;
    let headline = headline(aggregates);
    let programs = summarize_by_program(aggregates);

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all programs");

    let _ = writeln!(output, "# Coaching Engagement Report");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        scope_label,
        now.date_naive()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Engagement Summary");
    let _ = writeln!(
        output,
        "- People: {} ({} active, {} pending match)",
        headline.headcount, headline.active, headline.pending_match
    );
    let _ = writeln!(
        output,
        "- Sessions: {} ({} completed, {} no-show, {} scheduled)",
        headline.sessions, headline.completed, headline.no_show, headline.scheduled
    );
    let _ = writeln!(output, "- Completion rate: {:.1}%", headline.completion_rate);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Program Mix");

    if programs.is_empty() {
        let _ = writeln!(output, "No people enrolled.");
    } else {
        for summary in programs.iter() {
            let _ = writeln!(
                output,
                "- {}: {} people, {} sessions ({:.1}% completed)",
                summary.program, summary.people, summary.sessions, summary.completion_rate
            );
        }
    }

    let mut engaged: Vec<&PersonAggregate> = aggregates
        .iter()
        .filter(|aggregate| aggregate.total > 0)
        .collect();
    engaged.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.key.cmp(&b.key)));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Engaged People");

    if engaged.is_empty() {
        let _ = writeln!(output, "No sessions recorded.");
    } else {
        for aggregate in engaged.iter().take(10) {
            let last_seen = aggregate
                .latest_session_date
                .map(|date| date.to_string())
                .unwrap_or_else(|| "undated".to_string());
            let _ = writeln!(
                output,
                "- {} ({}) {} sessions, {:.0}% completed, last {}",
                aggregate.display_name,
                aggregate.program,
                aggregate.total,
                aggregate.completion_rate(),
                last_seen
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Pending Matches");
    let pending: Vec<&PersonAggregate> = aggregates
        .iter()
        .filter(|aggregate| aggregate.status == AggregateStatus::PendingMatch)
        .collect();

    if pending.is_empty() {
        let _ = writeln!(output, "Every survey respondent has a session history.");
    } else {
        for aggregate in pending {
            let submitted = aggregate
                .survey_submitted_at
                .map(|at| at.date_naive().to_string())
                .unwrap_or_else(|| "unknown date".to_string());
            let _ = writeln!(
                output,
                "- {} ({}) surveyed {}",
                aggregate.display_name,
                aggregate.email.as_deref().unwrap_or(&aggregate.key),
                submitted
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Session Trend");
    for bucket in session_trend(outcome, window, now) {
        let _ = writeln!(
            output,
            "- {}: {} sessions, {} completed ({:.1}%), {} no-show ({:.1}%)",
            bucket.label,
            bucket.events,
            bucket.count(&SessionStatus::Completed),
            bucket.percentage(&SessionStatus::Completed),
            bucket.count(&SessionStatus::NoShow),
            bucket.percentage(&SessionStatus::NoShow)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Billing Summary");
    for bucket in billing_trend(outcome, window, now) {
        let _ = writeln!(
            output,
            "- {}: {} completed sessions, {} coached minutes",
            bucket.label,
            bucket.events,
            bucket.count(&SessionStatus::Completed)
        );
    }

    let stats = &outcome.stats;
    let snapshot_wide = if scope.is_some() { " (whole snapshot)" } else { "" };
    let _ = writeln!(output);
    let _ = writeln!(output, "## Data Quality");
    let _ = writeln!(
        output,
        "- Skipped records{}: {} roster, {} session, {} survey",
        snapshot_wide, stats.skipped.employees, stats.skipped.sessions, stats.skipped.surveys
    );
    let _ = writeln!(output, "- Canceled sessions excluded: {}", stats.excluded_sessions);
    let _ = writeln!(output, "- Suppressed records{}: {}", snapshot_wide, stats.suppressed);

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ingest;
    use crate::models::{RawSessionRecord, RawSurveyRecord, Snapshot};
    use crate::suppression::SuppressionSet;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 20, 12, 0, 0).unwrap()
    }

    fn session(id: &str, name: &str, status: &str, date: &str, program: &str) -> RawSessionRecord {
        RawSessionRecord {
            id: id.to_string(),
            employee_name: Some(name.to_string()),
            session_date: date.to_string(),
            status: status.to_string(),
            program_title: Some(program.to_string()),
            duration_minutes: Some(45),
            ..Default::default()
        }
    }

    fn sample_outcome() -> IngestOutcome {
        let snapshot = Snapshot {
            employees: vec![],
            sessions: vec![
                session("s1", "Avery Lee", "Completed", "2026-01-05", "GROW"),
                session("s2", "Avery Lee", "No Show", "2026-01-12", "GROW"),
                session("s3", "Jules Moreno", "", "2026-02-02", "LEAD"),
                session("s4", "Jules Moreno", "Canceled", "2026-02-09", "LEAD"),
            ],
            surveys: vec![RawSurveyRecord {
                id: "v1".into(),
                email: "bob@x.com".into(),
                first_name: "Bob".into(),
                last_name: "Reyes".into(),
                program_title: None,
                submitted_at: "2026-02-01".into(),
            }],
        };
        ingest(&snapshot, &SuppressionSet::default(), now())
    }

    #[test]
    fn headline_counts_people_and_sessions() {
        let outcome = sample_outcome();
        let headline = headline(&outcome.aggregates);
        assert_eq!(headline.headcount, 3);
        assert_eq!(headline.active, 2);
        assert_eq!(headline.pending_match, 1);
        assert_eq!(headline.sessions, 3);
        assert!((headline.completion_rate - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn programs_sorted_by_headcount() {
        let outcome = sample_outcome();
        let programs = summarize_by_program(&outcome.aggregates);
        let names: Vec<&str> = programs.iter().map(|p| p.program.as_str()).collect();
        assert_eq!(names, ["GROW", "LEAD", "Unassigned"]);
        assert_eq!(programs[0].completion_rate, 50.0);
    }

    #[test]
    fn report_includes_every_section() {
        let outcome = sample_outcome();
        let report = build_report(Some("GROW"), now(), TrendWindow::months(2), &outcome);

        assert!(report.starts_with("# Coaching Engagement Report"));
        assert!(report.contains("Generated for GROW on 2026-02-20"));
        assert!(report.contains("- People: 3 (2 active, 1 pending match)"));
        assert!(report.contains("- Bob Reyes (bob@x.com) surveyed 2026-02-01"));
        assert!(report.contains("- Jan 2026: 2 sessions, 1 completed (50.0%), 1 no-show (50.0%)"));
        assert!(report.contains("- Feb 2026: 1 completed sessions, 45 coached minutes"));
        assert!(report.contains("- Canceled sessions excluded: 1"));
        assert!(report.contains("- Avery Lee (GROW) 2 sessions, 50% completed, last 2026-01-12"));
    }

    #[test]
    fn scoping_filters_people_and_sessions() {
        let outcome = sample_outcome();
        let grow = scoped(&outcome, Some("grow"));
        assert_eq!(grow.aggregates.len(), 1);
        assert_eq!(grow.aggregates[0].display_name, "Avery Lee");
        assert_eq!(grow.sessions.len(), 2);

        let lead = scoped(&outcome, Some("LEAD"));
        assert_eq!(lead.sessions.len(), 2);
        assert_eq!(scoped(&outcome, None).aggregates.len(), 3);
    }

    #[test]
    fn scoping_recounts_sessions_per_program() {
        let outcome = sample_outcome();
        let grow = scoped(&outcome, Some("GROW"));
        assert_eq!(grow.stats.excluded_sessions, 0);
        assert_eq!(grow.stats.counted_sessions, 2);

        let lead = scoped(&outcome, Some("LEAD"));
        assert_eq!(lead.stats.excluded_sessions, 1);
        assert_eq!(lead.stats.counted_sessions, 1);
        assert_eq!(lead.stats.skipped, outcome.stats.skipped);

        let report = build_report(Some("GROW"), now(), TrendWindow::months(2), &grow);
        assert!(report.contains("- Canceled sessions excluded: 0"));
        assert!(report.contains("- Suppressed records (whole snapshot): 0"));
    }

    #[test]
    fn scoped_people_and_sessions_agree_after_program_change() {
        let snapshot = Snapshot {
            employees: vec![],
            sessions: vec![
                RawSessionRecord {
                    program_title: None,
                    ..session("s1", "Avery Lee", "Completed", "2026-01-05", "")
                },
                session("s2", "Avery Lee", "Completed", "2026-02-02", "GROW"),
            ],
            surveys: vec![],
        };
        let outcome = ingest(&snapshot, &SuppressionSet::default(), now());
        let grow = scoped(&outcome, Some("GROW"));

        assert_eq!(grow.aggregates.len(), 1);
        assert_eq!(grow.aggregates[0].total, 2);
        assert_eq!(grow.sessions.len(), 2);
        assert_eq!(grow.stats.counted_sessions, 2);
    }
}
