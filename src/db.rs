use std::path::Path;

use anyhow::Context;
use clap::ValueEnum;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{RawEmployeeRecord, RawSessionRecord, RawSurveyRecord, Snapshot};
use crate::normalize::{parse_date, parse_timestamp};
use crate::snapshot::read_csv;
use crate::suppression::SuppressionSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImportKind {
    Employees,
    Sessions,
    Surveys,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let employees = vec![
        seed_employee("emp-001", "Avery", "Lee", Some("avery.lee@groupscholar.com"), Some("GROW"), "2026"),
        seed_employee("emp-002", "Jules", "Moreno", Some("jules.moreno@groupscholar.com"), Some("LEAD"), "2025"),
        seed_employee("emp-003", "Kiara", "Patel", Some("kiara.patel@groupscholar.com"), Some("GROW"), "2026"),
        seed_employee("emp-004", "Michael", "Johnson", None, None, "2026"),
        seed_employee("emp-005", "Bradley", "Okafor", Some("bradley.okafor@groupscholar.com"), Some("LEAD"), "2025"),
    ];
    for employee in &employees {
        insert_employee(pool, employee).await?;
    }

    let sessions = vec![
        seed_session("ses-001", Some("emp-001"), None, "2026-01-06", "Completed", Some("GROW"), Some(45)),
        seed_session("ses-002", Some("emp-001"), None, "2026-01-20", "No Show", Some("GROW"), None),
        seed_session("ses-003", None, Some("Mike Johnson"), "2026-01-14", "", Some("GROW"), Some(30)),
        seed_session("ses-004", None, Some("Brad Okafor"), "2026-02-03", "Late Cancel", Some("LEAD"), None),
        seed_session("ses-005", Some("emp-003"), None, "2026-02-10", "Canceled", Some("GROW"), None),
        seed_session("ses-006", Some("emp-002"), None, "2026-02-17", "No Label", Some("LEAD"), Some(60)),
    ];
    for session in &sessions {
        insert_session(pool, session).await?;
    }

    let surveys = vec![
        RawSurveyRecord {
            id: "sur-001".into(),
            email: "kiara.patel@groupscholar.com".into(),
            first_name: "Kiara".into(),
            last_name: "Patel".into(),
            program_title: Some("GROW".into()),
            submitted_at: "2026-01-28T14:03:00Z".into(),
        },
        RawSurveyRecord {
            id: "sur-002".into(),
            email: "dana.whitfield@groupscholar.com".into(),
            first_name: "Dana".into(),
            last_name: "Whitfield".into(),
            program_title: Some("LEAD".into()),
            submitted_at: "2026-02-04T09:30:00Z".into(),
        },
    ];
    for survey in &surveys {
        insert_survey(pool, survey).await?;
    }

    Ok(())
}

pub async fn import_csv(pool: &PgPool, kind: ImportKind, csv_path: &Path) -> anyhow::Result<usize> {
    let mut inserted = 0usize;

    match kind {
        ImportKind::Employees => {
            for record in read_csv::<RawEmployeeRecord>(csv_path)? {
                inserted += usize::from(insert_employee(pool, &record).await?);
            }
        }
        ImportKind::Sessions => {
            for record in read_csv::<RawSessionRecord>(csv_path)? {
                inserted += usize::from(insert_session(pool, &record).await?);
            }
        }
        ImportKind::Surveys => {
            for record in read_csv::<RawSurveyRecord>(csv_path)? {
                inserted += usize::from(insert_survey(pool, &record).await?);
            }
        }
    }

    Ok(inserted)
}

pub async fn add_suppression(pool: &PgPool, identifier: &str) -> anyhow::Result<bool> {
    let identifier = identifier.trim().to_lowercase();
    if identifier.is_empty() {
        anyhow::bail!("suppression identifier must not be empty");
    }

    let result = sqlx::query(
        r#"
        INSERT INTO coaching_engagement.suppressions (identifier)
        VALUES ($1)
        ON CONFLICT (identifier) DO NOTHING
        "#,
    )
    .bind(identifier)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn fetch_snapshot(pool: &PgPool) -> anyhow::Result<(Snapshot, SuppressionSet)> {
    let employees = sqlx::query(
        "SELECT source_key, first_name, last_name, email, program, program_title, \
         coaching_program, cohort, avatar_url \
         FROM coaching_engagement.employees ORDER BY source_key",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch employees")?
    .into_iter()
    .map(|row| RawEmployeeRecord {
        id: row.get("source_key"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        program: row.get("program"),
        program_title: row.get("program_title"),
        coaching_program: row.get("coaching_program"),
        cohort: row.get("cohort"),
        avatar_url: row.get("avatar_url"),
    })
    .collect();

    let sessions = sqlx::query(
        "SELECT source_key, employee_key, employee_name, employee_email, \
         session_date::text AS session_date, status, program_title, coaching_program, \
         cohort, duration_minutes \
         FROM coaching_engagement.sessions ORDER BY source_key",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch sessions")?
    .into_iter()
    .map(|row| RawSessionRecord {
        id: row.get("source_key"),
        employee_id: row.get("employee_key"),
        employee_name: row.get("employee_name"),
        employee_email: row.get("employee_email"),
        session_date: row
            .get::<Option<String>, _>("session_date")
            .unwrap_or_default(),
        status: row.get("status"),
        program_title: row.get("program_title"),
        coaching_program: row.get("coaching_program"),
        cohort: row.get("cohort"),
        duration_minutes: row.get("duration_minutes"),
    })
    .collect();

    let surveys = sqlx::query(
        "SELECT source_key, email, first_name, last_name, program_title, \
         submitted_at::text AS submitted_at \
         FROM coaching_engagement.surveys ORDER BY source_key",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch surveys")?
    .into_iter()
    .map(|row| RawSurveyRecord {
        id: row.get("source_key"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        program_title: row.get("program_title"),
        submitted_at: row
            .get::<Option<String>, _>("submitted_at")
            .unwrap_or_default(),
    })
    .collect();

    let identifiers: Vec<String> =
        sqlx::query("SELECT identifier FROM coaching_engagement.suppressions")
            .fetch_all(pool)
            .await
            .context("failed to fetch suppressions")?
            .into_iter()
            .map(|row| row.get("identifier"))
            .collect();

    Ok((
        Snapshot {
            employees,
            sessions,
            surveys,
        },
        SuppressionSet::new(identifiers),
    ))
}

async fn insert_employee(pool: &PgPool, record: &RawEmployeeRecord) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO coaching_engagement.employees
        (id, source_key, first_name, last_name, email, program, program_title,
         coaching_program, cohort, avatar_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(source_key(&record.id))
    .bind(&record.first_name)
    .bind(&record.last_name)
    .bind(&record.email)
    .bind(&record.program)
    .bind(&record.program_title)
    .bind(&record.coaching_program)
    .bind(&record.cohort)
    .bind(&record.avatar_url)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn insert_session(pool: &PgPool, record: &RawSessionRecord) -> anyhow::Result<bool> {
    let session_date = parse_date(&record.session_date);
    if session_date.is_none() && !record.session_date.trim().is_empty() {
        tracing::warn!(
            session = %record.id,
            value = %record.session_date,
            "unparseable session date stored as null"
        );
    }

    let result = sqlx::query(
        r#"
        INSERT INTO coaching_engagement.sessions
        (id, source_key, employee_key, employee_name, employee_email, session_date,
         status, program_title, coaching_program, cohort, duration_minutes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(source_key(&record.id))
    .bind(&record.employee_id)
    .bind(&record.employee_name)
    .bind(&record.employee_email)
    .bind(session_date)
    .bind(&record.status)
    .bind(&record.program_title)
    .bind(&record.coaching_program)
    .bind(&record.cohort)
    .bind(record.duration_minutes)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn insert_survey(pool: &PgPool, record: &RawSurveyRecord) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO coaching_engagement.surveys
        (id, source_key, email, first_name, last_name, program_title, submitted_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(source_key(&record.id))
    .bind(&record.email)
    .bind(&record.first_name)
    .bind(&record.last_name)
    .bind(&record.program_title)
    .bind(parse_timestamp(&record.submitted_at))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn source_key(id: &str) -> String {
    let id = id.trim();
    if id.is_empty() {
        format!("import-{}", Uuid::new_v4())
    } else {
        id.to_string()
    }
}

fn seed_employee(
    id: &str,
    first_name: &str,
    last_name: &str,
    email: Option<&str>,
    program: Option<&str>,
    cohort: &str,
) -> RawEmployeeRecord {
    RawEmployeeRecord {
        id: id.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: email.map(str::to_string),
        program_title: program.map(str::to_string),
        cohort: Some(cohort.to_string()),
        ..Default::default()
    }
}

fn seed_session(
    id: &str,
    employee_id: Option<&str>,
    employee_name: Option<&str>,
    session_date: &str,
    status: &str,
    program: Option<&str>,
    duration_minutes: Option<i32>,
) -> RawSessionRecord {
    RawSessionRecord {
        id: id.to_string(),
        employee_id: employee_id.map(str::to_string),
        employee_name: employee_name.map(str::to_string),
        session_date: session_date.to_string(),
        status: status.to_string(),
        program_title: program.map(str::to_string),
        duration_minutes,
        ..Default::default()
    }
}
