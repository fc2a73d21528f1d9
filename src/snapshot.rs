use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::models::Snapshot;
use crate::suppression::SuppressionSet;

pub const EMPLOYEES_FILE: &str = "employees.csv";
pub const SESSIONS_FILE: &str = "sessions.csv";
pub const SURVEYS_FILE: &str = "surveys.csv";
pub const SUPPRESSIONS_FILE: &str = "suppressions.csv";

#[derive(Debug, Deserialize)]
struct SuppressionRow {
    identifier: String,
}

/// Loads a snapshot exported as CSV files into `dir`. Missing files are
/// read as empty sources.
pub fn load_dir(dir: &Path) -> anyhow::Result<(Snapshot, SuppressionSet)> {
    if !dir.is_dir() {
        anyhow::bail!("snapshot directory {} does not exist", dir.display());
    }

    let snapshot = Snapshot {
        employees: read_optional(&dir.join(EMPLOYEES_FILE))?,
        sessions: read_optional(&dir.join(SESSIONS_FILE))?,
        surveys: read_optional(&dir.join(SURVEYS_FILE))?,
    };
    let suppression_rows: Vec<SuppressionRow> = read_optional(&dir.join(SUPPRESSIONS_FILE))?;
    let suppression = SuppressionSet::new(suppression_rows.iter().map(|row| &row.identifier));

    tracing::debug!(
        dir = %dir.display(),
        employees = snapshot.employees.len(),
        sessions = snapshot.sessions.len(),
        surveys = snapshot.surveys.len(),
        suppressed = suppression.len(),
        "loaded csv snapshot"
    );
    Ok((snapshot, suppression))
}

pub fn read_csv<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for (line, result) in reader.deserialize::<T>().enumerate() {
        let row = result.with_context(|| {
            format!("failed to parse row {} of {}", line + 1, path.display())
        })?;
        rows.push(row);
    }
    Ok(rows)
}

fn read_optional<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "snapshot file missing, treating as empty");
        return Ok(Vec::new());
    }
    read_csv(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_all_sources_with_blank_optionals() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(EMPLOYEES_FILE),
            "id,first_name,last_name,email,program,program_title,coaching_program,cohort,avatar_url\n\
             e1,Avery,Lee,avery@x.com,,GROW,,2026,\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(SESSIONS_FILE),
            "id,employee_id,employee_name,employee_email,session_date,status,program_title,coaching_program,cohort,duration_minutes\n\
             s1,e1,,,2026-01-05,Completed,GROW,,,45\n\
             s2,,Jules Moreno,,2026-01-06,,,,,\n",
        )
        .unwrap();
        fs::write(dir.path().join(SUPPRESSIONS_FILE), "identifier\nE9\n").unwrap();

        let (snapshot, suppression) = load_dir(dir.path()).unwrap();
        assert_eq!(snapshot.employees.len(), 1);
        assert_eq!(snapshot.employees[0].program, None);
        assert_eq!(snapshot.employees[0].program_title.as_deref(), Some("GROW"));
        assert_eq!(snapshot.sessions.len(), 2);
        assert_eq!(snapshot.sessions[0].duration_minutes, Some(45));
        assert_eq!(snapshot.sessions[1].employee_id, None);
        assert!(snapshot.surveys.is_empty());
        assert!(suppression.contains("e9"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load_dir(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn malformed_row_reports_its_position() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(SESSIONS_FILE),
            "id,session_date,status,duration_minutes\ns1,2026-01-05,Completed,forty\n",
        )
        .unwrap();
        let error = load_dir(dir.path()).unwrap_err();
        assert!(format!("{error:#}").contains("row 1"));
    }
}
