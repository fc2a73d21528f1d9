use std::collections::HashSet;

use crate::identity::is_same_person;
use crate::models::EmployeeRecord;

const TEST_LOCAL_PARTS: &[&str] = &["test", "qa", "demo"];
const TEST_EMAIL_PREFIXES: &[&str] = &["test.", "test_", "test+", "qa+", "demo+"];
const TEST_EMAIL_MARKERS: &[&str] = &["+test@", "@example.invalid"];
const TEST_NAMES: &[&str] = &["test user", "test account", "demo user", "qa tester"];

/// Caller-supplied ids or emails that must never appear in the output.
#[derive(Debug, Clone, Default)]
pub struct SuppressionSet {
    identifiers: HashSet<String>,
}

impl SuppressionSet {
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for identifier in identifiers {
            set.insert(identifier.as_ref());
        }
        set
    }

    pub fn insert(&mut self, identifier: &str) {
        let identifier = identifier.trim().to_lowercase();
        if !identifier.is_empty() {
            self.identifiers.insert(identifier);
        }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.identifiers.contains(&identifier.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

pub fn is_test_account(email: Option<&str>, name: &str) -> bool {
    let name = name.trim().to_lowercase();
    if TEST_NAMES.contains(&name.as_str()) {
        return true;
    }

    let Some(email) = email.map(str::to_lowercase) else {
        return false;
    };
    let local_part = email.split('@').next().unwrap_or_default();
    TEST_LOCAL_PARTS.contains(&local_part)
        || TEST_EMAIL_PREFIXES
            .iter()
            .any(|prefix| local_part.starts_with(prefix))
        || TEST_EMAIL_MARKERS.iter().any(|marker| email.contains(marker))
}

/// Suppression resolved against the roster so that sessions and surveys
/// referring to a suppressed employee by email or name are dropped too.
#[derive(Debug)]
pub struct SuppressedIdentities<'a> {
    set: &'a SuppressionSet,
    emails: HashSet<String>,
    names: Vec<String>,
}

impl<'a> SuppressedIdentities<'a> {
    pub fn resolve(set: &'a SuppressionSet, roster: &[EmployeeRecord]) -> Self {
        let mut identities = Self {
            set,
            emails: HashSet::new(),
            names: Vec::new(),
        };
        for employee in roster {
            if identities.employee(employee) {
                identities.names.push(employee.display_name.clone());
                if let Some(email) = &employee.email {
                    identities.emails.insert(email.to_lowercase());
                }
            }
        }
        identities
    }

    pub fn employee(&self, employee: &EmployeeRecord) -> bool {
        self.set.contains(&employee.id)
            || employee
                .email
                .as_deref()
                .is_some_and(|email| self.set.contains(email))
            || is_test_account(employee.email.as_deref(), &employee.display_name)
    }

    pub fn person(&self, ids: &[&str], email: Option<&str>, name: Option<&str>) -> bool {
        if ids.iter().any(|id| self.set.contains(id)) {
            return true;
        }
        if let Some(email) = email {
            if self.set.contains(email) || self.emails.contains(&email.to_lowercase()) {
                return true;
            }
        }
        if is_test_account(email, name.unwrap_or_default()) {
            return true;
        }
        name.is_some_and(|name| {
            self.names
                .iter()
                .any(|suppressed| is_same_person(name, suppressed))
        })
    }
}
