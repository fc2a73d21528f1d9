//! Identity resolution across roster, session and survey records.
//!
//! Resolution runs in two tiers. Tier 1 is an exact, case-insensitive email
//! match. Tier 2 only runs when tier 1 finds nothing and compares display
//! names after nickname canonicalization, tolerating small spelling drift in
//! either the first or the last name.

use crate::models::PersonAggregate;
use crate::nickname::canonicalize;
use crate::similarity::similarity;

const NAME_SIMILARITY_THRESHOLD: f64 = 0.8;
const MIN_PREFIX_LEN: usize = 3;

pub fn is_same_person(name1: &str, name2: &str) -> bool {
    let canonical1 = canonicalize(name1);
    let canonical2 = canonicalize(name2);
    if canonical1 == canonical2 {
        return true;
    }

    let Some((first1, last1)) = first_and_last(&canonical1) else {
        return false;
    };
    let Some((first2, last2)) = first_and_last(&canonical2) else {
        return false;
    };

    if first1 == first2 && similarity(last1, last2) > NAME_SIMILARITY_THRESHOLD {
        return true;
    }
    if last1 == last2 && similarity(first1, first2) > NAME_SIMILARITY_THRESHOLD {
        return true;
    }
    last1 == last2 && is_short_form(first1, first2)
}

/// Returns the key of the aggregate the reference resolves to, if any.
///
/// Email always wins over name. The name scan walks the pool in order and
/// returns the first plausible candidate.
pub fn find_matching_key<'a>(
    pool: &'a [PersonAggregate],
    email: Option<&str>,
    name: Option<&str>,
) -> Option<&'a str> {
    if let Some(email) = email.map(str::trim).filter(|value| !value.is_empty()) {
        let by_email = pool.iter().find(|aggregate| {
            aggregate
                .email
                .as_deref()
                .is_some_and(|stored| stored.eq_ignore_ascii_case(email))
        });
        if let Some(aggregate) = by_email {
            return Some(aggregate.key.as_str());
        }
    }

    let name = name.map(str::trim).filter(|value| !value.is_empty())?;
    pool.iter()
        .find(|aggregate| is_same_person(name, &aggregate.display_name))
        .map(|aggregate| aggregate.key.as_str())
}

fn first_and_last(canonical: &str) -> Option<(&str, &str)> {
    let mut tokens = canonical.split(' ');
    let first = tokens.next()?;
    let last = tokens.last()?;
    Some((first, last))
}

fn is_short_form(a: &str, b: &str) -> bool {
    let (a_len, b_len) = (a.chars().count(), b.chars().count());
    let (short, short_len, long) = if a_len <= b_len { (a, a_len, b) } else { (b, b_len, a) };
    short_len >= MIN_PREFIX_LEN && long.starts_with(short)
}
