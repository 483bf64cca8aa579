use std::collections::HashSet;

use crate::db::types::UserRole;
use crate::repositories::users::{self, IdentityRow};

/// Outcome of mapping raw identifiers to student ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Resolution {
    /// Student ids in first-seen order, without duplicates.
    pub(crate) resolved: Vec<String>,
    /// Raw identifiers that matched no student, each reported once.
    pub(crate) skipped: Vec<String>,
}

/// Resolves each identifier against `candidates`: exact student id first, then
/// exact username, then exact email. Non-student matches do not count.
pub(crate) fn resolve(raw: &[String], candidates: &[IdentityRow]) -> Resolution {
    let students: Vec<&IdentityRow> =
        candidates.iter().filter(|row| row.role == UserRole::Student).collect();

    let mut resolution = Resolution::default();
    let mut seen_ids = HashSet::new();
    let mut seen_skipped = HashSet::new();

    for original in raw {
        let needle = original.trim();
        let matched = (!needle.is_empty())
            .then(|| {
                students
                    .iter()
                    .find(|row| row.id == needle)
                    .or_else(|| students.iter().find(|row| row.username == needle))
                    .or_else(|| students.iter().find(|row| row.email == needle))
            })
            .flatten();

        match matched {
            Some(row) => {
                if seen_ids.insert(row.id.as_str()) {
                    resolution.resolved.push(row.id.clone());
                }
            }
            None => {
                if seen_skipped.insert(original.as_str()) {
                    resolution.skipped.push(original.clone());
                }
            }
        }
    }

    resolution
}

/// Loads every possible match in one query, then resolves in memory.
pub(crate) async fn resolve_students(
    executor: impl sqlx::PgExecutor<'_>,
    raw: &[String],
) -> Result<Resolution, sqlx::Error> {
    let lookups: Vec<String> = raw
        .iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let candidates = if lookups.is_empty() {
        Vec::new()
    } else {
        users::find_identities(executor, &lookups).await?
    };

    Ok(resolve(raw, &candidates))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, username: &str, email: &str, role: UserRole) -> IdentityRow {
        IdentityRow {
            id: id.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            role,
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn directory() -> Vec<IdentityRow> {
        vec![
            row("u-stu1", "stu1", "stu1@school.test", UserRole::Student),
            row("u-stu2", "stu2", "stu2@school.test", UserRole::Student),
            row("u-teacher1", "teacher1", "teacher1@school.test", UserRole::Teacher),
        ]
    }

    #[test]
    fn teachers_and_unknowns_are_skipped() {
        let raw = strings(&["stu1", "nonexistent@x.com", "teacher1"]);
        let resolution = resolve(&raw, &directory());

        assert_eq!(resolution.resolved, strings(&["u-stu1"]));
        assert_eq!(resolution.skipped, strings(&["nonexistent@x.com", "teacher1"]));
    }

    #[test]
    fn id_username_and_email_all_resolve_and_dedupe() {
        let raw = strings(&["stu2@school.test", " u-stu1 ", "stu1", "u-stu2"]);
        let resolution = resolve(&raw, &directory());

        assert_eq!(resolution.resolved, strings(&["u-stu2", "u-stu1"]));
        assert!(resolution.skipped.is_empty());
    }

    #[test]
    fn id_match_wins_over_username_of_another_student() {
        let mut rows = directory();
        rows.push(row("u-x", "u-stu1", "x@school.test", UserRole::Student));

        let resolution = resolve(&strings(&["u-stu1"]), &rows);
        assert_eq!(resolution.resolved, strings(&["u-stu1"]));
    }

    #[test]
    fn repeated_and_blank_skips_are_reported_once() {
        let raw = strings(&["ghost", "", "ghost", "  "]);
        let resolution = resolve(&raw, &directory());

        assert!(resolution.resolved.is_empty());
        assert_eq!(resolution.skipped, strings(&["ghost", "", "  "]));
    }

    #[test]
    fn matching_is_exact() {
        let resolution = resolve(&strings(&["STU1", "stu"]), &directory());
        assert!(resolution.resolved.is_empty());
        assert_eq!(resolution.skipped.len(), 2);
    }
}
