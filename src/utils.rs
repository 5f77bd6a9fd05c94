//! Utility functions: slugs, ordering helpers, job ids, target files

use crate::error::{Error, Result};
use crate::types::SlugAssignment;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

/// Fallback slug for names with no alphanumeric characters
const EMPTY_SLUG: &str = "player";

#[allow(clippy::expect_used)] // literal pattern
fn non_alphanumeric_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").expect("static slug pattern is valid"))
}

/// Normalize a name into a filesystem/URL-safe slug
///
/// Runs of non-alphanumeric characters collapse to a single `-`, leading and
/// trailing dashes are dropped and the result is lowercased.
///
/// # Examples
///
/// ```
/// use search_harvest::utils::slugify;
///
/// assert_eq!(slugify("  LeBron James "), "lebron-james");
/// assert_eq!(slugify("Shaquille O'Neal"), "shaquille-o-neal");
/// assert_eq!(slugify("!!!"), "player");
/// ```
pub fn slugify(name: &str) -> String {
    let slug = non_alphanumeric_runs()
        .replace_all(name.trim(), "-")
        .trim_matches('-')
        .to_lowercase();

    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug
    }
}

/// Assign a collision-free slug to every target, in order
///
/// Collisions are resolved by numeric suffixing: `base`, `base-2`, `base-3`, …
pub fn assign_slugs(targets: &[String]) -> Vec<SlugAssignment> {
    let mut used = HashSet::with_capacity(targets.len());
    let mut assignments = Vec::with_capacity(targets.len());

    for target in targets {
        let base = slugify(target);
        let mut slug = base.clone();
        let mut suffix = 2;
        while used.contains(&slug) {
            slug = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        used.insert(slug.clone());
        assignments.push(SlugAssignment {
            target: target.clone(),
            slug,
        });
    }

    assignments
}

/// Remove duplicates keeping the first occurrence of each value
pub fn dedupe_preserving_order<I>(values: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(Into::into)
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

/// Job identifier derived from a timestamp (`job-YYYY-MM-DDTHH-MM-SS`)
pub fn job_id_at(now: DateTime<Utc>) -> String {
    now.format("job-%Y-%m-%dT%H-%M-%S").to_string()
}

/// Job identifier for the current time
pub fn new_job_id() -> String {
    job_id_at(Utc::now())
}

/// Read search targets from a CSV file with a `player` column
///
/// Values are trimmed, empty cells dropped and duplicates removed preserving order.
pub fn targets_from_csv(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;

    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == "player")
        .ok_or_else(|| Error::Config {
            message: format!("{} must have a 'player' column", path.display()),
            key: Some("player".to_string()),
        })?;

    let mut names = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(name) = record.get(column).map(str::trim)
            && !name.is_empty()
        {
            names.push(name.to_string());
        }
    }

    Ok(dedupe_preserving_order(names))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_slugify_normalizes() {
        assert_eq!(slugify("LeBron James"), "lebron-james");
        assert_eq!(slugify("--Nikola   Jokić--"), "nikola-joki");
        assert_eq!(slugify("A.J. Green"), "a-j-green");
        assert_eq!(slugify(""), "player");
        assert_eq!(slugify("   "), "player");
    }

    #[test]
    fn test_assign_slugs_suffixes_collisions() {
        let targets: Vec<String> = ["LeBron James", "lebron-james", "LEBRON JAMES", "Other"]
            .into_iter()
            .map(String::from)
            .collect();

        let slugs: Vec<String> = assign_slugs(&targets)
            .into_iter()
            .map(|a| a.slug)
            .collect();

        assert_eq!(
            slugs,
            vec!["lebron-james", "lebron-james-2", "lebron-james-3", "other"]
        );
    }

    #[test]
    fn test_assign_slugs_is_injective_with_suffix_lookalikes() {
        // "a-2" exists verbatim before the collision on "a" would produce it
        let targets: Vec<String> = ["a-2", "a", "A", "a 2"]
            .into_iter()
            .map(String::from)
            .collect();

        let slugs: Vec<String> = assign_slugs(&targets)
            .into_iter()
            .map(|a| a.slug)
            .collect();
        let unique: HashSet<_> = slugs.iter().collect();

        assert_eq!(unique.len(), slugs.len(), "slugs must be distinct: {slugs:?}");
        assert_eq!(slugs, vec!["a-2", "a", "a-3", "a-2-2"]);
    }

    #[test]
    fn test_dedupe_preserves_first_occurrence() {
        let deduped = dedupe_preserving_order(["nba", "nbadiscussion", "nba", "lakers", "nba"]);
        assert_eq!(deduped, vec!["nba", "nbadiscussion", "lakers"]);
    }

    #[test]
    fn test_job_id_format() {
        let at = Utc.with_ymd_and_hms(2025, 8, 14, 12, 34, 56).unwrap();
        assert_eq!(job_id_at(at), "job-2025-08-14T12-34-56");
    }

    #[test]
    fn test_targets_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("players.csv");
        std::fs::write(
            &path,
            "team,player\nLAL, LeBron James \nDEN,Nikola Jokic\nLAL,\nMIL,LeBron James\n",
        )
        .unwrap();

        let targets = targets_from_csv(&path).unwrap();
        assert_eq!(targets, vec!["LeBron James", "Nikola Jokic"]);
    }

    #[test]
    fn test_targets_from_csv_requires_player_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("players.csv");
        std::fs::write(&path, "name\nLeBron James\n").unwrap();

        let err = targets_from_csv(&path).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
