//! Tracking code generation
//!
//! Two schemes are supported:
//! - Sequential: `DOC-2025-003`, one past the highest number used this year
//! - Random: `KEMRI-20250428-1001`, a four digit suffix checked against the database

use chrono::{Datelike, NaiveDate};
use rand::Rng;

use crate::db::Database;
use crate::models::{CodeScheme, TrackingConfig};
use crate::utils::{AppError, AppResult};

/// Random suffixes tried before giving up
const MAX_RANDOM_ATTEMPTS: usize = 50;

/// Highest number a sequential code may carry
pub const MAX_SEQUENCE: u32 = 999_999;

/// Next code in the `PREFIX-YYYY-NNN` series given the codes already issued.
/// Codes that don't belong to the series, including numbers above
/// `MAX_SEQUENCE`, are ignored. Fails once the series is used up.
pub fn next_sequential<S: AsRef<str>>(prefix: &str, year: i32, existing: &[S]) -> AppResult<String> {
    let series = format!("{}-{}-", prefix, year);

    let highest = existing
        .iter()
        .filter_map(|code| code.as_ref().strip_prefix(&series))
        .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|n| n.parse::<u32>().ok())
        .filter(|n| *n <= MAX_SEQUENCE)
        .max()
        .unwrap_or(0);

    let next = highest
        .checked_add(1)
        .filter(|n| *n <= MAX_SEQUENCE)
        .ok_or_else(|| AppError::conflict(format!("Tracking code series {}NNN is exhausted", series)))?;

    Ok(format!("{}{:03}", series, next))
}

/// A `PREFIX-YYYYMMDD-NNNN` code for which `exists` returns false
pub fn random_code<R, F>(prefix: &str, date: NaiveDate, rng: &mut R, mut exists: F) -> AppResult<String>
where
    R: Rng + ?Sized,
    F: FnMut(&str) -> AppResult<bool>,
{
    let day = date.format("%Y%m%d");

    for _ in 0..MAX_RANDOM_ATTEMPTS {
        let candidate = format!("{}-{}-{}", prefix, day, rng.gen_range(1000..=9999));
        if !exists(&candidate)? {
            return Ok(candidate);
        }
    }

    Err(AppError::conflict(format!(
        "No free tracking code for {} after {} attempts",
        day, MAX_RANDOM_ATTEMPTS
    )))
}

/// Generate a fresh code for a new document according to the configured scheme
pub fn generate(db: &Database, config: &TrackingConfig, today: NaiveDate) -> AppResult<String> {
    let prefix = config.prefix.trim();
    let documents = db.documents();

    match config.scheme {
        CodeScheme::Sequential => {
            let series = format!("{}-{}-", prefix, today.year());
            let existing = documents.codes_with_prefix(&series)?;
            next_sequential(prefix, today.year(), &existing)
        }
        CodeScheme::Random => random_code(prefix, today, &mut rand::thread_rng(), |code| {
            Ok(documents.code_exists(code)?)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 28).unwrap()
    }

    #[test]
    fn test_next_sequential() {
        let none: [&str; 0] = [];
        assert_eq!(next_sequential("DOC", 2025, &none).unwrap(), "DOC-2025-001");

        let codes = ["DOC-2025-001", "DOC-2025-009", "DOC-2024-077", "DOC-2025-abc", "DOC-2025-+50"];
        assert_eq!(next_sequential("DOC", 2025, &codes).unwrap(), "DOC-2025-010");

        assert_eq!(next_sequential("DOC", 2025, &["DOC-2025-999"]).unwrap(), "DOC-2025-1000");
    }

    #[test]
    fn test_next_sequential_ignores_oversized_numbers() {
        let codes = ["DOC-2025-004", "DOC-2025-4294967295", "DOC-2025-99999999999999999999"];
        assert_eq!(next_sequential("DOC", 2025, &codes).unwrap(), "DOC-2025-005");
    }

    #[test]
    fn test_next_sequential_exhausted() {
        assert_eq!(
            next_sequential("DOC", 2025, &["DOC-2025-999998"]).unwrap(),
            "DOC-2025-999999"
        );
        assert!(matches!(
            next_sequential("DOC", 2025, &["DOC-2025-999999"]),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_random_code_format() {
        let mut rng = StdRng::seed_from_u64(7);
        let code = random_code("KEMRI", date(), &mut rng, |_| Ok(false)).unwrap();

        assert!(code.starts_with("KEMRI-20250428-"));
        let suffix: u32 = code.rsplit('-').next().unwrap().parse().unwrap();
        assert!((1000..=9999).contains(&suffix));
    }

    #[test]
    fn test_random_code_skips_taken() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut calls = 0;
        let code = random_code("KEMRI", date(), &mut rng, |_| {
            calls += 1;
            Ok(calls < 3)
        })
        .unwrap();

        assert_eq!(calls, 3);
        assert!(code.starts_with("KEMRI-"));
    }

    #[test]
    fn test_random_code_gives_up() {
        let mut rng = StdRng::seed_from_u64(7);
        let result = random_code("KEMRI", date(), &mut rng, |_| Ok(true));
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_generate_sequential_from_database() {
        let db = Database::open_in_memory().unwrap();
        let config = TrackingConfig::default();

        assert_eq!(generate(&db, &config, date()).unwrap(), "DOC-2025-001");

        let mut doc = Document::new("DOC-2025-004".into(), "Memo".into(), "A".into(), "B".into());
        db.documents().create(&mut doc).unwrap();

        assert_eq!(generate(&db, &config, date()).unwrap(), "DOC-2025-005");

        let mut imported = Document::new("DOC-2025-4294967295".into(), "Old".into(), "A".into(), "B".into());
        db.documents().create(&mut imported).unwrap();
        assert_eq!(generate(&db, &config, date()).unwrap(), "DOC-2025-005");
    }
}
