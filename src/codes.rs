//! Session code generation and short-code resolution.
//!
//! A full code embeds its creation year/month (`YYYYMM` + 4 random digits),
//! but participants share only the last four digits. Resolving a short code
//! therefore tries the current month first, probes recent months, and only
//! then falls back to scanning stored codes for a suffix match.

use crate::error::{SessionError, SessionResult};
use crate::store::SessionStore;
use crate::types::SessionCode;
use chrono::{Datelike, Utc};
use rand::Rng;

/// Smallest and largest allowed 4-digit suffix.
pub const SUFFIX_MIN: u32 = 1000;
pub const SUFFIX_MAX: u32 = 9999;

/// Bounded collision retries before giving up on allocation.
pub const MAX_GENERATE_ATTEMPTS: u32 = 50;

/// How many past months are probed before the full suffix scan.
const MONTH_PROBES: u32 = 12;

/// The `YYYYMM` prefix for the current UTC year and month.
fn current_prefix() -> u64 {
    let now = Utc::now();
    now.year() as u64 * 100 + now.month() as u64
}

fn previous_prefix(prefix: u64) -> u64 {
    let (year, month) = (prefix / 100, prefix % 100);
    if month == 1 {
        (year - 1) * 100 + 12
    } else {
        year * 100 + month - 1
    }
}

fn compose(prefix: u64, suffix: u32) -> SessionCode {
    prefix * 10_000 + suffix as u64
}

/// The human-facing 4-digit join code: the last four decimal digits.
pub fn short_code(code: SessionCode) -> String {
    format!("{:04}", code % 10_000)
}

/// Validate a user-entered short code. Rejects anything that is not exactly
/// four digits in [1000, 9999] before any store lookup happens.
pub fn parse_short_code(input: &str) -> SessionResult<u32> {
    let input = input.trim();
    if input.len() != 4 || !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SessionError::validation(
            "the session code must be exactly 4 digits",
        ));
    }
    let suffix: u32 = input
        .parse()
        .map_err(|_| SessionError::validation("the session code must be exactly 4 digits"))?;
    if !(SUFFIX_MIN..=SUFFIX_MAX).contains(&suffix) {
        return Err(SessionError::validation(
            "the session code must be between 1000 and 9999",
        ));
    }
    Ok(suffix)
}

/// Allocate a fresh session code: current-month prefix plus a random
/// suffix, re-drawn until it does not collide with a stored code.
///
/// The check-then-use window is accepted; the alternative would be a
/// store-side uniqueness constraint the black-box store does not promise.
/// A code known to collide is never returned.
pub async fn generate(store: &SessionStore) -> SessionResult<SessionCode> {
    let prefix = current_prefix();
    for _ in 0..MAX_GENERATE_ATTEMPTS {
        let suffix = rand::rng().random_range(SUFFIX_MIN..=SUFFIX_MAX);
        let code = compose(prefix, suffix);
        if !store.code_exists(code).await? {
            return Ok(code);
        }
        tracing::debug!(code, "session code collision, redrawing");
    }
    Err(SessionError::CodeSpaceExhausted)
}

/// Resolve a user-entered short code to a full session code.
///
/// Fast path: the code was created this month. Then the last
/// [`MONTH_PROBES`] months are probed, and finally all stored codes are
/// scanned for a suffix match; the numerically largest match wins, which is
/// the most recently created month.
pub async fn resolve_short_code(store: &SessionStore, input: &str) -> SessionResult<SessionCode> {
    let suffix = parse_short_code(input)?;

    let mut prefix = current_prefix();
    for _ in 0..=MONTH_PROBES {
        let candidate = compose(prefix, suffix);
        if store.code_exists(candidate).await? {
            return Ok(candidate);
        }
        prefix = previous_prefix(prefix);
    }

    let matched = store
        .all_codes()
        .await?
        .into_iter()
        .filter(|code| code % 10_000 == suffix as u64)
        .max();
    matched.ok_or_else(|| SessionError::UnknownShortCode(input.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use crate::types::{Role, DEFAULT_ICON};
    use std::sync::Arc;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()), &Config::default())
    }

    #[test]
    fn short_code_is_last_four_digits() {
        assert_eq!(short_code(2025123456), "3456");
        assert_eq!(short_code(2025120042), "0042");
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!(parse_short_code("12a4").is_err());
        assert!(parse_short_code("123").is_err());
        assert!(parse_short_code("12345").is_err());
        assert!(parse_short_code("0999").is_err());
        assert!(parse_short_code("").is_err());
        assert_eq!(parse_short_code(" 3456 ").unwrap(), 3456);
    }

    #[test]
    fn previous_prefix_crosses_year_boundary() {
        assert_eq!(previous_prefix(202601), 202512);
        assert_eq!(previous_prefix(202512), 202511);
    }

    #[tokio::test]
    async fn generated_codes_resolve_via_their_suffix() {
        let store = store();
        let code = generate(&store).await.unwrap();
        store
            .insert_participant(code, "Ana", Role::Admin, DEFAULT_ICON)
            .await
            .unwrap();

        let resolved = resolve_short_code(&store, &short_code(code)).await.unwrap();
        assert_eq!(resolved, code);
        assert_eq!(short_code(resolved), short_code(code));
    }

    #[tokio::test]
    async fn generate_avoids_known_collisions() {
        let store = store();
        let first = generate(&store).await.unwrap();
        store
            .insert_participant(first, "Ana", Role::Admin, DEFAULT_ICON)
            .await
            .unwrap();
        let second = generate(&store).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn resolution_falls_back_across_month_boundaries() {
        let store = store();
        // A session created eighteen months ago: outside the probe window,
        // only the scan can find it.
        let old_prefix = (0..18).fold(current_prefix(), |p, _| previous_prefix(p));
        let old_code = compose(old_prefix, 3456);
        store
            .insert_participant(old_code, "Ana", Role::Admin, DEFAULT_ICON)
            .await
            .unwrap();

        let resolved = resolve_short_code(&store, "3456").await.unwrap();
        assert_eq!(resolved, old_code);
    }

    #[tokio::test]
    async fn resolution_prefers_the_latest_match() {
        let store = store();
        let newer = compose(previous_prefix(current_prefix()), 3456);
        let older = compose(previous_prefix(previous_prefix(current_prefix())), 3456);
        for code in [older, newer] {
            store
                .insert_participant(code, "Ana", Role::Admin, DEFAULT_ICON)
                .await
                .unwrap();
        }

        let resolved = resolve_short_code(&store, "3456").await.unwrap();
        assert_eq!(resolved, newer);
    }

    #[tokio::test]
    async fn unknown_short_code_is_not_found() {
        let store = store();
        assert!(matches!(
            resolve_short_code(&store, "4321").await,
            Err(SessionError::UnknownShortCode(_))
        ));
    }
}
