//! [`evaluate`]

use chrono::{DateTime, Utc};

use crate::keys::ParsedKey;

const SECONDS_PER_DAY: i64 = 86_400;

/// Days left on a key, as of some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpirationResult {
	/// Whole days remaining, rounded down. Negative once expired.
	Expires(i64),
	NeverExpires,
	/// The primary key is revoked; its expiration no longer matters.
	Revoked,
}

impl ExpirationResult {
	/// The reportable day count.
	pub fn days(self) -> Option<i64> {
		match self {
			ExpirationResult::Expires(days) => Some(days),
			_ => None,
		}
	}
}

/// Evaluates the primary key's expiration at `now`.
///
/// Subkey expirations do not count.
pub fn evaluate(key: &ParsedKey, now: DateTime<Utc>) -> ExpirationResult {
	if key.is_revoked() { return ExpirationResult::Revoked; }
	match key.primary().expiration {
		Some(expiration) => ExpirationResult::Expires(days_until(expiration, now)),
		None => ExpirationResult::NeverExpires,
	}
}

/// `floor((expiration - now) / 1 day)`.
pub fn days_until(expiration: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
	(expiration - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

#[cfg(test)]
mod test {
	use super::*;
	use chrono::Duration;

	fn at(seconds: i64) -> DateTime<Utc> { DateTime::from_timestamp(seconds, 0).unwrap() }

	#[test]
	fn test_days_until_floors() {
		let now = at(1_700_000_000);
		assert_eq!(days_until(now + Duration::days(5), now), 5);
		assert_eq!(days_until(now + Duration::days(5) - Duration::seconds(1), now), 4);
		assert_eq!(days_until(now, now), 0);
		// Rounds toward negative infinity, not toward zero.
		assert_eq!(days_until(now - Duration::seconds(1), now), -1);
		assert_eq!(days_until(now - Duration::days(3), now), -3);
		assert_eq!(days_until(now - Duration::days(3) - Duration::hours(1), now), -4);
	}

	#[test]
	fn test_days() {
		assert_eq!(ExpirationResult::Expires(-2).days(), Some(-2));
		assert_eq!(ExpirationResult::NeverExpires.days(), None);
		assert_eq!(ExpirationResult::Revoked.days(), None);
	}
}
