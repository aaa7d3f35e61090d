//! Retry delay computation: exponential backoff with jitter and
//! `Retry-After` directive parsing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Upper bound of the random jitter, as a fraction of the computed delay.
pub const JITTER_RATIO: f64 = 0.3;

/// Un-jittered delay for the `retry`-th retry (1-based):
/// `min(base * 2^(retry - 1), cap)`.
pub fn exponential_delay(retry: u32, base: Duration, cap: Duration) -> Duration {
    let exp = retry.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exp).unwrap_or(cap).min(cap)
}

/// Adds up to [`JITTER_RATIO`] of `delay` on top of it.
pub fn with_jitter<R: Rng>(delay: Duration, rng: &mut R) -> Duration {
    delay + delay.mul_f64(rng.gen_range(0.0..=JITTER_RATIO))
}

/// Jittered delay for the `retry`-th retry.
pub fn backoff_delay(retry: u32, base: Duration, cap: Duration) -> Duration {
    with_jitter(exponential_delay(retry, base, cap), &mut rand::thread_rng())
}

/// Parses a `Retry-After` value: delta seconds or an HTTP date.
///
/// Dates in the past resolve to zero. Returns `None` when the value is
/// neither form.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        at.with_timezone(&Utc)
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use rand::{rngs::StdRng, SeedableRng};

    use super::{backoff_delay, exponential_delay, parse_retry_after, with_jitter, JITTER_RATIO};

    const BASE: Duration = Duration::from_millis(1_000);
    const CAP: Duration = Duration::from_millis(30_000);

    #[test]
    fn doubles_until_cap() {
        let delays: Vec<u128> = (1..=7)
            .map(|retry| exponential_delay(retry, BASE, CAP).as_millis())
            .collect();
        assert_eq!(delays, [1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn large_retry_numbers_saturate_at_cap() {
        assert_eq!(exponential_delay(u32::MAX, BASE, CAP), CAP);
        assert_eq!(exponential_delay(0, BASE, CAP), BASE);
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let mut rng = StdRng::seed_from_u64(7);
        let delay = Duration::from_millis(4_000);
        let upper = delay + delay.mul_f64(JITTER_RATIO);
        for _ in 0..1_000 {
            let jittered = with_jitter(delay, &mut rng);
            assert!(jittered >= delay && jittered <= upper, "{jittered:?}");
        }
    }

    #[test]
    fn backoff_delay_bounds() {
        for retry in 1..=10 {
            let base = exponential_delay(retry, BASE, CAP);
            let delay = backoff_delay(retry, BASE, CAP);
            assert!(delay >= base);
            assert!(delay <= base + base.mul_f64(JITTER_RATIO));
        }
    }

    #[test]
    fn retry_after_seconds() {
        let now = Utc::now();
        assert_eq!(parse_retry_after("1", now), Some(Duration::from_secs(1)));
        assert_eq!(parse_retry_after(" 120 ", now), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after("0", now), Some(Duration::ZERO));
    }

    #[test]
    fn retry_after_http_date() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 30).unwrap();
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn retry_after_past_date_clamps_to_zero() {
        let now = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn retry_after_garbage_is_ignored() {
        let now = Utc::now();
        assert_eq!(parse_retry_after("soon", now), None);
        assert_eq!(parse_retry_after("-5", now), None);
        assert_eq!(parse_retry_after("", now), None);
    }
}
