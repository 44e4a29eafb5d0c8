//! Send rate estimation for running campaigns

use chrono::{DateTime, Utc};

/// Estimated messages per minute.
///
/// Zero when either timestamp is missing or no time has passed. A rate
/// larger than the number sent (or than the total) is clamped to the number
/// sent, which happens when less than a minute has elapsed.
pub fn estimate_rate(
    sent: i32,
    to_send: i32,
    started_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
) -> f64 {
    let (Some(started_at), Some(updated_at)) = (started_at, updated_at) else {
        return 0.0;
    };

    let elapsed_minutes = (updated_at - started_at).num_milliseconds() as f64 / 60_000.0;
    if elapsed_minutes <= 0.0 {
        return 0.0;
    }

    let sent = f64::from(sent);
    let rate = sent / elapsed_minutes;
    if rate > sent || rate > f64::from(to_send) {
        return sent;
    }

    rate
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_steady_rate() {
        let start = Utc::now();
        let rate = estimate_rate(100, 100, Some(start), Some(start + Duration::minutes(10)));
        assert_eq!(rate, 10.0);
    }

    #[test]
    fn test_no_elapsed_time() {
        let start = Utc::now();
        assert_eq!(estimate_rate(100, 100, Some(start), Some(start)), 0.0);
    }

    #[test]
    fn test_clock_skew() {
        let start = Utc::now();
        assert_eq!(
            estimate_rate(100, 100, Some(start), Some(start - Duration::minutes(1))),
            0.0
        );
    }

    #[test]
    fn test_missing_timestamps() {
        let now = Utc::now();
        assert_eq!(estimate_rate(10, 100, None, Some(now)), 0.0);
        assert_eq!(estimate_rate(10, 100, Some(now), None), 0.0);
        assert_eq!(estimate_rate(10, 100, None, None), 0.0);
    }

    #[test]
    fn test_sub_minute_rate_is_clamped() {
        let start = Utc::now();
        let rate = estimate_rate(5, 10, Some(start), Some(start + Duration::seconds(6)));
        assert_eq!(rate, 5.0);
    }

    #[test]
    fn test_rate_above_total_is_clamped() {
        let start = Utc::now();
        // 40 sent in half a minute is 80/min, more than the 50 to send.
        let rate = estimate_rate(40, 50, Some(start), Some(start + Duration::seconds(30)));
        assert_eq!(rate, 40.0);
    }
}
