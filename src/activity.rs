use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::models::RemoteSubmission;

/// Outcome of evaluating a student's submissions against the activity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityStatus {
    pub is_inactive: bool,
    pub inactivity_detected_at: Option<DateTime<Utc>>,
}

/// Longest activity window accepted, about ten years.
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// Start of the activity window. `window_days` is clamped to `1..=MAX_WINDOW_DAYS`.
pub fn cutoff(now: DateTime<Utc>, window_days: i64) -> DateTime<Utc> {
    let days = window_days.clamp(1, MAX_WINDOW_DAYS);
    now.checked_sub_signed(Duration::days(days))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn epoch_to_utc(seconds: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0).single()
}

pub fn last_submission_at(submissions: &[RemoteSubmission]) -> Option<DateTime<Utc>> {
    submissions
        .iter()
        .map(|s| s.creation_time_seconds)
        .max()
        .and_then(epoch_to_utc)
}

pub fn recent_submissions(
    submissions: &[RemoteSubmission],
    now: DateTime<Utc>,
    window_days: i64,
) -> Vec<&RemoteSubmission> {
    let since = cutoff(now, window_days).timestamp();
    submissions
        .iter()
        .filter(|s| s.creation_time_seconds >= since)
        .collect()
}

/// A student who has submitted before but not inside the window is inactive.
/// Nobody is flagged for having no submissions at all.
pub fn evaluate(
    submissions: &[RemoteSubmission],
    now: DateTime<Utc>,
    window_days: i64,
    previously_detected: Option<DateTime<Utc>>,
) -> ActivityStatus {
    let has_history = !submissions.is_empty();
    let has_recent = !recent_submissions(submissions, now, window_days).is_empty();

    if has_history && !has_recent {
        ActivityStatus {
            is_inactive: true,
            inactivity_detected_at: Some(previously_detected.unwrap_or(now)),
        }
    } else {
        ActivityStatus {
            is_inactive: false,
            inactivity_detected_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteProblem;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn submission(days_ago: i64) -> RemoteSubmission {
        RemoteSubmission {
            id: days_ago,
            contest_id: Some(1850),
            creation_time_seconds: (now() - Duration::days(days_ago)).timestamp(),
            problem: RemoteProblem {
                contest_id: Some(1850),
                index: "B".to_string(),
                name: "Ten Words of Wisdom".to_string(),
                rating: Some(800),
                tags: vec!["implementation".to_string()],
            },
            programming_language: "GNU C++17".to_string(),
            verdict: Some("OK".to_string()),
        }
    }

    #[test]
    fn cutoff_respects_window() {
        assert_eq!(cutoff(now(), 30), now() - Duration::days(30));
        assert_eq!(cutoff(now(), 0), now() - Duration::days(1));
    }

    #[test]
    fn oversized_window_is_clamped() {
        let longest = now() - Duration::days(MAX_WINDOW_DAYS);
        assert_eq!(cutoff(now(), 100_000_000), longest);
        assert_eq!(cutoff(now(), i64::MAX), longest);
        assert_eq!(cutoff(now(), i64::MIN), now() - Duration::days(1));
    }

    #[test]
    fn huge_window_still_evaluates() {
        let status = evaluate(&[submission(60)], now(), i64::MAX, None);
        assert!(!status.is_inactive);
    }

    #[test]
    fn recent_activity_is_active() {
        let status = evaluate(&[submission(1), submission(90)], now(), 30, None);
        assert!(!status.is_inactive);
        assert_eq!(status.inactivity_detected_at, None);
    }

    #[test]
    fn stale_history_is_inactive() {
        let status = evaluate(&[submission(60)], now(), 30, None);
        assert!(status.is_inactive);
        assert_eq!(status.inactivity_detected_at, Some(now()));
    }

    #[test]
    fn detection_time_is_sticky() {
        let first = now() - Duration::days(3);
        let status = evaluate(&[submission(60)], now(), 30, Some(first));
        assert_eq!(status.inactivity_detected_at, Some(first));
    }

    #[test]
    fn becoming_active_clears_detection() {
        let status = evaluate(&[submission(2)], now(), 30, Some(now() - Duration::days(10)));
        assert!(!status.is_inactive);
        assert_eq!(status.inactivity_detected_at, None);
    }

    #[test]
    fn no_submissions_is_not_inactive() {
        let status = evaluate(&[], now(), 30, None);
        assert!(!status.is_inactive);
    }

    #[test]
    fn window_boundary_counts_as_recent() {
        let status = evaluate(&[submission(30)], now(), 30, None);
        assert!(!status.is_inactive);
    }

    #[test]
    fn last_submission_is_latest_by_creation_time() {
        let subs = vec![submission(40), submission(3), submission(12)];
        assert_eq!(last_submission_at(&subs), Some(now() - Duration::days(3)));
        assert_eq!(last_submission_at(&[]), None);
    }
}
