use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    Active,
    Idle,
}

/// Decides idleness from window changes alone: the user is active while the foreground window
/// fingerprint keeps changing, and idle once it has stayed the same for `threshold`.
pub struct IdleEvaluator {
    threshold: Duration,
    last_fingerprint: Option<Arc<str>>,
    last_changed: DateTime<Utc>,
}

impl IdleEvaluator {
    pub fn new(threshold: Duration, now: DateTime<Utc>) -> Self {
        Self {
            threshold,
            last_fingerprint: None,
            last_changed: now,
        }
    }

    pub fn observe(&mut self, fingerprint: &Arc<str>, now: DateTime<Utc>) -> ActivityState {
        if self.last_fingerprint.as_ref() != Some(fingerprint) {
            self.last_fingerprint = Some(fingerprint.clone());
            self.last_changed = now;
            return ActivityState::Active;
        }

        if now - self.last_changed >= self.threshold {
            ActivityState::Idle
        } else {
            ActivityState::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{ActivityState, IdleEvaluator};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_same_window_goes_idle_after_threshold() {
        let mut evaluator = IdleEvaluator::new(Duration::minutes(5), start());
        let window: Arc<str> = "fingerprint".into();

        // Ticks every 30s: 0s .. 4m30s are within the threshold, 5m and later are not.
        let states: Vec<ActivityState> = (0..14)
            .map(|tick| evaluator.observe(&window, start() + Duration::seconds(30 * tick)))
            .collect();
        assert!(states[..10].iter().all(|s| *s == ActivityState::Active));
        assert!(states[10..].iter().all(|s| *s == ActivityState::Idle));
    }

    #[test]
    fn test_window_change_resets_to_active() {
        let mut evaluator = IdleEvaluator::new(Duration::minutes(5), start());
        let first: Arc<str> = "first".into();
        let second: Arc<str> = "second".into();

        evaluator.observe(&first, start());
        assert_eq!(
            evaluator.observe(&first, start() + Duration::minutes(6)),
            ActivityState::Idle
        );
        assert_eq!(
            evaluator.observe(&second, start() + Duration::minutes(6) + Duration::seconds(30)),
            ActivityState::Active
        );
        assert_eq!(
            evaluator.observe(&second, start() + Duration::minutes(7)),
            ActivityState::Active
        );
        // Switching back counts as a change too.
        assert_eq!(
            evaluator.observe(&first, start() + Duration::minutes(20)),
            ActivityState::Active
        );
    }
}
