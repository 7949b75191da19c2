use std::time::Duration;

use crate::daemon::storage::entities::{ActivitySample, DailyAggregate};

/// Folds activity samples into per-day totals. Each active sample is worth one quantum of
/// minutes, derived from the sampler cadence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregator {
    quantum_minutes: f64,
}

impl Aggregator {
    pub fn new(quantum_minutes: f64) -> Self {
        Self { quantum_minutes }
    }

    /// A 30 second cadence credits half a minute per tick.
    pub fn from_interval(sample_interval: Duration) -> Self {
        Self::new(sample_interval.as_secs_f64() / 60.)
    }

    /// Returns the aggregate after crediting `sample`. Idle samples leave `current` untouched.
    /// An aggregate for another date is ignored and a fresh one is started.
    pub fn fold(
        &self,
        sample: &ActivitySample,
        current: Option<DailyAggregate>,
    ) -> Option<DailyAggregate> {
        if !sample.is_active {
            return current;
        }
        let date = sample.date();
        let mut aggregate = current
            .filter(|aggregate| aggregate.date == date)
            .unwrap_or_else(|| DailyAggregate::empty(date));

        *aggregate.minutes_mut(sample.category) += self.quantum_minutes;
        aggregate.total_active_minutes = aggregate.category_sum();
        Some(aggregate)
    }
}
