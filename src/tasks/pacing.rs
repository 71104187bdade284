// src/tasks/pacing.rs

//! Human-like pacing between browser actions.

use std::time::Duration;

use rand::Rng;

use crate::task::{Params, TaskEnv, TaskError};

/// A random delay range, drawn uniformly per action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub const DEFAULT_MIN_MS: u64 = 800;
    pub const DEFAULT_MAX_MS: u64 = 2500;

    /// Build a range; the bounds are swapped if given in the wrong order.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Read `min_delay_ms` / `max_delay_ms`.
    pub fn from_params(params: &Params) -> Result<Self, TaskError> {
        Self::from_keys(
            params,
            ("min_delay_ms", Self::DEFAULT_MIN_MS),
            ("max_delay_ms", Self::DEFAULT_MAX_MS),
            Duration::from_millis,
        )
    }

    /// Read an arbitrary pair of keys, e.g. `read_time_min_secs` / `read_time_max_secs`.
    pub fn from_keys(
        params: &Params,
        (min_key, min_default): (&str, u64),
        (max_key, max_default): (&str, u64),
        unit: fn(u64) -> Duration,
    ) -> Result<Self, TaskError> {
        let min = params.u64_or(min_key, min_default)?;
        let max = params.u64_or(max_key, max_default.max(min))?;
        if min > max {
            return Err(TaskError::invalid_parameter(
                min_key,
                format!("must not exceed {max_key} ({min} > {max})"),
            ));
        }
        Ok(Self {
            min: unit(min),
            max: unit(max),
        })
    }

    pub fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let lo = self.min.as_millis() as u64;
        let hi = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }

    /// Sleep for one drawn delay, honoring cancellation.
    pub async fn pause(&self, env: &TaskEnv) -> Result<(), TaskError> {
        let delay = self.next_delay();
        if delay.is_zero() {
            return env.ensure_active();
        }
        env.pause(delay).await
    }
}

/// `base` scaled by a uniform factor in `[1 - variance, 1 + variance]`.
pub fn jittered(base: Duration, variance: f64) -> Duration {
    let variance = variance.clamp(0.0, 1.0);
    if variance == 0.0 {
        return base;
    }
    let factor = rand::thread_rng().gen_range((1.0 - variance)..=(1.0 + variance));
    base.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delays_stay_in_range() {
        let pacing = Pacing::new(Duration::from_millis(10), Duration::from_millis(20));
        for _ in 0..100 {
            let d = pacing.next_delay();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
        assert_eq!(Pacing::none().next_delay(), Duration::ZERO);
    }

    #[test]
    fn inverted_param_range_is_rejected() {
        let params: Params =
            serde_json::from_value(json!({ "min_delay_ms": 500, "max_delay_ms": 100 })).unwrap();
        let err = Pacing::from_params(&params).unwrap_err();
        assert!(err.message().contains("min_delay_ms"));
    }

    #[test]
    fn missing_max_follows_a_large_min() {
        let params: Params = serde_json::from_value(json!({ "min_delay_ms": 5000 })).unwrap();
        let pacing = Pacing::from_params(&params).unwrap();
        assert_eq!(pacing.next_delay(), Duration::from_millis(5000));
    }

    #[test]
    fn jitter_bounds() {
        let base = Duration::from_secs(10);
        assert_eq!(jittered(base, 0.0), base);
        for _ in 0..100 {
            let d = jittered(base, 0.2);
            assert!(d >= Duration::from_millis(7_999) && d <= Duration::from_millis(12_001));
        }
    }
}
