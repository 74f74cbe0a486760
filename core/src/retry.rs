//! Retry configuration, backoff and the retry/stop decision.
//!
//! # Design
//! `RetryConfiguration` is immutable data shared by every request; it
//! (de)serializes with delays written as fractional seconds so it can live in
//! a JSON config file. `RetryPolicy` pairs a configuration with an
//! `ErrorMapper` and answers one question per failed attempt.
//!
//! Backoff is `min(base * 2^(attempt - 1), max_delay)` plus a jitter sampled
//! from the configured interval on every call.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;
use crate::mapper::ErrorMapper;

/// Closed interval of extra delay added on top of the exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawJitterRange")]
pub struct JitterRange {
    #[serde(with = "seconds")]
    pub lower: Duration,
    #[serde(with = "seconds")]
    pub upper: Duration,
}

/// Bounds as written in a config file, before ordering.
#[derive(Deserialize)]
struct RawJitterRange {
    #[serde(with = "seconds")]
    lower: Duration,
    #[serde(with = "seconds")]
    upper: Duration,
}

impl From<RawJitterRange> for JitterRange {
    fn from(raw: RawJitterRange) -> Self {
        JitterRange::new(raw.lower, raw.upper)
    }
}

impl JitterRange {
    /// Bounds are swapped if given in the wrong order.
    pub fn new(lower: Duration, upper: Duration) -> Self {
        if lower <= upper {
            Self { lower, upper }
        } else {
            Self {
                lower: upper,
                upper: lower,
            }
        }
    }

    pub const fn none() -> Self {
        Self {
            lower: Duration::ZERO,
            upper: Duration::ZERO,
        }
    }

    fn sample(&self) -> Duration {
        let (lower, upper) = (self.lower.min(self.upper), self.lower.max(self.upper));
        if upper == lower {
            return lower;
        }
        let secs = rand::rng().random_range(lower.as_secs_f64()..=upper.as_secs_f64());
        Duration::try_from_secs_f64(secs)
            .unwrap_or(upper)
            .clamp(lower, upper)
    }
}

impl Default for JitterRange {
    fn default() -> Self {
        Self {
            lower: Duration::from_millis(100),
            upper: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfiguration {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    #[serde(with = "seconds")]
    pub base_delay: Duration,
    #[serde(with = "seconds")]
    pub max_delay: Duration,
    #[serde(default)]
    pub jitter: JitterRange,
}

impl RetryConfiguration {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: JitterRange::default(),
        }
    }

    pub fn with_jitter(mut self, jitter: JitterRange) -> Self {
        self.jitter = jitter;
        self
    }

    /// 3 retries, 1s base, 30s cap.
    pub fn standard() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(30))
    }

    /// 5 retries, 0.5s base, 30s cap.
    pub fn aggressive() -> Self {
        Self::new(5, Duration::from_millis(500), Duration::from_secs(30))
    }

    /// 1 retry, 2s base, 30s cap.
    pub fn conservative() -> Self {
        Self::new(1, Duration::from_secs(2), Duration::from_secs(30))
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO).with_jitter(JitterRange::none())
    }

    /// Exponential part of the delay for `attempt`, before jitter.
    pub fn capped_backoff(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay.as_secs_f64() * 2f64.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryConfiguration {
    fn default() -> Self {
        Self::standard()
    }
}

/// Outcome of evaluating a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    /// Produced only by policies built with `with_immediate_retries`.
    RetryImmediately,
    Stop,
}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfiguration,
    mapper: ErrorMapper,
    immediate: bool,
}

impl RetryPolicy {
    pub fn new(config: RetryConfiguration) -> Self {
        Self {
            config,
            mapper: ErrorMapper::standard(),
            immediate: false,
        }
    }

    pub fn with_mapper(mut self, mapper: ErrorMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Retry eligible failures at once instead of backing off.
    pub fn with_immediate_retries(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn none() -> Self {
        Self::new(RetryConfiguration::none())
    }

    pub fn config(&self) -> &RetryConfiguration {
        &self.config
    }

    pub fn mapper(&self) -> &ErrorMapper {
        &self.mapper
    }

    pub fn retries_immediately(&self) -> bool {
        self.immediate
    }

    /// Decide what to do after `attempt` (1-based) failed with `error`.
    pub fn decide(&self, error: &NetworkError, attempt: u32) -> RetryDecision {
        if attempt == 0 || attempt > self.config.max_retries {
            return RetryDecision::Stop;
        }
        if !self.mapper.is_retryable(error) {
            RetryDecision::Stop
        } else if self.immediate {
            RetryDecision::RetryImmediately
        } else {
            RetryDecision::RetryAfter(self.calculate_delay(attempt))
        }
    }

    /// Capped exponential backoff plus fresh jitter.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.config
            .capped_backoff(attempt)
            .saturating_add(self.config.jitter.sample())
    }
}

/// Serde adapter writing a `Duration` as fractional seconds.
mod seconds {
    use std::time::Duration;

    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, TransportError, TransportErrorKind};
    use crate::status::StatusValidationError;

    fn timed_out() -> NetworkError {
        NetworkError::from(TransportError::new(TransportErrorKind::TimedOut, "slow"))
    }

    fn assert_within_bounds(policy: &RetryPolicy, attempt: u32) {
        let config = policy.config();
        let low = config.capped_backoff(attempt).as_secs_f64();
        let high = low + config.jitter.upper.as_secs_f64();
        for _ in 0..200 {
            let delay = policy.calculate_delay(attempt).as_secs_f64();
            assert!(delay >= low - 1e-9, "attempt {attempt}: {delay} < {low}");
            assert!(delay <= high + 1e-9, "attempt {attempt}: {delay} > {high}");
        }
    }

    #[test]
    fn presets() {
        let standard = RetryConfiguration::standard();
        assert_eq!(standard.max_retries, 3);
        assert_eq!(standard.base_delay, Duration::from_secs(1));
        assert_eq!(standard.max_delay, Duration::from_secs(30));
        assert_eq!(standard.jitter, JitterRange::new(Duration::from_millis(100), Duration::from_millis(300)));

        assert_eq!(RetryConfiguration::aggressive().max_retries, 5);
        assert_eq!(RetryConfiguration::aggressive().base_delay, Duration::from_millis(500));
        assert_eq!(RetryConfiguration::conservative().max_retries, 1);
        assert_eq!(RetryConfiguration::conservative().base_delay, Duration::from_secs(2));
        assert_eq!(RetryConfiguration::none().max_retries, 0);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let config = RetryConfiguration::standard();
        assert_eq!(config.capped_backoff(1), Duration::from_secs(1));
        assert_eq!(config.capped_backoff(2), Duration::from_secs(2));
        assert_eq!(config.capped_backoff(3), Duration::from_secs(4));
        assert_eq!(config.capped_backoff(5), Duration::from_secs(16));
        assert_eq!(config.capped_backoff(6), Duration::from_secs(30));
        assert_eq!(config.capped_backoff(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn delay_stays_within_bounds() {
        for config in [
            RetryConfiguration::standard(),
            RetryConfiguration::aggressive(),
            RetryConfiguration::conservative(),
        ] {
            let policy = RetryPolicy::new(config);
            for attempt in 1..=12 {
                assert_within_bounds(&policy, attempt);
            }
        }
    }

    #[test]
    fn zero_width_jitter_is_exact() {
        let config = RetryConfiguration::new(3, Duration::from_millis(250), Duration::from_secs(1))
            .with_jitter(JitterRange::none());
        let policy = RetryPolicy::new(config);
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(250));
        assert_eq!(policy.calculate_delay(3), Duration::from_secs(1));
    }

    #[test]
    fn jitter_bounds_are_ordered() {
        let jitter = JitterRange::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(jitter.lower, Duration::from_secs(1));
        assert_eq!(jitter.upper, Duration::from_secs(2));
    }

    #[test]
    fn attempt_zero_and_beyond_budget_stop() {
        let policy = RetryPolicy::new(RetryConfiguration::standard());
        let errors = [
            timed_out(),
            NetworkError::from(StatusValidationError::from_code(503, Vec::new())),
            NetworkError::from(DecodeError::new("x")),
            NetworkError::unknown("x"),
        ];
        for error in &errors {
            assert_eq!(policy.decide(error, 0), RetryDecision::Stop);
            assert_eq!(policy.decide(error, 4), RetryDecision::Stop);
            assert_eq!(policy.decide(error, u32::MAX), RetryDecision::Stop);
        }
    }

    #[test]
    fn retryable_errors_get_a_delay() {
        let policy = RetryPolicy::new(RetryConfiguration::standard());
        for attempt in 1..=3 {
            match policy.decide(&timed_out(), attempt) {
                RetryDecision::RetryAfter(delay) => {
                    let low = policy.config().capped_backoff(attempt);
                    assert!(delay >= low);
                }
                other => panic!("attempt {attempt}: {other:?}"),
            }
        }
        let server = NetworkError::from(StatusValidationError::from_code(502, Vec::new()));
        assert!(matches!(policy.decide(&server, 1), RetryDecision::RetryAfter(_)));
    }

    #[test]
    fn non_retryable_errors_stop() {
        let policy = RetryPolicy::new(RetryConfiguration::aggressive());
        let client = NetworkError::from(StatusValidationError::from_code(404, Vec::new()));
        assert_eq!(policy.decide(&client, 1), RetryDecision::Stop);
        let decode = NetworkError::from(DecodeError::new("x"));
        assert_eq!(policy.decide(&decode, 1), RetryDecision::Stop);
        let cancelled = NetworkError::from(TransportError::cancelled());
        assert_eq!(policy.decide(&cancelled, 1), RetryDecision::Stop);
    }

    #[test]
    fn immediate_policy_skips_backoff_but_keeps_budget() {
        let policy = RetryPolicy::new(RetryConfiguration::standard()).with_immediate_retries();
        assert_eq!(policy.decide(&timed_out(), 1), RetryDecision::RetryImmediately);
        assert_eq!(policy.decide(&timed_out(), 3), RetryDecision::RetryImmediately);
        assert_eq!(policy.decide(&timed_out(), 4), RetryDecision::Stop);
        let client = NetworkError::from(StatusValidationError::from_code(404, Vec::new()));
        assert_eq!(policy.decide(&client, 1), RetryDecision::Stop);
    }

    #[test]
    fn none_always_stops() {
        let policy = RetryPolicy::none();
        for attempt in 0..5 {
            assert_eq!(policy.decide(&timed_out(), attempt), RetryDecision::Stop);
        }
    }

    #[test]
    fn configuration_loads_from_json_seconds() {
        let config: RetryConfiguration = serde_json::from_str(
            r#"{"max_retries":2,"base_delay":0.5,"max_delay":10,"jitter":{"lower":0.0,"upper":0.25}}"#,
        )
        .unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.base_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(10));
        assert_eq!(config.jitter.upper, Duration::from_millis(250));

        let config: RetryConfiguration =
            serde_json::from_str(r#"{"max_retries":1,"base_delay":1,"max_delay":5}"#).unwrap();
        assert_eq!(config.jitter, JitterRange::default());

        let err = serde_json::from_str::<RetryConfiguration>(
            r#"{"max_retries":1,"base_delay":-1,"max_delay":5}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn inverted_jitter_from_json_is_reordered() {
        let config: RetryConfiguration = serde_json::from_str(
            r#"{"max_retries":3,"base_delay":1,"max_delay":30,"jitter":{"lower":0.5,"upper":0.1}}"#,
        )
        .unwrap();
        assert_eq!(config.jitter.lower, Duration::from_millis(100));
        assert_eq!(config.jitter.upper, Duration::from_millis(500));

        let policy = RetryPolicy::new(config);
        for _ in 0..200 {
            let delay = policy.calculate_delay(1);
            assert!(delay >= Duration::from_millis(1100), "{delay:?}");
            assert!(delay <= Duration::from_millis(1500), "{delay:?}");
        }
    }

    #[test]
    fn inverted_jitter_fields_still_sample_within_bounds() {
        let jitter = JitterRange {
            lower: Duration::from_millis(400),
            upper: Duration::from_millis(200),
        };
        for _ in 0..200 {
            let sample = jitter.sample();
            assert!(sample >= Duration::from_millis(200), "{sample:?}");
            assert!(sample <= Duration::from_millis(400), "{sample:?}");
        }
    }

    #[test]
    fn zero_base_delay_never_backs_off() {
        let config = RetryConfiguration::new(u32::MAX, Duration::ZERO, Duration::from_secs(30));
        for attempt in [1, 1024, 1025, 5000, u32::MAX] {
            assert_eq!(config.capped_backoff(attempt), Duration::ZERO, "attempt {attempt}");
        }
    }

    #[test]
    fn huge_delays_saturate_instead_of_panicking() {
        let config = RetryConfiguration::new(3, Duration::MAX, Duration::MAX)
            .with_jitter(JitterRange::new(Duration::ZERO, Duration::from_secs(1)));
        assert_eq!(config.capped_backoff(u32::MAX), Duration::MAX);
        assert_eq!(RetryPolicy::new(config).calculate_delay(u32::MAX), Duration::MAX);
    }
}
