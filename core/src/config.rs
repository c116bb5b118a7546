use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

/// Tunable thresholds for the anomaly engine and related audit tools.
///
/// These are deployment policy, not derived values, so every one of them
/// can be overridden from the environment.
#[derive(Debug, Clone)]
pub struct AnomalyPolicy {
    /// An actor's trailing-hour count must exceed this fraction of the
    /// trailing-week daily average to raise a volume-spike alert.
    pub spike_multiplier: f64,
    /// Hours of the day (inclusive) considered after-hours.
    pub quiet_hours: RangeInclusive<u32>,
    /// More privileged actions than this in the window raises the
    /// privileged-activity report to alert level High.
    pub privileged_alert_threshold: usize,
    /// Capacity reference for the growth-trends utilization figure, in MB.
    pub storage_capacity_mb: f64,
}

impl Default for AnomalyPolicy {
    fn default() -> Self {
        Self {
            spike_multiplier: 0.5,
            quiet_hours: 0..=5,
            privileged_alert_threshold: 5,
            storage_capacity_mb: 500.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Per-call bound on establishing a tenant database session.
    pub db_timeout: Duration,
    /// Per-call bound on one language-model request.
    pub llm_timeout: Duration,
    /// Cap on synthesize/execute attempts per pipeline run.
    pub max_synthesis_attempts: usize,
    pub anomaly: AnomalyPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_timeout: Duration::from_secs(30),
            llm_timeout: Duration::from_secs(60),
            max_synthesis_attempts: 3,
            anomaly: AnomalyPolicy::default(),
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            db_timeout: Duration::from_secs(env_parse(
                "ECOMOPS_DB_TIMEOUT_SECS",
                defaults.db_timeout.as_secs(),
            )),
            llm_timeout: Duration::from_secs(env_parse(
                "ECOMOPS_LLM_TIMEOUT_SECS",
                defaults.llm_timeout.as_secs(),
            )),
            max_synthesis_attempts: env_parse(
                "ECOMOPS_MAX_SYNTHESIS_ATTEMPTS",
                defaults.max_synthesis_attempts,
            )
            .max(1),
            anomaly: AnomalyPolicy {
                spike_multiplier: env_parse(
                    "ECOMOPS_SPIKE_MULTIPLIER",
                    defaults.anomaly.spike_multiplier,
                ),
                quiet_hours: std::env::var("ECOMOPS_QUIET_HOURS")
                    .ok()
                    .and_then(|raw| parse_hour_range(&raw))
                    .unwrap_or(defaults.anomaly.quiet_hours),
                privileged_alert_threshold: env_parse(
                    "ECOMOPS_PRIVILEGED_ALERT_THRESHOLD",
                    defaults.anomaly.privileged_alert_threshold,
                ),
                storage_capacity_mb: env_parse(
                    "ECOMOPS_STORAGE_CAPACITY_MB",
                    defaults.anomaly.storage_capacity_mb,
                ),
            },
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parses an inclusive hour range written as "0-5". Out-of-range or
/// inverted bounds are rejected.
fn parse_hour_range(raw: &str) -> Option<RangeInclusive<u32>> {
    let (start, end) = raw.trim().split_once('-')?;
    let start: u32 = start.trim().parse().ok()?;
    let end: u32 = end.trim().parse().ok()?;
    if start > end || end > 23 {
        return None;
    }
    Some(start..=end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_range_parses_inclusive_bounds() {
        assert_eq!(parse_hour_range("0-5"), Some(0..=5));
        assert_eq!(parse_hour_range(" 22-23 "), Some(22..=23));
    }

    #[test]
    fn hour_range_rejects_garbage() {
        assert_eq!(parse_hour_range("5-0"), None);
        assert_eq!(parse_hour_range("0-24"), None);
        assert_eq!(parse_hour_range("night"), None);
        assert_eq!(parse_hour_range(""), None);
    }

    #[test]
    fn defaults_match_shipped_policy() {
        let policy = AnomalyPolicy::default();
        assert_eq!(policy.spike_multiplier, 0.5);
        assert_eq!(policy.quiet_hours, 0..=5);
        assert_eq!(policy.privileged_alert_threshold, 5);
    }
}
