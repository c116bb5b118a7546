//! Anomaly engine: statistical and temporal outlier detection over the
//! tenant's audit history.
//!
//! Two independent detectors share one manager scope: a volume detector
//! comparing each actor's trailing-hour count against the trailing-week
//! daily baseline, and a timing detector flagging after-hours actions.
//! Every invocation recomputes from raw history; there is no persisted
//! alert state, deduplication or suppression window.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgConnection;

use crate::broker::{self, TenantCredentials};
use crate::config::{AnomalyPolicy, CoreConfig};
use crate::error::{ToolError, ToolOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertKind {
    #[serde(rename = "Volume Spike")]
    VolumeSpike,
    #[serde(rename = "Suspicious Timing")]
    SuspiciousTiming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyAlert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub details: String,
}

#[derive(Debug, Deserialize)]
pub struct DetectAnomaliesParams {
    pub manager_id: String,
}

pub async fn detect_anomalous_activity(
    creds: &TenantCredentials,
    params: DetectAnomaliesParams,
    cfg: &CoreConfig,
) -> Result<ToolOutput, ToolError> {
    let mut conn = broker::acquire(creds, cfg.db_timeout).await?;
    let out = detect(&mut conn, &params, &cfg.anomaly).await;
    broker::release(conn).await;
    out.map_err(|e| ToolError::Anomaly(e.to_string()))
}

async fn detect(
    conn: &mut PgConnection,
    params: &DetectAnomaliesParams,
    policy: &AnomalyPolicy,
) -> Result<ToolOutput, sqlx::Error> {
    // Baseline: mean per-calendar-day action count over the trailing week.
    let avg_daily: f64 = sqlx::query_scalar(
        r#"
        WITH daily_stats AS (
            SELECT count(*) AS cnt
            FROM staff_activity_trace
            WHERE manager_id = $1
              AND action_timestamp > NOW() - INTERVAL '7 days'
            GROUP BY date_trunc('day', action_timestamp)
        )
        SELECT COALESCE(AVG(cnt), 0)::float8 FROM daily_stats
        "#,
    )
    .bind(&params.manager_id)
    .fetch_one(&mut *conn)
    .await?;

    let hourly_counts: Vec<(i64, String)> = sqlx::query_as(
        r#"
        SELECT count(*), staff_name
        FROM staff_activity_trace
        WHERE manager_id = $1
          AND action_timestamp > NOW() - INTERVAL '1 hour'
        GROUP BY staff_name
        "#,
    )
    .bind(&params.manager_id)
    .fetch_all(&mut *conn)
    .await?;

    let late_actions: Vec<(String, String, NaiveDateTime)> = sqlx::query_as(
        r#"
        SELECT staff_name, action_type, action_timestamp
        FROM staff_activity_trace
        WHERE manager_id = $1
          AND EXTRACT(HOUR FROM action_timestamp) BETWEEN $2 AND $3
          AND action_timestamp > NOW() - INTERVAL '24 hours'
        "#,
    )
    .bind(&params.manager_id)
    .bind(*policy.quiet_hours.start() as i32)
    .bind(*policy.quiet_hours.end() as i32)
    .fetch_all(&mut *conn)
    .await?;

    let mut alerts = volume_alerts(avg_daily, &hourly_counts, policy);
    alerts.extend(timing_alerts(&late_actions, policy));

    Ok(ToolOutput::Payload(json!({
        "analysis_status": "Complete",
        "anomalies_found": alerts.len(),
        "alerts": alerts,
    })))
}

/// Flags every actor whose trailing-hour count exceeds the configured
/// fraction of the daily baseline. A zero baseline yields no alerts: with
/// no trailing-week history the comparison is meaningless.
pub fn volume_alerts(
    avg_daily: f64,
    hourly_counts: &[(i64, String)],
    policy: &AnomalyPolicy,
) -> Vec<AnomalyAlert> {
    if avg_daily <= 0.0 {
        return Vec::new();
    }

    hourly_counts
        .iter()
        .filter(|(count, _)| *count as f64 > avg_daily * policy.spike_multiplier)
        .map(|(count, name)| AnomalyAlert {
            kind: AlertKind::VolumeSpike,
            severity: Severity::High,
            details: format!(
                "User {name} performed {count} actions in 60 mins (Avg daily: {})",
                avg_daily.round() as i64
            ),
        })
        .collect()
}

/// One Medium alert per after-hours action in the trailing day. Rows are
/// re-checked against the policy window, so a stale or over-wide fetch
/// cannot produce an alert outside it.
pub fn timing_alerts(
    late_actions: &[(String, String, NaiveDateTime)],
    policy: &AnomalyPolicy,
) -> Vec<AnomalyAlert> {
    late_actions
        .iter()
        .filter(|(_, _, timestamp)| is_after_hours(timestamp, policy))
        .map(|(name, action, timestamp)| AnomalyAlert {
            kind: AlertKind::SuspiciousTiming,
            severity: Severity::Medium,
            details: format!(
                "{name} performed {action} at {} (After-hours)",
                timestamp.format("%H:%M")
            ),
        })
        .collect()
}

/// Whether an hour-of-day falls in the policy's after-hours window. The
/// SQL predicate mirrors this.
pub fn is_after_hours(timestamp: &NaiveDateTime, policy: &AnomalyPolicy) -> bool {
    policy.quiet_hours.contains(&timestamp.time().hour())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 29)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn spike_over_half_the_daily_average_is_flagged() {
        let policy = AnomalyPolicy::default();
        let alerts = volume_alerts(10.0, &[(6, "mallory".to_string())], &policy);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::VolumeSpike);
        assert_eq!(alerts[0].severity, Severity::High);
        assert!(alerts[0].details.contains("mallory"));
        assert!(alerts[0].details.contains("6 actions"));
        assert!(alerts[0].details.contains("Avg daily: 10"));
    }

    #[test]
    fn hourly_count_at_exactly_half_is_not_flagged() {
        let policy = AnomalyPolicy::default();
        let alerts = volume_alerts(10.0, &[(5, "bob".to_string())], &policy);
        assert!(alerts.is_empty());
    }

    #[test]
    fn zero_baseline_yields_no_volume_alerts() {
        let policy = AnomalyPolicy::default();
        let alerts = volume_alerts(0.0, &[(1000, "mallory".to_string())], &policy);
        assert!(alerts.is_empty());
    }

    #[test]
    fn each_late_night_action_yields_exactly_one_alert() {
        let policy = AnomalyPolicy::default();
        let late = vec![
            ("dana".to_string(), "DELETE".to_string(), at(2, 0)),
            ("dana".to_string(), "UPDATE".to_string(), at(4, 30)),
        ];
        let alerts = timing_alerts(&late, &policy);
        assert_eq!(alerts.len(), 2);
        assert!(alerts
            .iter()
            .all(|a| a.kind == AlertKind::SuspiciousTiming && a.severity == Severity::Medium));
        assert!(alerts[0].details.contains("02:00"));
        assert!(alerts[1].details.contains("04:30"));
    }

    #[test]
    fn timing_detector_drops_rows_outside_the_quiet_window() {
        let policy = AnomalyPolicy::default();
        let rows = vec![
            ("dana".to_string(), "DELETE".to_string(), at(2, 0)),
            ("dana".to_string(), "UPDATE".to_string(), at(14, 0)),
        ];
        let alerts = timing_alerts(&rows, &policy);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].details.contains("02:00"));
    }

    #[test]
    fn business_hours_are_not_after_hours() {
        let policy = AnomalyPolicy::default();
        assert!(is_after_hours(&at(2, 0), &policy));
        assert!(is_after_hours(&at(5, 59), &policy));
        assert!(!is_after_hours(&at(6, 0), &policy));
        assert!(!is_after_hours(&at(9, 0), &policy));
    }

    #[test]
    fn alert_kinds_serialize_with_spaced_labels() {
        let alert = AnomalyAlert {
            kind: AlertKind::VolumeSpike,
            severity: Severity::High,
            details: "x".to_string(),
        };
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["type"], "Volume Spike");
        assert_eq!(value["severity"], "High");
    }

    #[test]
    fn mixed_detectors_combine_into_one_list() {
        let policy = AnomalyPolicy::default();
        let mut alerts = volume_alerts(4.0, &[(3, "eve".to_string())], &policy);
        alerts.extend(timing_alerts(
            &[("eve".to_string(), "DROP".to_string(), at(1, 15))],
            &policy,
        ));
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].kind, AlertKind::VolumeSpike);
        assert_eq!(alerts[1].kind, AlertKind::SuspiciousTiming);
    }
}
