//! Insider-threat surface: admin-role and schema-mutating action review.

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgConnection;

use crate::broker::{self, TenantCredentials};
use crate::config::CoreConfig;
use crate::error::{ToolError, ToolOutput};

#[derive(Debug, Deserialize)]
pub struct PrivilegedActivityParams {
    pub manager_id: String,
    #[serde(default = "default_timeframe_days")]
    pub timeframe_days: i32,
}

fn default_timeframe_days() -> i32 {
    30
}

/// Actions by Admin-role staff, or GRANT/REVOKE/ALTER/DROP by anyone,
/// within the trailing window. The report escalates to alert level High
/// once matches exceed the configured threshold.
pub async fn privileged_activity(
    creds: &TenantCredentials,
    params: PrivilegedActivityParams,
    cfg: &CoreConfig,
) -> Result<ToolOutput, ToolError> {
    let mut conn = broker::acquire(creds, cfg.db_timeout).await?;
    let out = review(&mut conn, &params, cfg.anomaly.privileged_alert_threshold).await;
    broker::release(conn).await;
    out.map_err(|e| ToolError::Security(e.to_string()))
}

async fn review(
    conn: &mut PgConnection,
    params: &PrivilegedActivityParams,
    alert_threshold: usize,
) -> Result<ToolOutput, sqlx::Error> {
    type PrivilegedRow = (NaiveDateTime, String, String, String, Option<String>);

    let rows: Vec<PrivilegedRow> = sqlx::query_as(
        r#"
        SELECT action_timestamp, staff_name, staff_role, action_type, details
        FROM staff_activity_trace
        WHERE manager_id = $1
          AND (staff_role = 'Admin' OR action_type IN ('GRANT', 'REVOKE', 'ALTER', 'DROP'))
          AND action_timestamp >= CURRENT_DATE - make_interval(days => $2)
        ORDER BY action_timestamp DESC
        "#,
    )
    .bind(&params.manager_id)
    .bind(params.timeframe_days)
    .fetch_all(conn)
    .await?;

    if rows.is_empty() {
        return Ok(ToolOutput::Message(format!(
            "No privileged activities detected in the last {} days.",
            params.timeframe_days
        )));
    }

    let actions: Vec<Value> = rows
        .into_iter()
        .map(|(timestamp, name, _role, action_type, details)| {
            json!({
                "timestamp": timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                "administrator": name,
                "action": action_type,
                "impact": details,
            })
        })
        .collect();

    Ok(ToolOutput::Payload(json!({
        "audit_scope": format!("{} Days", params.timeframe_days),
        "alert_level": alert_level(actions.len(), alert_threshold),
        "privileged_actions": actions,
    })))
}

pub(crate) fn alert_level(matches: usize, threshold: usize) -> &'static str {
    if matches > threshold {
        "High"
    } else {
        "Normal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_level_splits_strictly_above_threshold() {
        assert_eq!(alert_level(5, 5), "Normal");
        assert_eq!(alert_level(6, 5), "High");
        assert_eq!(alert_level(0, 5), "Normal");
    }

    #[test]
    fn timeframe_defaults_to_thirty_days() {
        let params: PrivilegedActivityParams =
            serde_json::from_value(json!({ "manager_id": "mgr-1" })).unwrap();
        assert_eq!(params.timeframe_days, 30);
    }
}
