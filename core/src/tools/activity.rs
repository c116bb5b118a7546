//! Manager-facing activity reporting: the daily summary and the recent
//! audit trace.

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sqlx::PgConnection;

use crate::broker::{self, TenantCredentials};
use crate::config::CoreConfig;
use crate::error::{ToolError, ToolOutput};

#[derive(Debug, Deserialize)]
pub struct ActivitySummaryParams {
    pub manager_id: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
}

fn default_timeframe() -> String {
    "daily".to_string()
}

/// Per-category event counts plus compliance-flag counts for the current
/// day, from the global_activity_feed view.
pub async fn activity_summary(
    creds: &TenantCredentials,
    params: ActivitySummaryParams,
    cfg: &CoreConfig,
) -> Result<ToolOutput, ToolError> {
    let mut conn = broker::acquire(creds, cfg.db_timeout).await?;
    let out = summarize_day(&mut conn, &params).await;
    broker::release(conn).await;
    out.map_err(|e| ToolError::Database(e.to_string()))
}

async fn summarize_day(
    conn: &mut PgConnection,
    params: &ActivitySummaryParams,
) -> Result<ToolOutput, sqlx::Error> {
    let rows: Vec<(String, i64, i64)> = sqlx::query_as(
        r#"
        SELECT activity_type,
               COUNT(*) AS total_events,
               COUNT(CASE WHEN compliance_check = FALSE THEN 1 END) AS issues
        FROM global_activity_feed
        WHERE manager_id = $1
          AND created_at >= CURRENT_DATE
        GROUP BY activity_type
        "#,
    )
    .bind(&params.manager_id)
    .fetch_all(conn)
    .await?;

    if rows.is_empty() {
        return Ok(ToolOutput::Message(format!(
            "No activity recorded today for Manager ID: {}",
            params.manager_id
        )));
    }

    let mut summary = Map::new();
    let mut total_actions_today = 0i64;
    for (activity_type, total_events, issues) in rows {
        total_actions_today += total_events;
        summary.insert(
            activity_type,
            json!({ "total_events": total_events, "compliance_flags": issues }),
        );
    }

    Ok(ToolOutput::Payload(json!({
        "manager_id": params.manager_id,
        "timeframe": params.timeframe,
        "summary": Value::Object(summary),
        "total_actions_today": total_actions_today,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RecentActivityParams {
    pub manager_id: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub category: Option<String>,
}

fn default_limit() -> i64 {
    10
}

/// Builds the audit-trace query; the category predicate is only present
/// when a filter was supplied, which shifts the limit placeholder.
pub(crate) fn recent_activity_sql(with_category: bool) -> String {
    let mut sql = String::from(
        "SELECT timestamp, category, reference_id, action, details \
         FROM global_audit_trace \
         WHERE manager_id = $1",
    );
    if with_category {
        sql.push_str(" AND category = $2 ORDER BY timestamp DESC LIMIT $3");
    } else {
        sql.push_str(" ORDER BY timestamp DESC LIMIT $2");
    }
    sql
}

/// Chronological audit trace, newest first, bounded, with an optional
/// category filter (normalized to upper case).
pub async fn recent_activity(
    creds: &TenantCredentials,
    params: RecentActivityParams,
    cfg: &CoreConfig,
) -> Result<ToolOutput, ToolError> {
    let mut conn = broker::acquire(creds, cfg.db_timeout).await?;
    let out = trace_recent(&mut conn, &params).await;
    broker::release(conn).await;
    out.map_err(|e| ToolError::Audit(e.to_string()))
}

async fn trace_recent(
    conn: &mut PgConnection,
    params: &RecentActivityParams,
) -> Result<ToolOutput, sqlx::Error> {
    type TraceRow = (
        NaiveDateTime,
        String,
        Option<String>,
        String,
        Option<String>,
    );

    let sql = recent_activity_sql(params.category.is_some());
    let query = sqlx::query_as::<_, TraceRow>(&sql).bind(&params.manager_id);
    let query = match &params.category {
        Some(category) => query.bind(category.to_uppercase()).bind(params.limit),
        None => query.bind(params.limit),
    };
    let rows = query.fetch_all(conn).await?;

    if rows.is_empty() {
        return Ok(ToolOutput::Message(format!(
            "No recent activity found for Manager {}.",
            params.manager_id
        )));
    }

    let activities: Vec<Value> = rows
        .into_iter()
        .map(|(timestamp, category, reference_id, action, details)| {
            json!({
                "time": timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                "type": category,
                "ref": reference_id,
                "action": action,
                "details": details,
            })
        })
        .collect();

    Ok(ToolOutput::Payload(json!({
        "manager_id": params.manager_id,
        "record_count": activities.len(),
        "activities": activities,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_filter_appears_only_when_supplied() {
        let plain = recent_activity_sql(false);
        assert!(!plain.contains("category ="));
        assert!(plain.contains("LIMIT $2"));

        let filtered = recent_activity_sql(true);
        assert!(filtered.contains("AND category = $2"));
        assert!(filtered.contains("LIMIT $3"));
    }

    #[test]
    fn trace_query_is_manager_scoped() {
        assert!(recent_activity_sql(false).contains("manager_id = $1"));
        assert!(recent_activity_sql(true).contains("manager_id = $1"));
    }

    #[test]
    fn defaults_apply_from_sparse_arguments() {
        let params: RecentActivityParams =
            serde_json::from_value(json!({ "manager_id": "mgr-1" })).unwrap();
        assert_eq!(params.limit, 10);
        assert!(params.category.is_none());

        let params: ActivitySummaryParams =
            serde_json::from_value(json!({ "manager_id": "mgr-1" })).unwrap();
        assert_eq!(params.timeframe, "daily");
    }
}
