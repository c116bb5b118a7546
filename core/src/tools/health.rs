//! Live-health and capacity tools: session census, slow-statement report,
//! failure log and storage growth.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgConnection;

use crate::broker::{self, TenantCredentials};
use crate::config::CoreConfig;
use crate::error::{ToolError, ToolOutput};

#[derive(Debug, Deserialize)]
pub struct ActiveConnectionsParams {
    /// Accepted for interface parity with the other manager tools; the
    /// census is scoped by current_database(), not by manager.
    #[serde(default)]
    pub manager_id: Option<String>,
}

/// Census of live sessions against the tenant database, classified into
/// active/idle/other. The current query is only reported for active
/// sessions.
pub async fn active_connections(
    creds: &TenantCredentials,
    _params: ActiveConnectionsParams,
    cfg: &CoreConfig,
) -> Result<ToolOutput, ToolError> {
    let mut conn = broker::acquire(creds, cfg.db_timeout).await?;
    let out = census(&mut conn).await;
    broker::release(conn).await;
    out.map_err(|e| ToolError::Health(e.to_string()))
}

async fn census(conn: &mut PgConnection) -> Result<ToolOutput, sqlx::Error> {
    type SessionRow = (
        i32,
        Option<String>,
        String,
        Option<String>,
        Option<DateTime<Utc>>,
        Option<String>,
    );

    let rows: Vec<SessionRow> = sqlx::query_as(
        r#"
        SELECT pid, usename, state, query, backend_start, client_addr::text
        FROM pg_stat_activity
        WHERE datname = current_database()
          AND state IS NOT NULL
        "#,
    )
    .fetch_all(conn)
    .await?;

    if rows.is_empty() {
        return Ok(ToolOutput::Message(
            "No active connections detected (highly unusual).".to_string(),
        ));
    }

    let (mut active, mut idle, mut other) = (0u32, 0u32, 0u32);
    let details: Vec<Value> = rows
        .into_iter()
        .map(|(pid, usename, state, query, backend_start, client_addr)| {
            match state.as_str() {
                "active" => active += 1,
                "idle" => idle += 1,
                _ => other += 1,
            }
            json!({
                "process_id": pid,
                "user": usename,
                "status": state,
                "current_query": if state == "active" {
                    query.unwrap_or_default()
                } else {
                    "None (Idle)".to_string()
                },
                "connected_since": backend_start
                    .map(|t| t.format("%H:%M:%S").to_string()),
                "ip": client_addr.unwrap_or_else(|| "Internal".to_string()),
            })
        })
        .collect();

    Ok(ToolOutput::Payload(json!({
        "summary": { "active": active, "idle": idle, "other": other },
        "total_connections": details.len(),
        "details": details,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SlowQueriesParams {
    #[serde(default = "default_slow_limit")]
    pub limit: i64,
}

fn default_slow_limit() -> i64 {
    5
}

/// Top cumulative-time statements from pg_stat_statements. Statements
/// that mention pg_stat are excluded so the monitoring view never reports
/// itself.
pub async fn slow_queries(
    creds: &TenantCredentials,
    params: SlowQueriesParams,
    cfg: &CoreConfig,
) -> Result<ToolOutput, ToolError> {
    let mut conn = broker::acquire(creds, cfg.db_timeout).await?;
    let out = bottlenecks(&mut conn, &params).await;
    broker::release(conn).await;
    out.map_err(|e| ToolError::Performance(e.to_string()))
}

async fn bottlenecks(
    conn: &mut PgConnection,
    params: &SlowQueriesParams,
) -> Result<ToolOutput, sqlx::Error> {
    let rows: Vec<(String, i64, f64, f64, i64)> = sqlx::query_as(
        r#"
        SELECT query,
               calls,
               total_exec_time / 1000 AS total_seconds,
               mean_exec_time AS avg_ms,
               rows
        FROM pg_stat_statements
        WHERE query NOT LIKE '%pg_stat%'
        ORDER BY total_exec_time DESC
        LIMIT $1
        "#,
    )
    .bind(params.limit)
    .fetch_all(conn)
    .await?;

    if rows.is_empty() {
        return Ok(ToolOutput::Message(
            "No performance data available. (Ensure pg_stat_statements is enabled)".to_string(),
        ));
    }

    let top: Vec<Value> = rows
        .into_iter()
        .map(|(query, calls, total_seconds, avg_ms, row_count)| {
            json!({
                "query_snippet": snippet(&query, 100),
                "executions": calls,
                "total_time_spent_sec": round2(total_seconds),
                "average_latency_ms": round2(avg_ms),
                "rows_processed": row_count,
            })
        })
        .collect();

    Ok(ToolOutput::Payload(json!({
        "status": "Performance Report",
        "top_bottlenecks": top,
    })))
}

/// Truncates on a char boundary so multi-byte statements cannot panic.
pub(crate) fn snippet(query: &str, max_chars: usize) -> String {
    let mut s: String = query.chars().take(max_chars).collect();
    s.push_str("...");
    s
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Deserialize)]
pub struct FailedOperationsParams {
    pub manager_id: String,
    #[serde(default = "default_failed_limit")]
    pub limit: i64,
}

fn default_failed_limit() -> i64 {
    10
}

/// Recent query and system failures recorded for the tenant, newest first.
pub async fn failed_operations(
    creds: &TenantCredentials,
    params: FailedOperationsParams,
    cfg: &CoreConfig,
) -> Result<ToolOutput, ToolError> {
    let mut conn = broker::acquire(creds, cfg.db_timeout).await?;
    let out = failures(&mut conn, &params).await;
    broker::release(conn).await;
    out.map_err(|e| ToolError::Diagnostic(e.to_string()))
}

async fn failures(
    conn: &mut PgConnection,
    params: &FailedOperationsParams,
) -> Result<ToolOutput, sqlx::Error> {
    type FailureRow = (NaiveDateTime, Option<String>, String, Option<String>);

    let rows: Vec<FailureRow> = sqlx::query_as(
        r#"
        SELECT timestamp, error_code, error_message, failed_query
        FROM system_error_logs
        WHERE manager_id = $1
        ORDER BY timestamp DESC
        LIMIT $2
        "#,
    )
    .bind(&params.manager_id)
    .bind(params.limit)
    .fetch_all(conn)
    .await?;

    if rows.is_empty() {
        return Ok(ToolOutput::Message(
            "Good news: No failed operations recorded recently.".to_string(),
        ));
    }

    let failures: Vec<Value> = rows
        .into_iter()
        .map(|(timestamp, code, message, failed_query)| {
            json!({
                "time": timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                "code": code,
                "error": message,
                "query_context": failed_query.unwrap_or_else(|| "N/A".to_string()),
            })
        })
        .collect();

    Ok(ToolOutput::Payload(json!({
        "status": "Error Audit Results",
        "failures": failures,
    })))
}

#[derive(Debug, Deserialize)]
pub struct GrowthTrendsParams {
    #[serde(default)]
    pub manager_id: Option<String>,
}

/// Per-table storage footprint and a utilization figure against the
/// configured capacity constant.
pub async fn growth_trends(
    creds: &TenantCredentials,
    _params: GrowthTrendsParams,
    cfg: &CoreConfig,
) -> Result<ToolOutput, ToolError> {
    let mut conn = broker::acquire(creds, cfg.db_timeout).await?;
    let out = storage_report(&mut conn, cfg.anomaly.storage_capacity_mb).await;
    broker::release(conn).await;
    out.map_err(|e| ToolError::Growth(e.to_string()))
}

async fn storage_report(
    conn: &mut PgConnection,
    capacity_mb: f64,
) -> Result<ToolOutput, sqlx::Error> {
    let rows: Vec<(String, f64, i64)> = sqlx::query_as(
        r#"
        SELECT relname AS table_name,
               round(pg_total_relation_size(relid) / 1024.0 / 1024.0, 2)::float8 AS size_mb,
               reltuples::bigint AS row_count
        FROM pg_catalog.pg_statio_user_tables
        ORDER BY pg_total_relation_size(relid) DESC
        "#,
    )
    .fetch_all(conn)
    .await?;

    if rows.is_empty() {
        return Ok(ToolOutput::Message("No table data found.".to_string()));
    }

    let mut total_size_mb = 0.0;
    let tables: Vec<Value> = rows
        .into_iter()
        .map(|(table, size_mb, approx_rows)| {
            total_size_mb += size_mb;
            json!({
                "table": table,
                "size_mb": size_mb,
                "approx_rows": approx_rows,
            })
        })
        .collect();

    Ok(ToolOutput::Payload(json!({
        "total_size_mb": round2(total_size_mb),
        "storage_limit_utilization": utilization_label(total_size_mb, capacity_mb),
        "tables": tables,
    })))
}

/// Percentage of the capacity constant used, or a near-limit warning once
/// the total reaches it.
pub(crate) fn utilization_label(total_mb: f64, capacity_mb: f64) -> String {
    if total_mb < capacity_mb {
        let pct = (total_mb / capacity_mb * 1000.0).round() / 10.0;
        format!("{pct:.1}%")
    } else {
        "Warning: Near Limit".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utilization_under_capacity_keeps_one_decimal() {
        assert_eq!(utilization_label(125.0, 500.0), "25.0%");
        assert_eq!(utilization_label(62.3, 500.0), "12.5%");
        assert_eq!(utilization_label(0.0, 500.0), "0.0%");
    }

    #[test]
    fn utilization_at_or_over_capacity_warns() {
        assert_eq!(utilization_label(500.0, 500.0), "Warning: Near Limit");
        assert_eq!(utilization_label(900.0, 500.0), "Warning: Near Limit");
    }

    #[test]
    fn snippet_is_char_boundary_safe() {
        let s = snippet("sélect * from orders", 3);
        assert_eq!(s, "sél...");
    }

    #[test]
    fn limits_default_per_tool() {
        let slow: SlowQueriesParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(slow.limit, 5);

        let failed: FailedOperationsParams =
            serde_json::from_value(json!({ "manager_id": "mgr-1" })).unwrap();
        assert_eq!(failed.limit, 10);
    }
}
