//! Per-staff behavior trace for privileged-user reviews and contractor
//! monitoring.

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgConnection;

use crate::broker::{self, TenantCredentials};
use crate::config::CoreConfig;
use crate::error::{ToolError, ToolOutput};

#[derive(Debug, Deserialize)]
pub struct UserActivityParams {
    pub manager_id: String,
    /// Staff name (fuzzy) or staff id (exact).
    pub staff_identifier: String,
    #[serde(default = "default_days_back")]
    pub days_back: i32,
}

fn default_days_back() -> i32 {
    7
}

pub async fn user_activity(
    creds: &TenantCredentials,
    params: UserActivityParams,
    cfg: &CoreConfig,
) -> Result<ToolOutput, ToolError> {
    let mut conn = broker::acquire(creds, cfg.db_timeout).await?;
    let out = trace_staff(&mut conn, &params).await;
    broker::release(conn).await;
    out.map_err(|e| ToolError::Accountability(e.to_string()))
}

async fn trace_staff(
    conn: &mut PgConnection,
    params: &UserActivityParams,
) -> Result<ToolOutput, sqlx::Error> {
    type StaffRow = (
        NaiveDateTime,
        String,
        String,
        String,
        Option<String>,
        Option<String>,
    );

    let rows: Vec<StaffRow> = sqlx::query_as(
        r#"
        SELECT action_timestamp, staff_name, staff_role, action_type, table_affected, details
        FROM staff_activity_trace
        WHERE manager_id = $1
          AND (staff_name ILIKE $2 OR staff_id = $3)
          AND action_timestamp >= CURRENT_DATE - make_interval(days => $4)
        ORDER BY action_timestamp DESC
        "#,
    )
    .bind(&params.manager_id)
    .bind(format!("%{}%", params.staff_identifier))
    .bind(&params.staff_identifier)
    .bind(params.days_back)
    .fetch_all(conn)
    .await?;

    if rows.is_empty() {
        return Ok(ToolOutput::Message(format!(
            "No activity records found for '{}' in the last {} days.",
            params.staff_identifier, params.days_back
        )));
    }

    let logs: Vec<Value> = rows
        .into_iter()
        .map(
            |(timestamp, name, role, action_type, table_affected, details)| {
                json!({
                    "timestamp": timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    "user": format!("{name} ({role})"),
                    "action": format!(
                        "{action_type} on {}",
                        table_affected.as_deref().unwrap_or("n/a")
                    ),
                    "description": details,
                })
            },
        )
        .collect();

    Ok(ToolOutput::Payload(json!({
        "target_user": params.staff_identifier,
        "summary": format!("Found {} actions", logs.len()),
        "logs": logs,
    })))
}
