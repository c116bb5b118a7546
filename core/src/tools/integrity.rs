//! Data-integrity trace: INSERT/UPDATE/DELETE history with before/after
//! payloads, for change-approval audits and rollback investigations.

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgConnection;

use crate::broker::{self, TenantCredentials};
use crate::config::CoreConfig;
use crate::error::{ToolError, ToolOutput};

#[derive(Debug, Deserialize)]
pub struct DataModificationsParams {
    pub manager_id: String,
    #[serde(default)]
    pub table_name: Option<String>,
    /// 'INSERT', 'UPDATE' or 'DELETE'.
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

/// Appends the optional filters in a fixed order so the placeholder
/// numbering matches the bind order in `trace_modifications`.
pub(crate) fn data_modifications_sql(with_table: bool, with_action: bool) -> String {
    let mut sql = String::from(
        "SELECT action_timestamp, table_affected, action_type, old_data, new_data, staff_name \
         FROM system_audit_logs \
         WHERE manager_id = $1",
    );
    let mut next = 2;
    if with_table {
        sql.push_str(&format!(" AND table_affected = ${next}"));
        next += 1;
    }
    if with_action {
        sql.push_str(&format!(" AND action_type = ${next}"));
        next += 1;
    }
    sql.push_str(&format!(" ORDER BY action_timestamp DESC LIMIT ${next}"));
    sql
}

pub async fn data_modifications(
    creds: &TenantCredentials,
    params: DataModificationsParams,
    cfg: &CoreConfig,
) -> Result<ToolOutput, ToolError> {
    let mut conn = broker::acquire(creds, cfg.db_timeout).await?;
    let out = trace_modifications(&mut conn, &params).await;
    broker::release(conn).await;
    out.map_err(|e| ToolError::Modification(e.to_string()))
}

async fn trace_modifications(
    conn: &mut PgConnection,
    params: &DataModificationsParams,
) -> Result<ToolOutput, sqlx::Error> {
    type ModRow = (
        NaiveDateTime,
        String,
        String,
        Option<Value>,
        Option<Value>,
        String,
    );

    let sql = data_modifications_sql(params.table_name.is_some(), params.action_type.is_some());
    let mut query = sqlx::query_as::<_, ModRow>(&sql).bind(&params.manager_id);
    if let Some(table) = &params.table_name {
        query = query.bind(table.to_lowercase());
    }
    if let Some(action) = &params.action_type {
        query = query.bind(action.to_uppercase());
    }
    let rows = query.bind(params.limit).fetch_all(conn).await?;

    if rows.is_empty() {
        return Ok(ToolOutput::Message(
            "No matching data modifications found.".to_string(),
        ));
    }

    let results: Vec<Value> = rows
        .into_iter()
        .map(|(timestamp, table, action, old_data, new_data, staff_name)| {
            json!({
                "timestamp": timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                "table": table,
                "action": action,
                "changed_by": staff_name,
                "before": old_data,
                "after": new_data,
            })
        })
        .collect();

    Ok(ToolOutput::Payload(Value::Array(results)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_shift_with_optional_filters() {
        let bare = data_modifications_sql(false, false);
        assert!(bare.contains("LIMIT $2"));
        assert!(!bare.contains("table_affected ="));

        let table_only = data_modifications_sql(true, false);
        assert!(table_only.contains("table_affected = $2"));
        assert!(table_only.contains("LIMIT $3"));

        let action_only = data_modifications_sql(false, true);
        assert!(action_only.contains("action_type = $2"));
        assert!(action_only.contains("LIMIT $3"));

        let both = data_modifications_sql(true, true);
        assert!(both.contains("table_affected = $2"));
        assert!(both.contains("action_type = $3"));
        assert!(both.contains("LIMIT $4"));
    }

    #[test]
    fn modification_query_is_manager_scoped() {
        assert!(data_modifications_sql(true, true).contains("manager_id = $1"));
    }
}
