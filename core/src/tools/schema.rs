//! Developer tools: schema introspection and the fixed recent-orders probe.

use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use crate::broker::{self, TenantCredentials};
use crate::config::CoreConfig;
use crate::error::{ToolError, ToolOutput};

use super::rows::rows_to_json;

/// One entry of the tenant's visible catalogue. The snapshot is transient:
/// regenerated on every call, never cached across pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct SchemaColumn {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
}

#[derive(Debug, Deserialize)]
pub struct InspectSchemaParams {}

/// Lists every column of every table in the tenant's public namespace.
/// A failed introspection query folds into a textual `Error:` payload the
/// pipeline forwards as context; only a broker-level failure keeps the
/// Database tag, which is what tells the pipeline to abort instead.
pub async fn inspect_schema(
    creds: &TenantCredentials,
    _params: InspectSchemaParams,
    cfg: &CoreConfig,
) -> Result<ToolOutput, ToolError> {
    let mut conn = broker::acquire(creds, cfg.db_timeout).await?;
    let out = snapshot(&mut conn).await;
    broker::release(conn).await;
    out.map_err(|e| ToolError::Schema(e.to_string()))
}

async fn snapshot(conn: &mut PgConnection) -> Result<ToolOutput, sqlx::Error> {
    let columns: Vec<SchemaColumn> = sqlx::query_as(
        r#"
        SELECT table_name, column_name, data_type
        FROM information_schema.columns
        WHERE table_schema = 'public'
        "#,
    )
    .fetch_all(conn)
    .await?;

    if columns.is_empty() {
        return Ok(ToolOutput::Message(
            "No tables found in the public schema.".to_string(),
        ));
    }

    Ok(ToolOutput::Payload(serde_json::to_value(columns).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
pub struct TrackActivityParams {}

/// Latest ten rows of the conventional orders table.
pub async fn track_activity(
    creds: &TenantCredentials,
    _params: TrackActivityParams,
    cfg: &CoreConfig,
) -> Result<ToolOutput, ToolError> {
    let mut conn = broker::acquire(creds, cfg.db_timeout).await?;
    let out = latest_orders(&mut conn).await;
    broker::release(conn).await;
    out.map_err(|e| ToolError::Schema(e.to_string()))
}

async fn latest_orders(conn: &mut PgConnection) -> Result<ToolOutput, sqlx::Error> {
    let rows = sqlx::query("SELECT * FROM orders ORDER BY created_at DESC LIMIT 10")
        .fetch_all(conn)
        .await?;

    if rows.is_empty() {
        return Ok(ToolOutput::Message("No recent orders found.".to_string()));
    }

    Ok(ToolOutput::Payload(rows_to_json(&rows)))
}
