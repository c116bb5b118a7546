//! Arbitrary statement execution and the product-clone helper.

use serde::Deserialize;
use sqlx::{Connection, PgConnection, Row};

use crate::broker::{self, TenantCredentials};
use crate::config::CoreConfig;
use crate::error::{ToolError, ToolOutput};

use super::rows::rows_to_json;

#[derive(Debug, Deserialize)]
pub struct ExecuteSqlParams {
    pub sql_query: String,
}

/// Runs one statement exactly as supplied. A result set is serialized; a
/// row-less statement commits and returns the fixed success sentinel. The
/// error text is phrased so the synthesis loop can correct itself.
pub async fn execute_sql(
    creds: &TenantCredentials,
    params: ExecuteSqlParams,
    cfg: &CoreConfig,
) -> Result<ToolOutput, ToolError> {
    let mut conn = broker::acquire(creds, cfg.db_timeout).await?;
    let out = run_statement(&mut conn, &params.sql_query).await;
    broker::release(conn).await;
    out
}

async fn run_statement(conn: &mut PgConnection, sql: &str) -> Result<ToolOutput, ToolError> {
    let rows = sqlx::query(sql)
        .fetch_all(conn)
        .await
        .map_err(|e| ToolError::Sql(e.to_string()))?;

    if rows.is_empty() {
        return Ok(ToolOutput::Message("Operation successful.".to_string()));
    }

    Ok(ToolOutput::Payload(rows_to_json(&rows)))
}

#[derive(Debug, Deserialize)]
pub struct CloneProductParams {
    pub source_name: String,
    pub new_name: String,
}

/// Duplicates a catalogue row under a new name, omitting the identity
/// column so the copy gets a fresh generated id. A missing source aborts
/// before anything is written.
pub async fn clone_product_by_name(
    creds: &TenantCredentials,
    params: CloneProductParams,
    cfg: &CoreConfig,
) -> Result<ToolOutput, ToolError> {
    let mut conn = broker::acquire(creds, cfg.db_timeout).await?;
    let out = clone_product(&mut conn, &params).await;
    broker::release(conn).await;
    out.map_err(|e| ToolError::Database(e.to_string()))
}

async fn clone_product(
    conn: &mut PgConnection,
    params: &CloneProductParams,
) -> Result<ToolOutput, sqlx::Error> {
    let mut tx = conn.begin().await?;

    let source: Option<(f64, i32)> =
        sqlx::query_as("SELECT price::float8, stock::int4 FROM products WHERE name = $1 LIMIT 1")
            .bind(&params.source_name)
            .fetch_optional(&mut *tx)
            .await?;

    let Some((price, stock)) = source else {
        tx.rollback().await?;
        return Ok(ToolOutput::Message(format!(
            "Error: Source product '{}' not found.",
            params.source_name
        )));
    };

    let new_id: i32 =
        sqlx::query("INSERT INTO products (name, price, stock) VALUES ($1, $2, $3) RETURNING id")
            .bind(&params.new_name)
            .bind(price)
            .bind(stock)
            .fetch_one(&mut *tx)
            .await?
            .try_get("id")?;

    tx.commit().await?;

    Ok(ToolOutput::Message(format!(
        "Successfully added '{}' (ID: {new_id}) with Price: {price} and Stock: {stock} (copied from '{}').",
        params.new_name, params.source_name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execute_sql_requires_a_statement() {
        let result: Result<ExecuteSqlParams, _> = serde_json::from_value(json!({}));
        assert!(result.is_err());

        let params: ExecuteSqlParams =
            serde_json::from_value(json!({ "sql_query": "SELECT 1" })).unwrap();
        assert_eq!(params.sql_query, "SELECT 1");
    }

    #[test]
    fn clone_requires_both_names() {
        let result: Result<CloneProductParams, _> =
            serde_json::from_value(json!({ "source_name": "Widget" }));
        assert!(result.is_err());
    }
}
