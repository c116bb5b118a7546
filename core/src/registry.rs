//! Tool invocation protocol: a closed registry mapping tool names to
//! typed parameter schemas and handlers.
//!
//! Arguments cross the boundary as a keyword map and results come back as
//! a single text payload, so any caller (the pipeline, the gateway, or an
//! out-of-process shim) can drive the catalogue the same way. Dispatch is
//! over a closed enum rather than ad hoc strings: an unknown name or a
//! mistyped argument is rejected at validation time, never inside a
//! handler.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::broker::TenantCredentials;
use crate::config::CoreConfig;
use crate::error::{render, ToolError, ToolOutput};
use crate::tools;

/// One named tool call with keyword arguments. Tenant credentials ride in
/// the same map as the tool-specific parameters, exactly as a caller
/// supplies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// The closed catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    ActivitySummary,
    RecentActivity,
    UserActivity,
    DataModifications,
    ActiveConnections,
    SlowQueries,
    FailedOperations,
    PrivilegedActivity,
    DetectAnomalousActivity,
    GrowthTrends,
    InspectSchema,
    TrackActivity,
    ExecuteSql,
    CloneProductByName,
}

impl ToolName {
    pub const ALL: [ToolName; 14] = [
        ToolName::ActivitySummary,
        ToolName::RecentActivity,
        ToolName::UserActivity,
        ToolName::DataModifications,
        ToolName::ActiveConnections,
        ToolName::SlowQueries,
        ToolName::FailedOperations,
        ToolName::PrivilegedActivity,
        ToolName::DetectAnomalousActivity,
        ToolName::GrowthTrends,
        ToolName::InspectSchema,
        ToolName::TrackActivity,
        ToolName::ExecuteSql,
        ToolName::CloneProductByName,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ActivitySummary => "activity_summary",
            ToolName::RecentActivity => "recent_activity",
            ToolName::UserActivity => "user_activity",
            ToolName::DataModifications => "data_modifications",
            ToolName::ActiveConnections => "active_connections",
            ToolName::SlowQueries => "slow_queries",
            ToolName::FailedOperations => "failed_operations",
            ToolName::PrivilegedActivity => "privileged_activity",
            ToolName::DetectAnomalousActivity => "detect_anomalous_activity",
            ToolName::GrowthTrends => "growth_trends",
            ToolName::InspectSchema => "inspect_schema",
            ToolName::TrackActivity => "track_activity",
            ToolName::ExecuteSql => "execute_sql",
            ToolName::CloneProductByName => "clone_product_by_name",
        }
    }
}

impl FromStr for ToolName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

/// The seam between orchestration and the catalogue. The pipeline only
/// sees this trait, so tests can substitute a scripted dispatcher.
pub trait ToolDispatch: Send + Sync {
    fn invoke(&self, call: ToolInvocation) -> impl Future<Output = String> + Send;
}

impl<T: ToolDispatch + ?Sized> ToolDispatch for &T {
    fn invoke(&self, call: ToolInvocation) -> impl Future<Output = String> + Send {
        (**self).invoke(call)
    }
}

impl<T: ToolDispatch + ?Sized> ToolDispatch for Arc<T> {
    fn invoke(&self, call: ToolInvocation) -> impl Future<Output = String> + Send {
        (**self).invoke(call)
    }
}

/// In-process implementation of the protocol over the tool catalogue.
pub struct Catalog {
    config: CoreConfig,
}

impl Catalog {
    pub fn new(config: CoreConfig) -> Self {
        Self { config }
    }

    async fn dispatch(&self, call: ToolInvocation) -> Result<ToolOutput, ToolError> {
        let name = ToolName::from_str(&call.tool_name).map_err(|_| ToolError::InvalidArguments {
            tool: call.tool_name.clone(),
            message: "unknown tool".to_string(),
        })?;

        info!(tool = name.as_str(), "dispatching tool call");

        let args = Value::Object(call.arguments);
        let creds = credentials(name, &args)?;
        let cfg = &self.config;

        match name {
            ToolName::ActivitySummary => {
                tools::activity::activity_summary(&creds, params(name, &args)?, cfg).await
            }
            ToolName::RecentActivity => {
                tools::activity::recent_activity(&creds, params(name, &args)?, cfg).await
            }
            ToolName::UserActivity => {
                tools::accountability::user_activity(&creds, params(name, &args)?, cfg).await
            }
            ToolName::DataModifications => {
                tools::integrity::data_modifications(&creds, params(name, &args)?, cfg).await
            }
            ToolName::ActiveConnections => {
                tools::health::active_connections(&creds, params(name, &args)?, cfg).await
            }
            ToolName::SlowQueries => {
                tools::health::slow_queries(&creds, params(name, &args)?, cfg).await
            }
            ToolName::FailedOperations => {
                tools::health::failed_operations(&creds, params(name, &args)?, cfg).await
            }
            ToolName::PrivilegedActivity => {
                tools::security::privileged_activity(&creds, params(name, &args)?, cfg).await
            }
            ToolName::DetectAnomalousActivity => {
                tools::anomaly::detect_anomalous_activity(&creds, params(name, &args)?, cfg).await
            }
            ToolName::GrowthTrends => {
                tools::health::growth_trends(&creds, params(name, &args)?, cfg).await
            }
            ToolName::InspectSchema => {
                tools::schema::inspect_schema(&creds, params(name, &args)?, cfg).await
            }
            ToolName::TrackActivity => {
                tools::schema::track_activity(&creds, params(name, &args)?, cfg).await
            }
            ToolName::ExecuteSql => {
                tools::sql::execute_sql(&creds, params(name, &args)?, cfg).await
            }
            ToolName::CloneProductByName => {
                tools::sql::clone_product_by_name(&creds, params(name, &args)?, cfg).await
            }
        }
    }
}

impl ToolDispatch for Catalog {
    async fn invoke(&self, call: ToolInvocation) -> String {
        render(self.dispatch(call).await)
    }
}

fn credentials(name: ToolName, args: &Value) -> Result<TenantCredentials, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::InvalidArguments {
        tool: name.as_str().to_string(),
        message: format!("missing or malformed credentials: {e}"),
    })
}

fn params<T: DeserializeOwned>(name: ToolName, args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::InvalidArguments {
        tool: name.as_str().to_string(),
        message: e.to_string(),
    })
}

/// Function-calling surface for one tool: name, description and a JSON
/// schema for its keyword arguments.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

fn spec(
    name: ToolName,
    description: &'static str,
    extra_properties: Value,
    required: &[&str],
) -> ToolSpec {
    let mut properties = json!({
        "host": { "type": "string", "description": "Tenant database host" },
        "port": { "type": "integer", "description": "Tenant database port" },
        "user": { "type": "string", "description": "Tenant database user" },
        "password": { "type": "string", "description": "Tenant database password" },
        "db_name": { "type": "string", "description": "Tenant database name" }
    });
    if let (Value::Object(base), Value::Object(extra)) = (&mut properties, extra_properties) {
        base.extend(extra);
    }

    let mut required: Vec<&str> = required.to_vec();
    required.splice(0..0, ["host", "port", "user", "password", "db_name"]);

    ToolSpec {
        name: name.as_str(),
        description,
        parameters: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

/// The registry as seen by a language model or an API consumer.
pub fn specs() -> Vec<ToolSpec> {
    vec![
        spec(
            ToolName::ActivitySummary,
            "Manager tool: real-time summary of today's database activity (event counts and compliance flags) for one manager.",
            json!({
                "manager_id": { "type": "string", "description": "Manager scope for the audit feed" },
                "timeframe": { "type": "string", "description": "Reporting timeframe label (default 'daily')" }
            }),
            &["manager_id"],
        ),
        spec(
            ToolName::RecentActivity,
            "Incident investigation tool: detailed trace of recent system changes, newest first.",
            json!({
                "manager_id": { "type": "string" },
                "limit": { "type": "integer", "description": "Maximum rows (default 10)" },
                "category": { "type": "string", "description": "Optional filter, e.g. TRANSACTION, INVENTORY, SECURITY" }
            }),
            &["manager_id"],
        ),
        spec(
            ToolName::UserActivity,
            "Accountability tool: behavior trace for one staff member, matched by fuzzy name or exact id.",
            json!({
                "manager_id": { "type": "string" },
                "staff_identifier": { "type": "string", "description": "Staff name or staff id" },
                "days_back": { "type": "integer", "description": "Trailing window in days (default 7)" }
            }),
            &["manager_id", "staff_identifier"],
        ),
        spec(
            ToolName::DataModifications,
            "Data integrity tool: INSERT/UPDATE/DELETE trace with before/after payloads.",
            json!({
                "manager_id": { "type": "string" },
                "table_name": { "type": "string", "description": "Optional table filter" },
                "action_type": { "type": "string", "description": "Optional: INSERT, UPDATE or DELETE" },
                "limit": { "type": "integer", "description": "Maximum rows (default 20)" }
            }),
            &["manager_id"],
        ),
        spec(
            ToolName::ActiveConnections,
            "Live health tool: census of current sessions against the tenant database.",
            json!({
                "manager_id": { "type": "string", "description": "Accepted for parity; census is scoped by database" }
            }),
            &[],
        ),
        spec(
            ToolName::SlowQueries,
            "Performance tool: top cumulative-time statements from pg_stat_statements.",
            json!({
                "limit": { "type": "integer", "description": "Maximum statements (default 5)" }
            }),
            &[],
        ),
        spec(
            ToolName::FailedOperations,
            "Diagnostic tool: recent query and system failures, newest first.",
            json!({
                "manager_id": { "type": "string" },
                "limit": { "type": "integer", "description": "Maximum rows (default 10)" }
            }),
            &["manager_id"],
        ),
        spec(
            ToolName::PrivilegedActivity,
            "Security tool: admin-role and GRANT/REVOKE/ALTER/DROP activity in the trailing window.",
            json!({
                "manager_id": { "type": "string" },
                "timeframe_days": { "type": "integer", "description": "Trailing window in days (default 30)" }
            }),
            &["manager_id"],
        ),
        spec(
            ToolName::DetectAnomalousActivity,
            "Risk detection tool: flags volume spikes against the weekly baseline and after-hours actions.",
            json!({
                "manager_id": { "type": "string" }
            }),
            &["manager_id"],
        ),
        spec(
            ToolName::GrowthTrends,
            "Capacity planning tool: per-table storage footprint and utilization against the capacity limit.",
            json!({}),
            &[],
        ),
        spec(
            ToolName::InspectSchema,
            "Developer tool: lists all public tables and their columns.",
            json!({}),
            &[],
        ),
        spec(
            ToolName::TrackActivity,
            "Manager tool: the ten most recent orders.",
            json!({}),
            &[],
        ),
        spec(
            ToolName::ExecuteSql,
            "General tool: executes raw SQL. Returns clear errors if names are wrong.",
            json!({
                "sql_query": { "type": "string", "description": "The statement to execute" }
            }),
            &["sql_query"],
        ),
        spec(
            ToolName::CloneProductByName,
            "Developer tool: clones a product row under a new name, omitting the id column.",
            json!({
                "source_name": { "type": "string" },
                "new_name": { "type": "string" }
            }),
            &["source_name", "new_name"],
        ),
    ]
}
