//! The tool catalogue: named, independently invocable audit and analytic
//! operations over one tenant database.
//!
//! Shared contract: acquire a connection through the broker, run
//! parameterized queries, return an explicit "no records" sentinel on an
//! empty result, convert every failure into the tool family's tagged
//! error, and always release the connection. Every query that reads a
//! tenant-owned audit table filters by manager_id; dropping that filter
//! would leak rows across tenants.

pub mod accountability;
pub mod activity;
pub mod anomaly;
pub mod health;
pub mod integrity;
pub mod rows;
pub mod schema;
pub mod security;
pub mod sql;

pub use anomaly::{AlertKind, AnomalyAlert, Severity};
pub use schema::SchemaColumn;
