//! EcomOps database operations agent core.
//!
//! Brokers ephemeral, credential-scoped connections to tenant databases,
//! exposes the audit/analytic tool catalogue over them, and drives the
//! schema-discovery -> SQL-synthesis -> execution pipeline. HTTP wiring,
//! auth and chat persistence live in the gateway crate.

pub mod broker;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod registry;
pub mod tools;

pub use broker::TenantCredentials;
pub use config::{AnomalyPolicy, CoreConfig};
pub use error::{ToolError, ToolOutput};
pub use llm::{Brain, LanguageModel};
pub use pipeline::{AgentRequest, Pipeline};
pub use registry::{Catalog, ToolDispatch, ToolInvocation};
