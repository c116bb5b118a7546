//! Query synthesis and execution pipeline.
//!
//! Linear state machine per request: discover the schema, synthesize a
//! statement, execute it, summarize the payload. The execute stage's
//! "Check schema and try again" feedback is consumed by a bounded retry
//! loop that re-invokes synthesis with the error appended to context.
//! Nothing is cached between runs and a committed execute is never rolled
//! back by a later summarize failure.

use anyhow::{bail, Result};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::broker::TenantCredentials;
use crate::llm::LanguageModel;
use crate::registry::{ToolDispatch, ToolInvocation, ToolName};

/// What the external caller supplies for one conversational run.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub manager_id: String,
    pub credentials: TenantCredentials,
}

pub struct Pipeline<L, D> {
    llm: L,
    tools: D,
    max_attempts: usize,
}

impl<L: LanguageModel, D: ToolDispatch> Pipeline<L, D> {
    pub fn new(llm: L, tools: D, max_attempts: usize) -> Self {
        Self {
            llm,
            tools,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Runs the full discover -> synthesize -> execute -> summarize pass
    /// and returns the narrative answer.
    pub async fn run(&self, request: &AgentRequest) -> Result<String> {
        info!(manager = %request.manager_id, "pipeline run starting");

        // Discover. A broker-level failure means the tenant database is
        // unreachable and nothing downstream can work; a mere query
        // failure is folded into the context as text and synthesis
        // proceeds against it.
        let schema_text = self
            .tools
            .invoke(ToolInvocation::new(
                ToolName::InspectSchema.as_str(),
                credential_args(&request.credentials),
            ))
            .await;

        if schema_text.starts_with("Database Error:") {
            bail!("schema discovery failed: {schema_text}");
        }

        // Synthesize and execute, feeding execution errors back into the
        // next synthesis attempt, capped.
        let mut prior_error: Option<String> = None;
        let mut result = String::new();
        for attempt in 1..=self.max_attempts {
            let statement = self
                .llm
                .synthesize_sql(&schema_text, &request.prompt, prior_error.as_deref())
                .await?;

            info!(attempt, %statement, "executing synthesized statement");

            let mut args = credential_args(&request.credentials);
            args.insert("sql_query".to_string(), Value::String(statement));
            result = self
                .tools
                .invoke(ToolInvocation::new(ToolName::ExecuteSql.as_str(), args))
                .await;

            if result.starts_with("SQL Error:") && attempt < self.max_attempts {
                warn!(attempt, "execution failed, re-synthesizing with feedback");
                prior_error = Some(result.clone());
                continue;
            }
            break;
        }

        // Summarize. A failure here is a generic pipeline failure; the
        // executed statement stays committed either way.
        self.llm.summarize(&request.prompt, &result).await
    }
}

fn credential_args(creds: &TenantCredentials) -> Map<String, Value> {
    match serde_json::to_value(creds) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedModel {
        statements: Mutex<VecDeque<String>>,
        synthesis_contexts: Mutex<Vec<Option<String>>>,
        summary: Option<String>,
    }

    impl ScriptedModel {
        fn new(statements: &[&str], summary: Option<&str>) -> Self {
            Self {
                statements: Mutex::new(statements.iter().map(|s| s.to_string()).collect()),
                synthesis_contexts: Mutex::new(Vec::new()),
                summary: summary.map(|s| s.to_string()),
            }
        }
    }

    impl LanguageModel for ScriptedModel {
        async fn synthesize_sql(
            &self,
            _schema: &str,
            _prompt: &str,
            prior_error: Option<&str>,
        ) -> Result<String> {
            self.synthesis_contexts
                .lock()
                .unwrap()
                .push(prior_error.map(|s| s.to_string()));
            self.statements
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow!("script exhausted"))
        }

        async fn summarize(&self, _question: &str, payload: &str) -> Result<String> {
            match &self.summary {
                Some(text) => Ok(text.clone()),
                None => Ok(format!("\u{1f7e2} summary of: {payload}")),
            }
        }
    }

    struct ScriptedDispatch {
        replies: Mutex<VecDeque<String>>,
        calls: Mutex<Vec<ToolInvocation>>,
    }

    impl ScriptedDispatch {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_names(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|c| c.tool_name.clone())
                .collect()
        }
    }

    impl ToolDispatch for ScriptedDispatch {
        async fn invoke(&self, call: ToolInvocation) -> String {
            self.calls.lock().unwrap().push(call);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "script exhausted".to_string())
        }
    }

    fn request() -> AgentRequest {
        AgentRequest {
            prompt: "how many orders today?".to_string(),
            manager_id: "mgr-1".to_string(),
            credentials: TenantCredentials {
                host: "db.tenant.example".to_string(),
                port: 5432,
                user: "ops".to_string(),
                password: "s3cret".to_string(),
                db_name: "shop".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn happy_path_discovers_executes_and_summarizes() {
        let llm = ScriptedModel::new(&["SELECT count(*) FROM orders"], Some("🟢 all good"));
        let tools = ScriptedDispatch::new(&[
            r#"[{"table_name":"orders","column_name":"id","data_type":"integer"}]"#,
            r#"[{"count": 42}]"#,
        ]);
        let pipeline = Pipeline::new(&llm, &tools, 3);

        let answer = pipeline.run(&request()).await.unwrap();
        assert_eq!(answer, "🟢 all good");
        assert_eq!(tools.call_names(), vec!["inspect_schema", "execute_sql"]);

        // First synthesis carries no failure feedback.
        assert_eq!(*llm.synthesis_contexts.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn broker_level_discovery_failure_aborts_before_synthesis() {
        let llm = ScriptedModel::new(&["SELECT 1"], None);
        let tools = ScriptedDispatch::new(&["Database Error: connection refused"]);
        let pipeline = Pipeline::new(&llm, &tools, 3);

        let err = pipeline.run(&request()).await.unwrap_err();
        assert!(err.to_string().contains("schema discovery failed"));
        assert!(llm.synthesis_contexts.lock().unwrap().is_empty());
        assert_eq!(tools.call_names(), vec!["inspect_schema"]);
    }

    #[tokio::test]
    async fn schema_query_error_is_folded_into_context_and_run_proceeds() {
        let llm = ScriptedModel::new(&["SELECT 1"], Some("done"));
        let tools = ScriptedDispatch::new(&[
            "Error: permission denied for information_schema",
            "Operation successful.",
        ]);
        let pipeline = Pipeline::new(&llm, &tools, 3);

        let answer = pipeline.run(&request()).await.unwrap();
        assert_eq!(answer, "done");
        assert_eq!(tools.call_names(), vec!["inspect_schema", "execute_sql"]);
    }

    #[tokio::test]
    async fn sql_error_triggers_bounded_resynthesis_with_feedback() {
        let llm = ScriptedModel::new(
            &["SELECT pricee FROM products", "SELECT price FROM products"],
            Some("fixed"),
        );
        let tools = ScriptedDispatch::new(&[
            "[]",
            "SQL Error: column \"pricee\" does not exist. Check schema and try again.",
            r#"[{"price": 9.5}]"#,
        ]);
        let pipeline = Pipeline::new(&llm, &tools, 3);

        let answer = pipeline.run(&request()).await.unwrap();
        assert_eq!(answer, "fixed");

        let contexts = llm.synthesis_contexts.lock().unwrap();
        assert_eq!(contexts.len(), 2);
        assert!(contexts[0].is_none());
        assert!(contexts[1].as_deref().unwrap().starts_with("SQL Error:"));
    }

    #[tokio::test]
    async fn retries_stop_at_the_attempt_cap() {
        let llm = ScriptedModel::new(&["SELECT 1", "SELECT 2"], None);
        let tools = ScriptedDispatch::new(&[
            "[]",
            "SQL Error: nope. Check schema and try again.",
            "SQL Error: still nope. Check schema and try again.",
        ]);
        let pipeline = Pipeline::new(&llm, &tools, 2);

        // The second failure is final: it is summarized, not retried.
        let answer = pipeline.run(&request()).await.unwrap();
        assert!(answer.contains("still nope"));
        assert_eq!(llm.synthesis_contexts.lock().unwrap().len(), 2);
        assert_eq!(
            tools.call_names(),
            vec!["inspect_schema", "execute_sql", "execute_sql"]
        );
    }

    #[tokio::test]
    async fn execute_arguments_carry_credentials_and_statement() {
        let llm = ScriptedModel::new(&["SELECT 1"], Some("ok"));
        let tools = ScriptedDispatch::new(&["[]", "Operation successful."]);
        let pipeline = Pipeline::new(&llm, &tools, 1);

        pipeline.run(&request()).await.unwrap();

        let calls = tools.calls.lock().unwrap();
        let execute = &calls[1];
        assert_eq!(execute.arguments["sql_query"], "SELECT 1");
        assert_eq!(execute.arguments["host"], "db.tenant.example");
        assert_eq!(execute.arguments["db_name"], "shop");
        assert_eq!(execute.arguments["password"], "s3cret");
    }
}
