//! Language-model collaborator client.
//!
//! The collaborator is stateless from the core's perspective: the pipeline
//! makes two independent one-shot calls per full run (synthesize,
//! summarize) and re-supplies all context each time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use anyhow::{bail, Context, Result};
use tracing::info;

/// The two one-shot prompts the pipeline needs. Kept as a trait so the
/// pipeline can be driven by a scripted collaborator in tests.
pub trait LanguageModel: Send + Sync {
    /// Produces one raw SQL statement for the prompt given the schema
    /// context. `prior_error` carries the previous attempt's execution
    /// feedback when the pipeline is retrying.
    fn synthesize_sql(
        &self,
        schema_text: &str,
        prompt: &str,
        prior_error: Option<&str>,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Produces the formatted narrative over a raw result payload.
    fn summarize(
        &self,
        question: &str,
        payload: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

impl<T: LanguageModel + ?Sized> LanguageModel for &T {
    fn synthesize_sql(
        &self,
        schema_text: &str,
        prompt: &str,
        prior_error: Option<&str>,
    ) -> impl Future<Output = Result<String>> + Send {
        (**self).synthesize_sql(schema_text, prompt, prior_error)
    }

    fn summarize(
        &self,
        question: &str,
        payload: &str,
    ) -> impl Future<Output = Result<String>> + Send {
        (**self).summarize(question, payload)
    }
}

impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    fn synthesize_sql(
        &self,
        schema_text: &str,
        prompt: &str,
        prior_error: Option<&str>,
    ) -> impl Future<Output = Result<String>> + Send {
        (**self).synthesize_sql(schema_text, prompt, prior_error)
    }

    fn summarize(
        &self,
        question: &str,
        payload: &str,
    ) -> impl Future<Output = Result<String>> + Send {
        (**self).summarize(question, payload)
    }
}

pub struct Brain {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl Brain {
    pub fn new(timeout: Duration) -> Result<Self> {
        dotenvy::dotenv().ok();
        let api_key =
            std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set in .env")?;
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let config = OpenAIConfig::new().with_api_key(api_key);
        let client = Client::with_config(config);

        info!("Brain connected. Model: {}", model);
        Ok(Self {
            client,
            model,
            timeout,
        })
    }

    async fn one_shot(&self, prompt: String) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?,
            )])
            .build()?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .context("language model call timed out")??;

        match response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
        {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => bail!("language model returned no content"),
        }
    }
}

impl LanguageModel for Brain {
    async fn synthesize_sql(
        &self,
        schema_text: &str,
        prompt: &str,
        prior_error: Option<&str>,
    ) -> Result<String> {
        let mut instruction = format!(
            "You write PostgreSQL for an e-commerce operations database.\n\
             Schema:\n{schema_text}\n\n\
             Request: {prompt}\n\n"
        );
        if let Some(feedback) = prior_error {
            instruction.push_str(&format!(
                "The previous attempt failed with: {feedback}\n\
                 Produce a corrected statement.\n\n"
            ));
        }
        instruction.push_str(
            "Respond with exactly one raw SQL statement. \
             No commentary, no markdown fences.",
        );

        let raw = self.one_shot(instruction).await?;
        Ok(strip_fences(&raw))
    }

    async fn summarize(&self, question: &str, payload: &str) -> Result<String> {
        let instruction = format!(
            "You are an operations analyst reporting on a database query result.\n\
             Question: {question}\n\
             Raw result:\n{payload}\n\n\
             Format your answer as follows:\n\
             1. Open with exactly one status glyph: \u{1f7e2} (Healthy), \
             \u{1f7e1} (Warning) or \u{1f534} (Critical).\n\
             2. One analysis paragraph.\n\
             3. A markdown table of the data.\n\
             4. One concrete recommendation.\n\
             If the result set is empty, state \"No records found\" and do \
             not invent values."
        );

        self.one_shot(instruction).await
    }
}

/// Models are told not to fence their SQL, but they sometimes do anyway.
pub fn strip_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```SQL"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
    trimmed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_sql_fences() {
        assert_eq!(
            strip_fences("```sql\nSELECT * FROM orders;\n```"),
            "SELECT * FROM orders;"
        );
    }

    #[test]
    fn strips_bare_fences() {
        assert_eq!(strip_fences("```\nSELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn unfenced_statement_passes_through() {
        assert_eq!(strip_fences("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn uppercase_fence_label_is_handled() {
        assert_eq!(strip_fences("```SQL\nSELECT 2\n```"), "SELECT 2");
    }
}
