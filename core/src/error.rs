use serde_json::Value;
use thiserror::Error;

/// Failure taxonomy for the tool catalogue.
///
/// Each variant renders with the stable, human-readable tag that downstream
/// consumers (the language model, or a person reading the transcript) key
/// on to distinguish failure classes. Tools never let a driver-level error
/// escape: everything is converted into one of these before it crosses the
/// tool boundary.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Could not establish or keep a session with the tenant's credentials.
    #[error("Database Error: {0}")]
    Database(String),

    /// The database rejected a statement on a live connection. Phrased as
    /// feedback the synthesis loop feeds back into the next attempt.
    #[error("SQL Error: {0}. Check schema and try again.")]
    Sql(String),

    #[error("Audit Error: {0}")]
    Audit(String),

    #[error("Accountability Audit Error: {0}")]
    Accountability(String),

    #[error("Security Audit Error: {0}")]
    Security(String),

    #[error("Diagnostic Tool Error: {0}")]
    Diagnostic(String),

    #[error("Anomaly Detection Error: {0}")]
    Anomaly(String),

    #[error("Growth Analysis Error: {0}")]
    Growth(String),

    #[error("Modification Audit Error: {0}")]
    Modification(String),

    #[error("System Health Error: {0}")]
    Health(String),

    #[error("Performance Audit Error: {0}")]
    Performance(String),

    /// Bare-tag errors from the developer tools (inspect_schema,
    /// track_activity and friends).
    #[error("Error: {0}")]
    Schema(String),

    /// The invocation's keyword arguments did not match the tool's
    /// parameter schema.
    #[error("Error: invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },
}

/// Successful tool result, kept distinct from the error channel so a
/// caller can never mistake an error string for data.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Structured records, serialized to pretty JSON at the protocol edge.
    Payload(Value),
    /// A defined sentinel: "no records" statements, "Operation successful."
    Message(String),
}

/// Collapses a tool result into the single text channel the invocation
/// protocol carries.
pub fn render(result: Result<ToolOutput, ToolError>) -> String {
    match result {
        Ok(ToolOutput::Payload(value)) => {
            serde_json::to_string_pretty(&value).unwrap_or_else(|e| e.to_string())
        }
        Ok(ToolOutput::Message(text)) => text,
        Err(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_are_stable() {
        assert_eq!(
            ToolError::Database("refused".into()).to_string(),
            "Database Error: refused"
        );
        assert_eq!(
            ToolError::Audit("boom".into()).to_string(),
            "Audit Error: boom"
        );
        assert_eq!(
            ToolError::Accountability("boom".into()).to_string(),
            "Accountability Audit Error: boom"
        );
        assert_eq!(
            ToolError::Security("boom".into()).to_string(),
            "Security Audit Error: boom"
        );
        assert_eq!(
            ToolError::Diagnostic("boom".into()).to_string(),
            "Diagnostic Tool Error: boom"
        );
        assert_eq!(
            ToolError::Anomaly("boom".into()).to_string(),
            "Anomaly Detection Error: boom"
        );
        assert_eq!(
            ToolError::Growth("boom".into()).to_string(),
            "Growth Analysis Error: boom"
        );
        assert_eq!(
            ToolError::Modification("boom".into()).to_string(),
            "Modification Audit Error: boom"
        );
        assert_eq!(
            ToolError::Health("boom".into()).to_string(),
            "System Health Error: boom"
        );
        assert_eq!(
            ToolError::Performance("boom".into()).to_string(),
            "Performance Audit Error: boom"
        );
        assert_eq!(ToolError::Schema("boom".into()).to_string(), "Error: boom");
    }

    #[test]
    fn sql_error_keeps_retry_suffix() {
        let rendered = ToolError::Sql("column \"prices\" does not exist".into()).to_string();
        assert!(rendered.starts_with("SQL Error: "));
        assert!(rendered.ends_with(". Check schema and try again."));
    }

    #[test]
    fn render_keeps_sentinels_verbatim() {
        let out = render(Ok(ToolOutput::Message("Operation successful.".into())));
        assert_eq!(out, "Operation successful.");
    }

    #[test]
    fn render_pretty_prints_payloads() {
        let out = render(Ok(ToolOutput::Payload(json!({"rows": 1}))));
        assert!(out.contains("\"rows\": 1"));
    }
}
