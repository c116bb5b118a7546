use serde::{Deserialize, Serialize};

use ecomops_core::TenantCredentials;

/// What the operator's front end sends us for one conversational turn.
#[derive(Debug, Deserialize)]
pub struct ConverseRequest {
    pub prompt: String,
    pub conversation_id: Option<String>,
    pub manager_id: String,
    /// The tenant's own database credentials, supplied per request and
    /// never stored.
    pub db_config: TenantCredentials,
}

#[derive(Debug, Serialize)]
pub struct ConverseReply {
    pub conversation_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorReply {
    pub error: String,
}
