//! Connection broker: one short-lived, credential-scoped session per tool
//! call. Credentials are fully dynamic per tenant and per request, so there
//! is deliberately no pool and no cache keyed by tenant.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::{Connection, PgConnection};

use crate::error::ToolError;

/// Connection parameters for one tenant's independently hosted database.
/// Opaque to the core, never validated beyond presence, and never held
/// past the tool call they arrived with.
#[derive(Clone, Serialize, Deserialize)]
pub struct TenantCredentials {
    pub host: String,
    #[serde(deserialize_with = "de_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db_name: String,
}

// Keeps the password out of logs and error text.
impl fmt::Debug for TenantCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("db_name", &self.db_name)
            .finish()
    }
}

/// Front-end callers send the port as either a number or a string.
fn de_port<'de, D: Deserializer<'de>>(de: D) -> Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u16),
        Text(String),
    }

    match Raw::deserialize(de)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{s}'"))),
    }
}

/// Opens one session with the tenant's credentials, bounded by `timeout`.
///
/// Never retries: a connect failure immediately fails the invoking tool
/// with a Database Error. The caller owns the returned connection for the
/// duration of exactly one tool call.
pub async fn acquire(
    creds: &TenantCredentials,
    timeout: Duration,
) -> Result<PgConnection, ToolError> {
    let options = PgConnectOptions::new()
        .host(&creds.host)
        .port(creds.port)
        .username(&creds.user)
        .password(&creds.password)
        .database(&creds.db_name)
        .ssl_mode(PgSslMode::Require);

    match tokio::time::timeout(timeout, PgConnection::connect_with(&options)).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(ToolError::Database(e.to_string())),
        Err(_) => Err(ToolError::Database(format!(
            "connection to {}:{} timed out after {}s",
            creds.host,
            creds.port,
            timeout.as_secs()
        ))),
    }
}

/// Closes the session cleanly. Error paths in the tools rely on drop
/// semantics instead, so release is guaranteed by any exit path.
pub async fn release(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        tracing::debug!("tenant connection close returned: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_accepts_number_and_string() {
        let creds: TenantCredentials = serde_json::from_value(serde_json::json!({
            "host": "db.tenant.example",
            "port": 5432,
            "user": "ops",
            "password": "s3cret",
            "db_name": "shop"
        }))
        .unwrap();
        assert_eq!(creds.port, 5432);

        let creds: TenantCredentials = serde_json::from_value(serde_json::json!({
            "host": "db.tenant.example",
            "port": "6432",
            "user": "ops",
            "password": "s3cret",
            "db_name": "shop"
        }))
        .unwrap();
        assert_eq!(creds.port, 6432);
    }

    #[test]
    fn debug_redacts_password() {
        let creds = TenantCredentials {
            host: "h".into(),
            port: 5432,
            user: "u".into(),
            password: "hunter2".into(),
            db_name: "d".into(),
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
