mod api;
mod history;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::api::{ConverseRequest, ConverseReply, ErrorReply};
use crate::history::HistoryStore;
use ecomops_core::registry::{specs, ToolSpec};
use ecomops_core::{AgentRequest, Brain, Catalog, CoreConfig, Pipeline, ToolDispatch, ToolInvocation};

#[derive(Clone)]
struct AppState {
    brain: Arc<Brain>,
    catalog: Arc<Catalog>,
    history: HistoryStore,
    config: Arc<CoreConfig>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .compact()
        .init();

    info!("EcomOps Gateway initializing...");

    let config = Arc::new(CoreConfig::from_env());

    let brain = match Brain::new(config.llm_timeout) {
        Ok(b) => Arc::new(b),
        Err(e) => panic!("CRITICAL: failed to initialize language model client: {e}"),
    };

    let catalog = Arc::new(Catalog::new((*config).clone()));
    info!("Tool catalogue ready ({} tools).", specs().len());

    let history_url = std::env::var("ECOMOPS_HISTORY_DB")
        .unwrap_or_else(|_| "sqlite://ecomops-history.db?mode=rwc".to_string());
    let history = HistoryStore::open(&history_url)
        .await
        .expect("failed to open conversation history store");

    let state = AppState {
        brain,
        catalog,
        history,
        config,
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/converse", post(converse))
        .route("/api/v1/tools", get(list_tools).post(invoke_tool))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = TcpListener::bind("0.0.0.0:3000").await.unwrap();
    info!("Gateway listening on port 3000...");

    axum::serve(listener, app).await.unwrap();
}

async fn health_check() -> &'static str {
    "EcomOps Gateway: Operational"
}

/// One conversational turn: run the full pipeline against the tenant's
/// database and append both sides to the history sink.
async fn converse(
    State(state): State<AppState>,
    Json(payload): Json<ConverseRequest>,
) -> Result<Json<ConverseReply>, (StatusCode, Json<ErrorReply>)> {
    let conversation_id = payload
        .conversation_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(manager = %payload.manager_id, conversation = %conversation_id, "converse request");

    state
        .history
        .append(&conversation_id, "user", &payload.prompt)
        .await;

    let request = AgentRequest {
        prompt: payload.prompt,
        manager_id: payload.manager_id,
        credentials: payload.db_config,
    };

    let pipeline = Pipeline::new(
        Arc::clone(&state.brain),
        Arc::clone(&state.catalog),
        state.config.max_synthesis_attempts,
    );

    match pipeline.run(&request).await {
        Ok(message) => {
            state
                .history
                .append(&conversation_id, "assistant", &message)
                .await;
            Ok(Json(ConverseReply {
                conversation_id,
                message,
            }))
        }
        Err(e) => {
            error!("pipeline failure: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorReply {
                    error: "EcomOps agent is currently unavailable.".to_string(),
                }),
            ))
        }
    }
}

/// Direct tool invocation, bypassing synthesis. The reply is the
/// protocol's text payload: serialized records, a sentinel, or a tagged
/// error string.
async fn invoke_tool(State(state): State<AppState>, Json(call): Json<ToolInvocation>) -> String {
    state.catalog.invoke(call).await
}

async fn list_tools() -> Json<Vec<ToolSpec>> {
    Json(specs())
}
