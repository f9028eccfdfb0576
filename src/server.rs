//! Serving surface: MCP tools over streamable HTTP plus plain HTTP
//! endpoints for probes and scripted use.

use anyhow::Result;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{
    ErrorData as McpError, ServerHandler, model::*, schemars, tool, tool_handler, tool_router,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::QaError;
use crate::index::ScoredChunk;
use crate::qa::QaSystem;

/// Cap on per-request result counts to keep one query from dragging the
/// whole index through serialization.
const MAX_TOP_K: usize = 20;

#[derive(Debug, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
pub struct AskRequest {
    #[schemars(description = "The question to answer from the season document")]
    pub question: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
pub struct SearchRequest {
    #[schemars(description = "The search query")]
    pub query: String,
    #[schemars(description = "Number of chunks to return (default: configured top-k)")]
    pub top_k: Option<usize>,
}

#[derive(Clone)]
pub struct QaMcpServer {
    tool_router: ToolRouter<Self>,
    qa: Arc<QaSystem>,
}

#[tool_router]
impl QaMcpServer {
    pub fn new(qa: Arc<QaSystem>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            qa,
        }
    }

    #[tool(
        description = "Answer a question about the season's player data using retrieved document context"
    )]
    async fn ask_question(
        &self,
        Parameters(params): Parameters<AskRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.qa.answer(&params.question).await {
            Ok(answer) => {
                let mut sections = Vec::new();
                if !answer.warnings.is_empty() {
                    let listed = answer
                        .warnings
                        .iter()
                        .map(|w| format!("- {w}"))
                        .collect::<Vec<_>>()
                        .join("\n");
                    sections.push(format!("Data scope warnings:\n{listed}"));
                }
                sections.push(answer.text.clone());
                if answer.supporting_chunks > 0 {
                    sections.push(format!(
                        "Based on {} document chunks.",
                        answer.supporting_chunks
                    ));
                }

                Ok(CallToolResult::success(vec![Content::text(
                    sections.join("\n\n"),
                )]))
            }
            Err(e) => {
                tracing::error!(error = %e, "ask_question failed");
                Ok(CallToolResult::error(vec![Content::text(e.user_message())]))
            }
        }
    }

    #[tool(description = "Retrieve the document chunks most similar to a query")]
    async fn search_chunks(
        &self,
        Parameters(params): Parameters<SearchRequest>,
    ) -> Result<CallToolResult, McpError> {
        let retriever = self.qa.retriever();
        let result = match params.top_k {
            Some(k) => retriever.retrieve_top(&params.query, k.clamp(1, MAX_TOP_K)).await,
            None => retriever.retrieve(&params.query).await,
        };

        match result {
            Ok(results) if results.is_empty() => Ok(CallToolResult::success(vec![Content::text(
                "No matching chunks.".to_string(),
            )])),
            Ok(results) => {
                let formatted = results
                    .iter()
                    .enumerate()
                    .map(|(i, result)| {
                        format!(
                            "**Result {}** (Relevance: {:.3}) [chunk {}]\n{}",
                            i + 1,
                            result.score,
                            result.chunk.id,
                            result.chunk.text
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n---\n\n");

                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Found {} chunks for '{}':\n\n{}",
                    results.len(),
                    params.query,
                    formatted
                ))]))
            }
            Err(e) => {
                tracing::error!(error = %e, "search_chunks failed");
                Ok(CallToolResult::error(vec![Content::text(e.user_message())]))
            }
        }
    }

    #[tool(description = "Report index status of the QA service")]
    async fn index_status(&self) -> Result<CallToolResult, McpError> {
        let stats = self.qa.stats().await;
        let stats_text = serde_json::to_string_pretty(&stats)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "QA service status:\n{stats_text}"
        ))]))
    }
}

#[tool_handler]
impl ServerHandler for QaMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "fpl-rag-qa".to_string(),
                version: "0.1.0".to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Question answering over one season of FPL player data.".to_string(),
            ),
        }
    }
}

#[derive(Clone)]
struct AppState {
    qa: Arc<QaSystem>,
}

/// Liveness probe; 200 whenever the process is up.
async fn healthz() -> axum::http::StatusCode {
    axum::http::StatusCode::OK
}

/// Readiness probe; 200 once the index is built.
async fn readyz(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::http::StatusCode {
    if state.qa.retriever().is_ready().await {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    }
}

#[derive(Debug, serde::Deserialize)]
struct HttpAskRequest {
    question: String,
}

#[derive(Debug, serde::Serialize)]
struct HttpAskResponse {
    answer: String,
    warnings: Vec<String>,
    supporting_chunks: usize,
}

async fn http_ask(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Json(request): axum::extract::Json<HttpAskRequest>,
) -> Result<axum::Json<HttpAskResponse>, (axum::http::StatusCode, String)> {
    match state.qa.answer(&request.question).await {
        Ok(answer) => Ok(axum::Json(HttpAskResponse {
            answer: answer.text,
            warnings: answer.warnings,
            supporting_chunks: answer.supporting_chunks,
        })),
        Err(e) => {
            tracing::error!(error = %e, "ask failed");
            Err((error_status(&e), e.user_message()))
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct HttpSearchRequest {
    query: String,
    top_k: Option<usize>,
}

#[derive(Debug, serde::Serialize)]
struct HttpSearchResponse {
    results: Vec<ScoredChunk>,
}

async fn http_search(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Json(request): axum::extract::Json<HttpSearchRequest>,
) -> Result<axum::Json<HttpSearchResponse>, (axum::http::StatusCode, String)> {
    let retriever = state.qa.retriever();
    let result = match request.top_k {
        Some(k) => retriever.retrieve_top(&request.query, k.clamp(1, MAX_TOP_K)).await,
        None => retriever.retrieve(&request.query).await,
    };

    match result {
        Ok(results) => Ok(axum::Json(HttpSearchResponse { results })),
        Err(e) => {
            tracing::error!(error = %e, "search failed");
            Err((error_status(&e), e.user_message()))
        }
    }
}

async fn http_stats(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<serde_json::Value> {
    axum::Json(state.qa.stats().await)
}

fn error_status(err: &QaError) -> axum::http::StatusCode {
    use axum::http::StatusCode;

    match err {
        QaError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        QaError::Retrieval(_) | QaError::Generation(_) | QaError::EmbeddingService(_) => {
            StatusCode::BAD_GATEWAY
        }
        QaError::Configuration(_) | QaError::DocumentLoad(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn serve(qa: Arc<QaSystem>, bind_addr: &str) -> Result<()> {
    use rmcp::transport::streamable_http_server::{
        StreamableHttpService, session::local::LocalSessionManager,
    };

    let bind: SocketAddr = bind_addr.parse()?;
    let endpoint_path = std::env::var("MCP_HTTP_ENDPOINT").unwrap_or_else(|_| "/mcp".to_string());

    tracing::info!(
        "Starting MCP Streamable HTTP server on http://{}{}",
        bind,
        endpoint_path
    );
    tracing::info!("Health endpoints: /healthz (liveness), /readyz (readiness)");

    let service = StreamableHttpService::new(
        {
            let qa = qa.clone();
            move || Ok(QaMcpServer::new(qa.clone()))
        },
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let router = axum::Router::new()
        .route("/healthz", axum::routing::get(healthz))
        .route("/readyz", axum::routing::get(readyz))
        .route("/ask", axum::routing::post(http_ask))
        .route("/search", axum::routing::post(http_search))
        .route("/stats", axum::routing::get(http_stats))
        .route(&endpoint_path, axum::routing::any_service(service))
        .with_state(AppState { qa });

    tracing::info!("HTTP endpoints: POST /ask, POST /search, GET /stats");

    let tcp_listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
