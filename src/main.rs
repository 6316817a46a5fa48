//! RAG Gateway
//!
//! An HTTP gateway in front of an Ollama-compatible inference backend.
//! Augments chat requests with retrieved document context and relays the
//! generated response as a server-sent event stream.

use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use rag_gateway::abort::AbortRegistry;
use rag_gateway::api::{self, GatewayState};
use rag_gateway::backend::OllamaBackend;
use rag_gateway::config::Config;
use rag_gateway::relay::ChatRelay;
use rag_gateway::retrieval::HttpRetriever;
use rag_gateway::session::SessionStore;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

#[derive(Serialize)]
struct HelloResponse {
    message: String,
    status: String,
}

#[derive(Serialize)]
struct HealthResponse {
    service: String,
    version: String,
    status: String,
    timestamp: String,
}

/// Request ID middleware - adds unique ID to each request for tracing
async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env());
    info!("Configuration loaded: {:?}", config);

    // Shared HTTP client for backend and retriever calls. Only the connect
    // phase is bounded here; read timeouts are enforced per stream chunk so
    // long generations are never cut off mid-body.
    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(
            config.backend.connect_timeout_secs,
        ))
        .build()?;

    let backend = Arc::new(OllamaBackend::new(
        client.clone(),
        config.backend.url.clone(),
        config.backend.timeout_secs,
    ));
    let retriever = Arc::new(HttpRetriever::new(
        client,
        config.retriever.url.clone(),
        config.retriever.score_threshold,
        config.retriever.timeout_secs,
    ));

    let registry = AbortRegistry::new();
    let sessions = SessionStore::new();
    let relay = ChatRelay::new(
        backend,
        retriever,
        registry.clone(),
        sessions.clone(),
        config.clone(),
    );

    let state = GatewayState {
        relay,
        registry,
        sessions,
        config: config.clone(),
    };

    // Build our application with routes; the API-key layer only guards the
    // routes added before it, so health and liveness stay open
    let app = Router::new()
        .route("/api/chat", post(api::chat::chat))
        .route("/api/abort", post(api::session::abort))
        .route("/api/clear", post(api::session::clear))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            api::require_api_key,
        ))
        .route("/", get(hello_world))
        .route("/api/health", get(health_check))
        // Middleware (order matters - request_id should be first)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(CorsLayer::permissive()) // Allow CORS for development
        .with_state(state);

    // Bind to address from config
    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    info!("🚀 Gateway running on http://{}", addr);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Inference backend: {}", config.backend.url);
    info!("Retriever: {}", config.retriever.url);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Setup graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

async fn hello_world() -> Json<HelloResponse> {
    Json(HelloResponse {
        message: "Hello from RAG Gateway!".to_string(),
        status: "ok".to_string(),
    })
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "rag-gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
