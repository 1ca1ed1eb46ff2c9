//! HTTP gateway for CrawlPilot.
//!
//! Exposes the chat endpoint, tool listing, health check and session
//! inspection over REST. Built on Axum.

pub mod api;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use crawlpilot_agent::{AgentLoop, AgentSettings, ToolDispatcher};
use crawlpilot_config::AppConfig;
use crawlpilot_core::ToolRegistry;
use crawlpilot_session::ConversationStore;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub agent: Arc<AgentLoop>,
    pub store: Arc<ConversationStore>,
    pub registry: Arc<ToolRegistry>,
    pub max_body_bytes: usize,
}

impl GatewayState {
    /// State around an agent; the store and registry are the agent's own.
    pub fn new(agent: Arc<AgentLoop>) -> Self {
        Self {
            store: agent.store().clone(),
            registry: agent.dispatcher().registry().clone(),
            agent,
            max_body_bytes: 1024 * 1024,
        }
    }

    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the router with all gateway routes.
///
/// Layers applied:
/// - permissive CORS (the chat frontend is served from another origin)
/// - request body size limit
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.max_body_bytes;

    Router::new()
        .route("/health", get(api::health_handler))
        .route("/tools", get(api::tools_handler))
        .route("/chat", post(api::chat_handler))
        .route(
            "/sessions",
            get(api::list_sessions_handler).post(api::create_session_handler),
        )
        .route(
            "/sessions/{id}",
            get(api::get_session_handler).delete(api::delete_session_handler),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Assemble the agent described by the configuration.
pub fn build_agent(config: &AppConfig) -> Result<Arc<AgentLoop>, Box<dyn std::error::Error>> {
    let model = crawlpilot_providers::build_from_config(&config.model)?;
    let registry = Arc::new(crawlpilot_tools::default_registry(&config.tools)?);
    let dispatcher = Arc::new(ToolDispatcher::from_config(registry, &config.tools));
    let store = Arc::new(ConversationStore::new(config.gateway.max_sessions));

    let agent = AgentLoop::new(model, dispatcher, store)
        .with_settings(AgentSettings::from(&config.agent));
    Ok(Arc::new(agent))
}

/// Start the gateway HTTP server and serve until Ctrl-C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let agent = build_agent(&config)?;
    let state = Arc::new(
        GatewayState::new(agent).with_max_body_bytes(config.gateway.max_body_bytes),
    );
    info!(
        tools = state.registry.len(),
        model = %config.model.model,
        "Agent ready"
    );

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    info!("  GET    /health        - Health check");
    info!("  GET    /tools         - Available tools");
    info!("  POST   /chat          - Chat with the agent");
    info!("  GET    /sessions/{{id}} - Session history");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
