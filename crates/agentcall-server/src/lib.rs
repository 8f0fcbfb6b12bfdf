//! agentcall server library logic.
//!
//! Exposes the call orchestrator to an assistant as four JSON tools, and
//! hosts the webhooks the telephony provider calls back into: the TwiML
//! that connects an answered call to a media stream, status callbacks, and
//! the Media Streams WebSocket itself.

pub mod api;
pub mod api_calls;
pub mod api_tools;
pub mod api_twilio;
pub mod config;
pub mod providers;

use agentcall_calls::CallManager;
use agentcall_voice::MediaStreamHub;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The call orchestrator.
    pub calls: Arc<CallManager>,
    /// Live Twilio media streams and status callbacks.
    pub media: MediaStreamHub,
    /// Public base URL, used to point Twilio at the media stream endpoint.
    pub public_url: String,
    /// Cancelled on shutdown; every call operation runs under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Builds the state, with providers, from configuration.
    pub fn from_config(config: &config::Config) -> Self {
        let media = MediaStreamHub::new();
        let providers = providers::Providers::from_config(config, &media);
        let calls = CallManager::new(
            providers.signaling,
            providers.synthesizer,
            providers.recognizer,
            providers::call_settings(config),
        );
        Self {
            calls: Arc::new(calls),
            media,
            public_url: config.server.public_url.clone(),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Maximum request body size (1 MiB). Tool bodies are short messages.
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let tool_routes = Router::new()
        .route(
            "/api/tools/initiate_call",
            post(api_tools::initiate_call_handler),
        )
        .route(
            "/api/tools/continue_call",
            post(api_tools::continue_call_handler),
        )
        .route(
            "/api/tools/speak_to_user",
            post(api_tools::speak_to_user_handler),
        )
        .route("/api/tools/end_call", post(api_tools::end_call_handler))
        .route("/api/calls", get(api_calls::list_calls_handler))
        .route("/api/calls/{call_id}", get(api_calls::get_call_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let twilio_routes = Router::new()
        .route("/voice", post(api_twilio::voice_handler))
        .route("/status", post(api_twilio::status_handler))
        .route("/media-stream", get(api_twilio::media_stream_handler));

    Router::new()
        .route("/health", get(health))
        .merge(tool_routes)
        .merge(twilio_routes)
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
