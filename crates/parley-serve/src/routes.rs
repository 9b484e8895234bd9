// ABOUTME: HTTP routes: direct chat API, Slack events webhook, health, banner.
// ABOUTME: Every failure path ends in a JSON error object with a non-2xx status.

use crate::error::ApiError;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use parley_core::error::CoreError;
use parley_slack::{signature, BotContext, DispatchOutcome, EventEnvelope};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/slack/events", post(slack_events))
        .route("/slack/events/{bot_id}", post(slack_events_for_bot))
        .with_state(state)
}

pub async fn index() -> &'static str {
    "Parley chat bot server is running!"
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub slack_configured: bool,
    pub model_configured: bool,
    pub pending_tasks: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        slack_configured: state.config.is_slack_configured(),
        model_configured: state.config.is_model_configured(),
        pending_tasks: state.bridge.pending_count(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub agent_id: Option<String>,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub agent_id: String,
    pub conversation_id: String,
}

/// Direct chat endpoint: validates the request, resolves the agent, and runs
/// the pipeline inline under the reply deadline.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let agent_id = request
        .agent_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("agent_id is required"))?;
    let message = request
        .message
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("message is required"))?;

    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous");
    let conversation_id = request
        .conversation_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("{agent_id}:{user_id}:demo_chat"));

    info!(
        agent_id = %agent_id,
        user_id = %user_id,
        conversation_id = %conversation_id,
        "chat request"
    );

    let profile = state
        .registry
        .get_agent(&agent_id)
        .await
        .map_err(|e| ApiError::from(CoreError::external("registry", e)))?
        .ok_or_else(|| {
            ApiError::from(CoreError::NotFound {
                resource: "agent",
                id: agent_id.clone(),
            })
        })?;

    let reply = tokio::time::timeout(
        state.reply_timeout(),
        state.pipeline.process(&message, &conversation_id, &profile),
    )
    .await
    .map_err(|_| ApiError::from(CoreError::Timeout))?
    .map_err(ApiError::from)?;

    Ok(Json(ChatResponse {
        response: reply,
        agent_id,
        conversation_id,
    }))
}

/// Events webhook for the statically configured default bot.
pub async fn slack_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    events_for_default(&state, &headers, &body).await
}

/// Events webhook for a registry bot, addressed by id.
pub async fn slack_events_for_bot(
    State(state): State<Arc<AppState>>,
    Path(bot_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    events_for_bot(&state, &bot_id, &headers, &body).await
}

fn parse_envelope(body: &[u8]) -> Result<EventEnvelope, (StatusCode, String)> {
    serde_json::from_slice::<EventEnvelope>(body).map_err(|e| {
        warn!(error = %e, "failed to parse webhook payload");
        (StatusCode::BAD_REQUEST, "invalid payload".to_string())
    })
}

pub(crate) async fn events_for_default(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> (StatusCode, String) {
    let envelope = match parse_envelope(body) {
        Ok(envelope) => envelope,
        Err(reply) => return reply,
    };

    // URL verification handshake: echo the challenge token verbatim.
    if envelope.is_url_verification() {
        return (StatusCode::OK, envelope.challenge.unwrap_or_default());
    }

    let Some(ctx) = state.default_bot.as_ref() else {
        debug!("default events route hit without a configured bot");
        return (StatusCode::NOT_FOUND, "Bot not found".to_string());
    };

    handle_envelope(
        state,
        ctx,
        state.config.slack.signing_secret.as_deref(),
        headers,
        body,
        envelope,
    )
    .await
}

pub(crate) async fn events_for_bot(
    state: &AppState,
    bot_id: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> (StatusCode, String) {
    let envelope = match parse_envelope(body) {
        Ok(envelope) => envelope,
        Err(reply) => return reply,
    };

    if envelope.is_url_verification() {
        return (StatusCode::OK, envelope.challenge.unwrap_or_default());
    }

    info!(bot_id = %bot_id, "webhook event for registry bot");

    let bot = match state.registry.get_bot(bot_id).await {
        Ok(Some(bot)) => bot,
        Ok(None) => return (StatusCode::NOT_FOUND, "Bot not found".to_string()),
        Err(e) => {
            error!(error = %e, bot_id = %bot_id, "bot lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "bot lookup failed".to_string(),
            );
        }
    };

    let client = match state.registry.client_for(&bot).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, bot_id = %bot_id, "failed to build bot client");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "bot unavailable".to_string(),
            );
        }
    };
    let profile = match state.registry.agent_for_bot(&bot).await {
        Ok(profile) => profile,
        Err(e) => {
            error!(error = %e, bot_id = %bot_id, "failed to resolve agent");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "agent unavailable".to_string(),
            );
        }
    };

    let ctx = BotContext {
        bot_id: Some(bot.id.clone()),
        client,
        profile,
    };

    handle_envelope(state, &ctx, Some(&bot.signing_secret), headers, body, envelope).await
}

/// Signature check plus dispatch. The HTTP response returns as soon as the
/// event is scheduled; the reply is posted from the bridge task.
async fn handle_envelope(
    state: &AppState,
    ctx: &BotContext,
    signing_secret: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
    envelope: EventEnvelope,
) -> (StatusCode, String) {
    if let Some(secret) = signing_secret {
        let timestamp = headers
            .get("x-slack-request-timestamp")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let provided = headers
            .get("x-slack-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        if let Err(e) = signature::verify(secret, timestamp, body, provided, now) {
            warn!(error = %e, "rejected webhook request");
            return (
                StatusCode::UNAUTHORIZED,
                "invalid request signature".to_string(),
            );
        }
    }

    if envelope.is_event_callback() {
        if let Some(event) = envelope.event {
            match state.dispatcher.dispatch(ctx, event).await {
                DispatchOutcome::Submitted => {}
                DispatchOutcome::Skipped(reason) => {
                    debug!(reason, "event not dispatched");
                }
                DispatchOutcome::Rejected(reason) => {
                    return (StatusCode::SERVICE_UNAVAILABLE, reason);
                }
            }
        }
    }

    (StatusCode::OK, String::new())
}
