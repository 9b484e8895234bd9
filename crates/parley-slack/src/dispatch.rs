// ABOUTME: Webhook-side event orchestration: dedup, filtering, bridge submission.
// ABOUTME: The submitted task enriches the message, runs the pipeline, and replies.

use crate::client::SlackClient;
use crate::event::CallbackEvent;
use parley_core::error::{format_error_for_user, generate_error_id, CoreError};
use parley_core::render;
use parley_core::{AgentProfile, EventFilter, MessagePipeline, TaskBridge};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Everything needed to serve one bot's events: its Web API client and the
/// agent profile its replies are generated under.
#[derive(Clone)]
pub struct BotContext {
    pub bot_id: Option<String>,
    pub client: Arc<SlackClient>,
    pub profile: AgentProfile,
}

/// What happened to an inbound event.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Accepted and scheduled on the task bridge.
    Submitted,
    /// Filtered out before reaching the pipeline.
    Skipped(&'static str),
    /// The bridge refused the submission (shutting down).
    Rejected(String),
}

impl DispatchOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, DispatchOutcome::Submitted)
    }
}

/// Routes recognized events into the pipeline via the task bridge.
///
/// Webhook handlers must acknowledge deliveries quickly, so the pipeline
/// call (history load, generation, reply post) runs as a bridge task while
/// the HTTP response returns immediately.
pub struct EventDispatcher {
    filter: Arc<EventFilter>,
    bridge: Arc<TaskBridge>,
    pipeline: Arc<MessagePipeline>,
    reply_timeout: Duration,
}

impl EventDispatcher {
    pub fn new(
        filter: Arc<EventFilter>,
        bridge: Arc<TaskBridge>,
        pipeline: Arc<MessagePipeline>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            filter,
            bridge,
            pipeline,
            reply_timeout,
        }
    }

    /// Apply dedup and filtering, then submit the processing task.
    pub async fn dispatch(&self, ctx: &BotContext, event: CallbackEvent) -> DispatchOutcome {
        let event_id = event.event_id();
        if self.filter.check_and_record(&event_id) {
            info!(event_id = %event_id, "skipping already processed event");
            return DispatchOutcome::Skipped("duplicate delivery");
        }

        // Resolving our own user id costs an API call; only plain messages
        // that could mention us need it for filtering.
        let bot_user_id = match (event.is_message(), event.text.as_deref()) {
            (true, Some(text)) if text.contains("<@") => ctx.client.bot_user_id().await,
            _ => None,
        };
        if let Some(reason) = event.skip_reason(bot_user_id.as_deref()) {
            debug!(event_id = %event_id, reason, "ignoring event");
            return DispatchOutcome::Skipped(reason);
        }

        // skip_reason guarantees these are present.
        let (Some(channel), Some(user), Some(conversation_id)) = (
            event.channel.clone(),
            event.user.clone(),
            event.conversation_id(),
        ) else {
            return DispatchOutcome::Skipped("missing required fields");
        };
        let text = event.text.clone().unwrap_or_default();

        info!(
            event_id = %event_id,
            channel = %channel,
            kind = %event.kind,
            "dispatching event"
        );

        let client = Arc::clone(&ctx.client);
        let pipeline = Arc::clone(&self.pipeline);
        let profile = ctx.profile.clone();
        let reply_timeout = self.reply_timeout;

        let task = async move {
            let clean = client.clean_user_text(&text).await;
            // Prefix the speaker's name so multi-party history reads sensibly.
            let message = match client.user_real_name(&user).await {
                Some(name) => format!("{name}: {clean}"),
                None => clean,
            };

            let reply = match tokio::time::timeout(
                reply_timeout,
                pipeline.process(&message, &conversation_id, &profile),
            )
            .await
            {
                Ok(Ok(reply)) => render::format_for_slack(&reply),
                Ok(Err(e)) => {
                    let error_id = generate_error_id();
                    error!(
                        error = %e,
                        error_id = %error_id,
                        conversation_id = %conversation_id,
                        "pipeline failed"
                    );
                    format_error_for_user(&e, &error_id)
                }
                Err(_) => {
                    error!(conversation_id = %conversation_id, "reply generation timed out");
                    format_error_for_user(&CoreError::Timeout, &generate_error_id())
                }
            };

            if let Err(e) = client.post_message(&channel, &reply, None).await {
                error!(error = %e, channel = %channel, "failed to post reply");
            }
        };

        match self
            .bridge
            .submit(task, Some(&format!("slack-event {event_id}")))
        {
            Ok(_ticket) => DispatchOutcome::Submitted,
            Err(e) => {
                error!(error = %e, event_id = %event_id, "bridge refused event");
                DispatchOutcome::Rejected(e.to_string())
            }
        }
    }
}
