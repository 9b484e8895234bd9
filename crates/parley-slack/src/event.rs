// ABOUTME: Serde model of Slack Events API payloads and the inbound filtering rules.
// ABOUTME: Derives event ids for dedup and conversation ids for history scoping.

use parley_core::EventFilter;
use serde::Deserialize;

/// Top-level Events API envelope: either a one-time URL verification
/// challenge or an event callback wrapping the actual event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub event: Option<CallbackEvent>,
}

impl EventEnvelope {
    pub fn is_url_verification(&self) -> bool {
        self.kind == "url_verification"
    }

    pub fn is_event_callback(&self) -> bool {
        self.kind == "event_callback"
    }
}

/// One event delivered inside an `event_callback` envelope. Only the fields
/// the dispatch path reads are modeled; everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallbackEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub user: Option<String>,
    pub text: Option<String>,
    pub ts: Option<String>,
    pub thread_ts: Option<String>,
    pub channel: Option<String>,
    pub channel_type: Option<String>,
    pub subtype: Option<String>,
    pub bot_id: Option<String>,
    pub client_msg_id: Option<String>,
}

impl CallbackEvent {
    pub fn is_app_mention(&self) -> bool {
        self.kind == "app_mention"
    }

    pub fn is_message(&self) -> bool {
        self.kind == "message"
    }

    /// Dedup identifier derived from the client message id and delivery
    /// timestamp; either may be blank on some payloads.
    pub fn event_id(&self) -> String {
        EventFilter::event_id(
            self.client_msg_id.as_deref().unwrap_or(""),
            self.ts.as_deref().unwrap_or(""),
        )
    }

    /// Conversation identifier scoping this event's history:
    /// `{channel}:{thread_ts|ts}`.
    pub fn conversation_id(&self) -> Option<String> {
        let channel = self.channel.as_deref()?;
        let anchor = self.thread_ts.as_deref().or(self.ts.as_deref())?;
        Some(format!("{channel}:{anchor}"))
    }

    /// Why this event should not reach the pipeline, if any.
    ///
    /// Bot-originated and thread-reply events are ignored outright. Plain
    /// messages with a subtype (edits, deletions, joins) are ignored, as are
    /// messages that mention the bot: those arrive again as `app_mention`
    /// and would otherwise be processed twice.
    pub fn skip_reason(&self, bot_user_id: Option<&str>) -> Option<&'static str> {
        if self.bot_id.is_some() {
            return Some("bot-originated");
        }
        if self.thread_ts.is_some() {
            return Some("thread reply");
        }
        if self.is_message() {
            if self.subtype.is_some() {
                return Some("message subtype");
            }
            if let (Some(text), Some(bot_uid)) = (self.text.as_deref(), bot_user_id) {
                if text.contains(&format!("<@{bot_uid}>")) {
                    return Some("bot mention handled as app_mention");
                }
            }
        } else if !self.is_app_mention() {
            return Some("unhandled event type");
        }
        if self.channel.is_none() || self.user.is_none() || self.ts.is_none() {
            return Some("missing required fields");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_event() -> CallbackEvent {
        CallbackEvent {
            kind: "message".to_string(),
            user: Some("U123".to_string()),
            text: Some("hello there".to_string()),
            ts: Some("1700000000.000100".to_string()),
            channel: Some("C42".to_string()),
            client_msg_id: Some("m-1".to_string()),
            ..CallbackEvent::default()
        }
    }

    #[test]
    fn test_parse_url_verification() {
        let envelope: EventEnvelope = serde_json::from_str(
            r#"{"type": "url_verification", "challenge": "tok-123", "token": "ignored"}"#,
        )
        .unwrap();
        assert!(envelope.is_url_verification());
        assert_eq!(envelope.challenge.as_deref(), Some("tok-123"));
        assert!(envelope.event.is_none());
    }

    #[test]
    fn test_parse_event_callback() {
        let envelope: EventEnvelope = serde_json::from_str(
            r#"{
                "type": "event_callback",
                "event": {
                    "type": "app_mention",
                    "user": "U123",
                    "text": "<@UBOT> hi",
                    "ts": "1700000000.000100",
                    "channel": "C42",
                    "client_msg_id": "m-1"
                }
            }"#,
        )
        .unwrap();
        assert!(envelope.is_event_callback());
        let event = envelope.event.unwrap();
        assert!(event.is_app_mention());
        assert_eq!(event.event_id(), "m-1:1700000000.000100");
        assert_eq!(event.conversation_id().unwrap(), "C42:1700000000.000100");
    }

    #[test]
    fn test_conversation_id_prefers_thread_ts() {
        let mut event = message_event();
        event.thread_ts = Some("1699999999.000001".to_string());
        assert_eq!(event.conversation_id().unwrap(), "C42:1699999999.000001");
    }

    #[test]
    fn test_skip_bot_originated() {
        let mut event = message_event();
        event.bot_id = Some("B9".to_string());
        assert_eq!(event.skip_reason(None), Some("bot-originated"));
    }

    #[test]
    fn test_skip_thread_reply() {
        let mut event = message_event();
        event.thread_ts = Some("1.0".to_string());
        assert_eq!(event.skip_reason(None), Some("thread reply"));
    }

    #[test]
    fn test_skip_message_subtype() {
        let mut event = message_event();
        event.subtype = Some("message_changed".to_string());
        assert_eq!(event.skip_reason(None), Some("message subtype"));
    }

    #[test]
    fn test_skip_self_mention_in_plain_message() {
        let mut event = message_event();
        event.text = Some("<@UBOT> are you there?".to_string());
        assert!(event.skip_reason(Some("UBOT")).is_some());
        // Mentioning some other user is fine.
        event.text = Some("<@UOTHER> are you there?".to_string());
        assert!(event.skip_reason(Some("UBOT")).is_none());
    }

    #[test]
    fn test_mention_passes_filters() {
        let mut event = message_event();
        event.kind = "app_mention".to_string();
        event.text = Some("<@UBOT> hi".to_string());
        assert!(event.skip_reason(Some("UBOT")).is_none());
    }

    #[test]
    fn test_skip_unknown_event_type() {
        let mut event = message_event();
        event.kind = "reaction_added".to_string();
        assert_eq!(event.skip_reason(None), Some("unhandled event type"));
    }

    #[test]
    fn test_skip_missing_fields() {
        let mut event = message_event();
        event.channel = None;
        assert_eq!(event.skip_reason(None), Some("missing required fields"));
    }

    #[test]
    fn test_event_id_with_blank_parts() {
        let event = CallbackEvent {
            kind: "message".to_string(),
            ..CallbackEvent::default()
        };
        assert_eq!(event.event_id(), ":");
    }
}
