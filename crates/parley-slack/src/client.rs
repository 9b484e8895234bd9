// ABOUTME: Slack Web API client over reqwest: auth.test, chat.postMessage, users.info.
// ABOUTME: Also hosts the mention-cleanup helpers used before pipeline processing.

use crate::error::{Result, SlackError};
use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const DEFAULT_API_BASE: &str = "https://slack.com/api";

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<@([A-Z0-9]+)>").expect("static pattern compiles"))
}

/// Extract the user ids mentioned in a message, in order of appearance.
pub fn mention_ids(text: &str) -> Vec<String> {
    mention_pattern()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Remove a specific bot mention from the text.
pub fn strip_mention(text: &str, bot_user_id: &str) -> String {
    text.replace(&format!("<@{bot_user_id}>"), "").trim().to_string()
}

/// Whether the text mentions the given user.
pub fn is_mentioned(text: &str, bot_user_id: &str) -> bool {
    text.contains(&format!("<@{bot_user_id}>"))
}

/// Web API client for one bot token. The bot's own user id is resolved
/// lazily via auth.test and cached for the client's lifetime.
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    bot_user_id: RwLock<Option<String>>,
}

impl SlackClient {
    pub fn new(bot_token: impl Into<String>) -> Result<Self> {
        Self::with_api_base(bot_token, DEFAULT_API_BASE)
    }

    /// Construct against a non-default API base (proxies, tests).
    pub fn with_api_base(bot_token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            bot_user_id: RwLock::new(None),
        })
    }

    async fn api_call(&self, method: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(format!("{}/{}", self.api_base, method))
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await?;

        let payload: serde_json::Value = response.json().await?;
        if !payload["ok"].as_bool().unwrap_or(false) {
            let error = payload["error"].as_str().unwrap_or("unknown").to_string();
            return Err(SlackError::Api(format!("{method} failed: {error}")));
        }
        Ok(payload)
    }

    /// Authenticate and return the bot's own user id.
    pub async fn auth_test(&self) -> Result<String> {
        let payload = self.api_call("auth.test", json!({})).await?;
        payload["user_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SlackError::Api("auth.test returned no user_id".to_string()))
    }

    /// The bot's own user id, resolved once and cached. Returns None when
    /// authentication fails; mention-based filtering then degrades.
    pub async fn bot_user_id(&self) -> Option<String> {
        if let Some(cached) = self.bot_user_id.read().await.clone() {
            return Some(cached);
        }
        match self.auth_test().await {
            Ok(user_id) => {
                *self.bot_user_id.write().await = Some(user_id.clone());
                Some(user_id)
            }
            Err(e) => {
                warn!(error = %e, "auth.test failed; bot user id unavailable");
                None
            }
        }
    }

    /// Post a message to a channel, optionally in a thread. Returns the
    /// message timestamp.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String> {
        debug!(channel = %channel, thread_ts = ?thread_ts, "posting message");

        let mut body = json!({
            "channel": channel,
            "text": text,
        });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = json!(ts);
        }

        let payload = self.api_call("chat.postMessage", body).await?;
        Ok(payload["ts"].as_str().unwrap_or_default().to_string())
    }

    /// Look up a user's real name. Absent or failing lookups come back as
    /// None; callers fall back to a generic label.
    pub async fn user_real_name(&self, user_id: &str) -> Option<String> {
        // users.info takes query arguments, not a JSON body.
        let response = self
            .http
            .get(format!("{}/users.info?user={user_id}", self.api_base))
            .bearer_auth(&self.bot_token)
            .send()
            .await
            .ok()?;
        let payload: serde_json::Value = response.json().await.ok()?;
        if !payload["ok"].as_bool().unwrap_or(false) {
            return None;
        }
        payload["user"]["profile"]["real_name"]
            .as_str()
            .or_else(|| payload["user"]["real_name"].as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Replace raw `<@U...>` mentions with readable `@Real Name` labels,
    /// falling back to `@user` when the lookup fails.
    pub async fn clean_user_text(&self, text: &str) -> String {
        let mut clean = text.to_string();
        for user_id in mention_ids(text) {
            let label = match self.user_real_name(&user_id).await {
                Some(name) => format!("@{name}"),
                None => "@user".to_string(),
            };
            clean = clean.replace(&format!("<@{user_id}>"), &label);
        }
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mention_ids_in_order() {
        assert_eq!(
            mention_ids("<@U111> meet <@U222>, and <@U111> again"),
            vec!["U111".to_string(), "U222".to_string(), "U111".to_string()]
        );
    }

    #[test]
    fn test_mention_ids_ignores_malformed() {
        assert!(mention_ids("no mentions here, <@lowercase> either").is_empty());
    }

    #[test]
    fn test_strip_mention() {
        assert_eq!(strip_mention("<@UBOT> hello", "UBOT"), "hello");
        assert_eq!(strip_mention("hello", "UBOT"), "hello");
    }

    #[test]
    fn test_is_mentioned() {
        assert!(is_mentioned("<@UBOT> hi", "UBOT"));
        assert!(!is_mentioned("<@UOTHER> hi", "UBOT"));
    }

    #[tokio::test]
    async fn test_unreachable_api_degrades_gracefully() {
        // Connection refused: lookups return None, cleanup falls back.
        let client = SlackClient::with_api_base("xoxb-test", "http://127.0.0.1:1").unwrap();
        assert!(client.user_real_name("U1").await.is_none());
        assert!(client.bot_user_id().await.is_none());
        assert_eq!(client.clean_user_text("<@U1> hi").await, "@user hi");
    }
}
