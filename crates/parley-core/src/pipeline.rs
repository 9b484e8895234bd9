// ABOUTME: Message pipeline: history load, analysis, response generation, history save.
// ABOUTME: Generators: rule-based reply table and an OpenAI-compatible API client.

use crate::analysis::{self, Category, MessageAnalysis, Sentiment};
use crate::config::{Config, GeneratorKind, ModelConfig};
use crate::error::{CoreError, Result};
use crate::render;
use crate::store::{AgentProfile, ChatMessage, ThreadStore};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Produces one reply from a message, its conversation history, and the
/// analysis report, under an externally supplied agent profile.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(
        &self,
        message: &str,
        history: &[ChatMessage],
        analysis: &MessageAnalysis,
        profile: &AgentProfile,
    ) -> Result<String>;
}

/// Stateless pipeline tying the persistence adapter and the generator
/// together. Holds no state between invocations beyond what is threaded
/// through the store.
pub struct MessagePipeline {
    store: Arc<dyn ThreadStore>,
    generator: Arc<dyn ResponseGenerator>,
}

impl MessagePipeline {
    pub fn new(store: Arc<dyn ThreadStore>, generator: Arc<dyn ResponseGenerator>) -> Self {
        Self { store, generator }
    }

    /// Process one message: load prior history (a failed load degrades to an
    /// empty history), analyze, generate, persist the updated history (a
    /// failed save is logged and swallowed), and return the reply.
    pub async fn process(
        &self,
        text: &str,
        conversation_id: &str,
        profile: &AgentProfile,
    ) -> Result<String> {
        let mut history = match self.store.load(conversation_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(
                    error = %e,
                    conversation_id = %conversation_id,
                    "failed to load history, continuing with empty history"
                );
                Vec::new()
            }
        };

        let analysis = analysis::analyze(text);
        debug!(
            conversation_id = %conversation_id,
            category = ?analysis.category,
            sentiment = ?analysis.sentiment.sentiment,
            language = analysis.language.code,
            history_len = history.len(),
            "analyzed message"
        );

        let reply = self
            .generator
            .generate(text, &history, &analysis, profile)
            .await?;
        // Canned replies get translated when the message language is covered.
        let reply = render::translate(&reply, analysis.language.code);

        history.push(ChatMessage::user(text));
        history.push(ChatMessage::assistant(reply.clone()));
        if let Err(e) = self.store.save(conversation_id, &history).await {
            warn!(
                error = %e,
                conversation_id = %conversation_id,
                "failed to save history"
            );
        }

        Ok(reply)
    }
}

/// Build the generator named by the configuration.
pub fn build_generator(config: &Config) -> Result<Arc<dyn ResponseGenerator>> {
    match config.pipeline.generator {
        GeneratorKind::Rules => Ok(Arc::new(RuleBasedGenerator::new(Duration::from_secs(
            config.pipeline.reply_timeout_secs,
        )))),
        GeneratorKind::Api => Ok(Arc::new(ApiGenerator::new(&config.model)?)),
    }
}

/// Reply composition from the category/keyword table. The compose step is
/// synchronous, so it is delegated to the blocking pool under a bounded
/// timeout rather than run on the caller's scheduler.
pub struct RuleBasedGenerator {
    compose_timeout: Duration,
}

impl RuleBasedGenerator {
    pub fn new(compose_timeout: Duration) -> Self {
        Self { compose_timeout }
    }
}

#[async_trait]
impl ResponseGenerator for RuleBasedGenerator {
    async fn generate(
        &self,
        message: &str,
        history: &[ChatMessage],
        analysis: &MessageAnalysis,
        _profile: &AgentProfile,
    ) -> Result<String> {
        let _ = message; // the reply table works off the analysis report
        let has_history = !history.is_empty();
        let analysis = analysis.clone();

        let compose =
            tokio::task::spawn_blocking(move || compose_reply(has_history, &analysis));
        match tokio::time::timeout(self.compose_timeout, compose).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(CoreError::Internal(format!("compose task failed: {e}"))),
            Err(_) => Err(CoreError::Timeout),
        }
    }
}

fn compose_reply(has_history: bool, analysis: &MessageAnalysis) -> String {
    let keywords = &analysis.keywords;
    let has_keyword =
        |targets: &[&str]| keywords.iter().any(|k| targets.contains(&k.as_str()));

    match analysis.category {
        Category::Greeting => {
            if has_history {
                "Hello again! How can I help you today?".to_string()
            } else {
                "Hello! Welcome to our chat service. How can I assist you today?".to_string()
            }
        }
        Category::Farewell => "Thank you for chatting with us today. Have a great day!".to_string(),
        Category::Gratitude => {
            "You're welcome! Is there anything else I can help you with?".to_string()
        }
        Category::Apology => "No problem at all. How can I assist you today?".to_string(),
        Category::Question => {
            if has_keyword(&["hours", "open", "schedule", "time"]) {
                "We're open Monday through Friday from 9am to 5pm.".to_string()
            } else if has_keyword(&["location", "address", "where"]) {
                "Our main office is located at 123 Main Street, Suite 200, Anytown, USA."
                    .to_string()
            } else if has_keyword(&["price", "cost", "pricing", "fee"]) {
                "Our pricing varies based on the specific service you're interested in. Could you please specify which service you'd like to know about?".to_string()
            } else {
                "That's a great question. Could you provide a bit more detail so I can give you a more accurate answer?".to_string()
            }
        }
        Category::Request => {
            if has_keyword(&["help", "assist", "support"]) {
                "I'd be happy to help you. What specifically do you need assistance with?"
                    .to_string()
            } else {
                "I'll help you with that request. Could you provide a bit more information so I can assist you better?".to_string()
            }
        }
        Category::Complaint => {
            if analysis.sentiment.sentiment == Sentiment::Negative {
                "I'm very sorry to hear about your experience. I'll do my best to help resolve this issue for you. Could you please provide more details about what happened?".to_string()
            } else {
                "I understand your concern. Let me see how I can help address this issue."
                    .to_string()
            }
        }
        Category::Feedback => {
            "Thank you for your feedback! We're always looking to improve our services."
                .to_string()
        }
        Category::Statement => match analysis.sentiment.sentiment {
            Sentiment::Positive => {
                "That's great to hear! Is there anything specific I can help you with today?"
                    .to_string()
            }
            Sentiment::Negative => {
                "I'm sorry to hear that. Is there anything I can do to help improve the situation?"
                    .to_string()
            }
            _ => "I understand. Is there anything specific you'd like to know or discuss?"
                .to_string(),
        },
    }
}

/// Generator backed by an OpenAI-compatible chat-completions endpoint.
pub struct ApiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ApiGenerator {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CoreError::Validation("model.api_key is required".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CoreError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ResponseGenerator for ApiGenerator {
    async fn generate(
        &self,
        message: &str,
        history: &[ChatMessage],
        _analysis: &MessageAnalysis,
        profile: &AgentProfile,
    ) -> Result<String> {
        let mut messages = vec![json!({
            "role": "system",
            "content": profile.instructions,
        })];
        for entry in history {
            messages.push(json!({
                "role": entry.role,
                "content": entry.content,
            }));
        }
        messages.push(json!({
            "role": "user",
            "content": message,
        }));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": profile.temperature,
            "max_tokens": profile.max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::Timeout
                } else {
                    CoreError::external("model", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::ExternalService {
                service: "model",
                message: format!("completion request failed with {status}: {detail}"),
            });
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoreError::external("model", e))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::ExternalService {
                service: "model",
                message: "completion response carried no content".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::anyhow;
    use std::sync::Mutex;

    /// Store whose loads always fail; saves are recorded.
    #[derive(Default)]
    struct FailingLoadStore {
        saved: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl ThreadStore for FailingLoadStore {
        async fn load(&self, _conversation_id: &str) -> anyhow::Result<Vec<ChatMessage>> {
            Err(anyhow!("backend unavailable"))
        }

        async fn save(
            &self,
            conversation_id: &str,
            history: &[ChatMessage],
        ) -> anyhow::Result<()> {
            self.saved
                .lock()
                .unwrap()
                .push((conversation_id.to_string(), history.len()));
            Ok(())
        }
    }

    /// Store whose saves always fail.
    struct FailingSaveStore;

    #[async_trait]
    impl ThreadStore for FailingSaveStore {
        async fn load(&self, _conversation_id: &str) -> anyhow::Result<Vec<ChatMessage>> {
            Ok(Vec::new())
        }

        async fn save(
            &self,
            _conversation_id: &str,
            _history: &[ChatMessage],
        ) -> anyhow::Result<()> {
            Err(anyhow!("disk full"))
        }
    }

    /// Generator that records the history length it was handed.
    #[derive(Default)]
    struct RecordingGenerator {
        history_lens: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ResponseGenerator for RecordingGenerator {
        async fn generate(
            &self,
            message: &str,
            history: &[ChatMessage],
            _analysis: &MessageAnalysis,
            _profile: &AgentProfile,
        ) -> Result<String> {
            self.history_lens.lock().unwrap().push(history.len());
            Ok(format!("echo: {message}"))
        }
    }

    fn rules_pipeline() -> MessagePipeline {
        MessagePipeline::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RuleBasedGenerator::new(Duration::from_secs(5))),
        )
    }

    #[tokio::test]
    async fn test_greeting_reply_depends_on_history() {
        let pipeline = rules_pipeline();
        let profile = AgentProfile::default();

        let first = pipeline.process("Hello there", "c1", &profile).await.unwrap();
        assert!(first.starts_with("Hello! Welcome"));

        let second = pipeline.process("Hi again", "c1", &profile).await.unwrap();
        assert!(second.starts_with("Hello again!"));
    }

    #[tokio::test]
    async fn test_question_reply_routes_on_keywords() {
        let pipeline = rules_pipeline();
        let profile = AgentProfile::default();

        let reply = pipeline
            .process("What are your opening hours?", "c2", &profile)
            .await
            .unwrap();
        assert!(reply.contains("Monday through Friday"));
    }

    #[tokio::test]
    async fn test_complaint_reply_softens_on_negative_sentiment() {
        let pipeline = rules_pipeline();
        let profile = AgentProfile::default();

        let reply = pipeline
            .process(
                "This is terrible, the website is broken and I am unhappy about the problem",
                "c3",
                &profile,
            )
            .await
            .unwrap();
        assert!(reply.contains("sorry to hear about your experience"));
    }

    #[tokio::test]
    async fn test_canned_reply_is_translated() {
        let pipeline = rules_pipeline();
        let profile = AgentProfile::default();

        // Neutral Spanish statement: the canned fallback reply comes back
        // translated through the phrase table.
        let reply = pipeline
            .process("el servicio de la empresa es para un cliente", "c4", &profile)
            .await
            .unwrap();
        assert!(reply.starts_with("Entiendo."), "got: {reply}");
    }

    #[tokio::test]
    async fn test_load_failure_degrades_to_empty_history() {
        let store = Arc::new(FailingLoadStore::default());
        let generator = Arc::new(RecordingGenerator::default());
        let pipeline = MessagePipeline::new(store.clone(), generator.clone());

        let reply = pipeline
            .process("hi", "c1", &AgentProfile::default())
            .await
            .unwrap();
        assert_eq!(reply, "echo: hi");

        // Generator saw an empty history; the save carried both new messages.
        assert_eq!(generator.history_lens.lock().unwrap().as_slice(), &[0]);
        assert_eq!(store.saved.lock().unwrap().as_slice(), &[("c1".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_save_failure_is_swallowed() {
        let pipeline = MessagePipeline::new(
            Arc::new(FailingSaveStore),
            Arc::new(RecordingGenerator::default()),
        );
        let reply = pipeline
            .process("hi", "c1", &AgentProfile::default())
            .await
            .unwrap();
        assert_eq!(reply, "echo: hi");
    }

    #[tokio::test]
    async fn test_history_threads_through_invocations() {
        let generator = Arc::new(RecordingGenerator::default());
        let pipeline = MessagePipeline::new(Arc::new(MemoryStore::new()), generator.clone());
        let profile = AgentProfile::default();

        pipeline.process("one", "c", &profile).await.unwrap();
        pipeline.process("two", "c", &profile).await.unwrap();
        pipeline.process("three", "c", &profile).await.unwrap();

        // Each turn adds a user and an assistant message.
        assert_eq!(generator.history_lens.lock().unwrap().as_slice(), &[0, 2, 4]);
    }

    #[test]
    fn test_api_generator_requires_key() {
        let config = ModelConfig::default();
        assert!(matches!(
            ApiGenerator::new(&config),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_build_generator_defaults_to_rules() {
        let config = Config::default();
        assert!(build_generator(&config).is_ok());
    }
}
