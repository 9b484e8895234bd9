// ABOUTME: SQLite-backed storage for conversation histories and the bot/agent registry.
// ABOUTME: Defines the ThreadStore and BotDirectory seams plus in-memory implementations.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "user" or "assistant"
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Parameters governing one response-generation invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            name: "Assistant".to_string(),
            description: "A helpful AI assistant".to_string(),
            instructions: "You are a helpful AI assistant that provides accurate and concise responses."
                .to_string(),
            temperature: 0.4,
            max_tokens: 25000,
        }
    }
}

/// Registered chat-platform bot: credentials plus the agent it fronts.
#[derive(Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub id: String,
    pub bot_token: String,
    pub signing_secret: String,
    pub agent_id: Option<String>,
    pub user_id: Option<String>,
    pub is_active: bool,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("id", &self.id)
            .field("bot_token", &"[REDACTED]")
            .field("signing_secret", &"[REDACTED]")
            .field("agent_id", &self.agent_id)
            .field("user_id", &self.user_id)
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// Load/save of one conversation's ordered history, keyed by conversation
/// id. Both operations are allowed to fail without aborting the pipeline;
/// callers log and degrade.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn load(&self, conversation_id: &str) -> Result<Vec<ChatMessage>>;
    async fn save(&self, conversation_id: &str, history: &[ChatMessage]) -> Result<()>;
}

/// Lookup of registered bots and agent profiles.
#[async_trait]
pub trait BotDirectory: Send + Sync {
    async fn get_bot(&self, bot_id: &str) -> Result<Option<BotConfig>>;
    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentProfile>>;
    async fn active_bots(&self) -> Result<Vec<BotConfig>>;
}

/// Persistent storage over SQLite. Conversations are stored document-style:
/// one row per conversation id holding the serialized ordered history, so
/// load/save stay whole-document operations.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path.as_ref().display());

        let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                history TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bots (
                id TEXT PRIMARY KEY,
                bot_token TEXT NOT NULL,
                signing_secret TEXT NOT NULL,
                agent_id TEXT,
                user_id TEXT,
                is_active INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                instructions TEXT NOT NULL,
                temperature REAL NOT NULL,
                max_tokens INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Insert or update a bot registration.
    pub async fn put_bot(&self, bot: &BotConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bots (id, bot_token, signing_secret, agent_id, user_id, is_active)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                bot_token = excluded.bot_token,
                signing_secret = excluded.signing_secret,
                agent_id = excluded.agent_id,
                user_id = excluded.user_id,
                is_active = excluded.is_active
            "#,
        )
        .bind(&bot.id)
        .bind(&bot.bot_token)
        .bind(&bot.signing_secret)
        .bind(&bot.agent_id)
        .bind(&bot.user_id)
        .bind(bot.is_active as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or update an agent profile.
    pub async fn put_agent(&self, agent_id: &str, profile: &AgentProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (id, name, description, instructions, temperature, max_tokens)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                instructions = excluded.instructions,
                temperature = excluded.temperature,
                max_tokens = excluded.max_tokens
            "#,
        )
        .bind(agent_id)
        .bind(&profile.name)
        .bind(&profile.description)
        .bind(&profile.instructions)
        .bind(profile.temperature)
        .bind(profile.max_tokens as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ThreadStore for SqliteStore {
    async fn load(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT history FROM conversations WHERE id = ?")
                .bind(conversation_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((history,)) => Ok(serde_json::from_str(&history)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, conversation_id: &str, history: &[ChatMessage]) -> Result<()> {
        let serialized = serde_json::to_string(history)?;
        sqlx::query(
            r#"
            INSERT INTO conversations (id, history, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                history = excluded.history,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(conversation_id)
        .bind(serialized)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct BotRow {
    id: String,
    bot_token: String,
    signing_secret: String,
    agent_id: Option<String>,
    user_id: Option<String>,
    is_active: i64,
}

impl From<BotRow> for BotConfig {
    fn from(row: BotRow) -> Self {
        BotConfig {
            id: row.id,
            bot_token: row.bot_token,
            signing_secret: row.signing_secret,
            agent_id: row.agent_id,
            user_id: row.user_id,
            is_active: row.is_active != 0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    name: String,
    description: String,
    instructions: String,
    temperature: f64,
    max_tokens: i64,
}

impl From<AgentRow> for AgentProfile {
    fn from(row: AgentRow) -> Self {
        AgentProfile {
            name: row.name,
            description: row.description,
            instructions: row.instructions,
            temperature: row.temperature,
            max_tokens: row.max_tokens.max(0) as u32,
        }
    }
}

#[async_trait]
impl BotDirectory for SqliteStore {
    async fn get_bot(&self, bot_id: &str) -> Result<Option<BotConfig>> {
        let row = sqlx::query_as::<_, BotRow>(
            "SELECT id, bot_token, signing_secret, agent_id, user_id, is_active FROM bots WHERE id = ?",
        )
        .bind(bot_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentProfile>> {
        let row = sqlx::query_as::<_, AgentRow>(
            "SELECT name, description, instructions, temperature, max_tokens FROM agents WHERE id = ?",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn active_bots(&self) -> Result<Vec<BotConfig>> {
        let rows = sqlx::query_as::<_, BotRow>(
            "SELECT id, bot_token, signing_secret, agent_id, user_id, is_active FROM bots WHERE is_active = 1",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// In-memory conversation store: the local thread-dict variant, also used
/// in tests. Histories live only as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    threads: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreadStore for MemoryStore {
    async fn load(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let guard = self.threads.lock().expect("memory store lock");
        Ok(guard.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn save(&self, conversation_id: &str, history: &[ChatMessage]) -> Result<()> {
        let mut guard = self.threads.lock().expect("memory store lock");
        guard.insert(conversation_id.to_string(), history.to_vec());
        Ok(())
    }
}

/// In-memory directory for statically configured bots and agents.
#[derive(Default)]
pub struct MemoryDirectory {
    bots: Mutex<HashMap<String, BotConfig>>,
    agents: Mutex<HashMap<String, AgentProfile>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_bot(&self, bot: BotConfig) {
        self.bots
            .lock()
            .expect("directory lock")
            .insert(bot.id.clone(), bot);
    }

    pub fn insert_agent(&self, agent_id: impl Into<String>, profile: AgentProfile) {
        self.agents
            .lock()
            .expect("directory lock")
            .insert(agent_id.into(), profile);
    }
}

#[async_trait]
impl BotDirectory for MemoryDirectory {
    async fn get_bot(&self, bot_id: &str) -> Result<Option<BotConfig>> {
        Ok(self.bots.lock().expect("directory lock").get(bot_id).cloned())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentProfile>> {
        Ok(self
            .agents
            .lock()
            .expect("directory lock")
            .get(agent_id)
            .cloned())
    }

    async fn active_bots(&self) -> Result<Vec<BotConfig>> {
        Ok(self
            .bots
            .lock()
            .expect("directory lock")
            .values()
            .filter(|b| b.is_active)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bot(id: &str, active: bool) -> BotConfig {
        BotConfig {
            id: id.to_string(),
            bot_token: "xoxb-test".to_string(),
            signing_secret: "secret".to_string(),
            agent_id: Some("agent-1".to_string()),
            user_id: None,
            is_active: active,
        }
    }

    #[tokio::test]
    async fn test_sqlite_load_missing_conversation_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("threads.db")).await.unwrap();
        assert!(store.load("C1:1.0").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("threads.db")).await.unwrap();

        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        store.save("C1:1.0", &history).await.unwrap();

        let loaded = store.load("C1:1.0").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].role, "user");
        assert_eq!(loaded[1].content, "hello");
    }

    #[tokio::test]
    async fn test_sqlite_save_overwrites_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("threads.db")).await.unwrap();

        store.save("C1:1.0", &[ChatMessage::user("first")]).await.unwrap();
        let longer = vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("second"),
        ];
        store.save("C1:1.0", &longer).await.unwrap();

        assert_eq!(store.load("C1:1.0").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_sqlite_bot_registry_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("threads.db")).await.unwrap();

        store.put_bot(&sample_bot("bot-1", true)).await.unwrap();
        store.put_bot(&sample_bot("bot-2", false)).await.unwrap();

        let bot = store.get_bot("bot-1").await.unwrap().unwrap();
        assert_eq!(bot.agent_id.as_deref(), Some("agent-1"));
        assert!(bot.is_active);

        assert!(store.get_bot("missing").await.unwrap().is_none());

        let active = store.active_bots().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "bot-1");
    }

    #[tokio::test]
    async fn test_sqlite_agent_registry_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("threads.db")).await.unwrap();

        let profile = AgentProfile {
            name: "Support".to_string(),
            temperature: 0.7,
            ..AgentProfile::default()
        };
        store.put_agent("agent-1", &profile).await.unwrap();

        let loaded = store.get_agent("agent-1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Support");
        assert_eq!(loaded.temperature, 0.7);
        assert_eq!(loaded.max_tokens, 25000);

        assert!(store.get_agent("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.load("c").await.unwrap().is_empty());
        store.save("c", &[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(store.load("c").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_directory_filters_active() {
        let dir = MemoryDirectory::new();
        dir.insert_bot(sample_bot("a", true));
        dir.insert_bot(sample_bot("b", false));
        dir.insert_agent("agent-1", AgentProfile::default());

        assert_eq!(dir.active_bots().await.unwrap().len(), 1);
        assert!(dir.get_agent("agent-1").await.unwrap().is_some());
        assert!(dir.get_bot("b").await.unwrap().is_some());
    }

    #[test]
    fn test_bot_config_debug_redacts_secrets() {
        let debug = format!("{:?}", sample_bot("bot-1", true));
        assert!(!debug.contains("xoxb-test"));
        assert!(!debug.contains("\"secret\""));
        assert!(debug.contains("REDACTED"));
    }
}
