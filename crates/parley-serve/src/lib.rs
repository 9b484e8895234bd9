// ABOUTME: Library root for parley-serve.
// ABOUTME: Builds the shared application state and exports routes and server modules.

pub mod error;
pub mod routes;
pub mod server;

use anyhow::{Context, Result};
use parley_core::{
    build_generator, BotDirectory, Config, EventFilter, MessagePipeline, SqliteStore, TaskBridge,
    ThreadStore,
};
use parley_slack::{BotContext, BotRegistry, EventDispatcher, SlackClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared state behind every route. All services are explicitly constructed
/// here and owned by the state; there are no process-wide singletons.
pub struct AppState {
    pub config: Config,
    pub pipeline: Arc<MessagePipeline>,
    pub bridge: Arc<TaskBridge>,
    pub dispatcher: EventDispatcher,
    pub registry: Arc<BotRegistry>,
    pub default_bot: Option<BotContext>,
}

impl AppState {
    /// Wire the application from its seams. Used directly by tests with
    /// in-memory implementations; production goes through [`AppState::build`].
    pub fn new(
        config: Config,
        thread_store: Arc<dyn ThreadStore>,
        directory: Arc<dyn BotDirectory>,
    ) -> Result<Arc<Self>> {
        let generator = build_generator(&config)?;
        let pipeline = Arc::new(MessagePipeline::new(thread_store, generator));
        let bridge = Arc::new(TaskBridge::new());
        let filter = Arc::new(EventFilter::default());
        let reply_timeout = Duration::from_secs(config.pipeline.reply_timeout_secs);
        let dispatcher = EventDispatcher::new(
            filter,
            Arc::clone(&bridge),
            Arc::clone(&pipeline),
            reply_timeout,
        );
        let registry = Arc::new(BotRegistry::new(directory));

        let default_bot = match &config.slack.bot_token {
            Some(token) => {
                let client = Arc::new(SlackClient::new(token.clone())?);
                Some(BotContext {
                    bot_id: None,
                    client,
                    profile: config.agent.clone(),
                })
            }
            None => None,
        };

        Ok(Arc::new(Self {
            config,
            pipeline,
            bridge,
            dispatcher,
            registry,
            default_bot,
        }))
    }

    /// Open the SQLite store and wire the application for production.
    pub async fn build(config: Config) -> Result<Arc<Self>> {
        let db_path = config.db_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating data dir {}", parent.display()))?;
        }

        info!(db = %db_path.display(), "opening conversation store");
        let store = SqliteStore::open(&db_path)
            .await
            .context("opening conversation store")?;

        let thread_store: Arc<dyn ThreadStore> = Arc::new(store.clone());
        let directory: Arc<dyn BotDirectory> = Arc::new(store);
        Self::new(config, thread_store, directory)
    }

    /// The reply deadline used by request-scoped pipeline calls.
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.config.pipeline.reply_timeout_secs)
    }
}
