// ABOUTME: Cached multi-tenant bot registry over the BotDirectory seam.
// ABOUTME: Caches bot configs and per-bot clients; refreshes in the background.

use crate::client::SlackClient;
use crate::error::Result;
use parley_core::{AgentProfile, BotConfig, BotDirectory};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Registry of chat-platform bots, backed by the directory (registry tables)
/// with an in-process cache so webhook handling does not hit storage on
/// every delivery. A background task refreshes cached configurations; stale
/// clients are rebuilt when a refreshed bot carries a new token.
pub struct BotRegistry {
    directory: Arc<dyn BotDirectory>,
    bots: RwLock<HashMap<String, BotConfig>>,
    clients: RwLock<HashMap<String, Arc<SlackClient>>>,
    refresh_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl BotRegistry {
    pub fn new(directory: Arc<dyn BotDirectory>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            directory,
            bots: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            shutdown_tx,
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Look up a bot configuration, serving from cache when possible.
    pub async fn get_bot(&self, bot_id: &str) -> Result<Option<BotConfig>> {
        if let Some(bot) = self.bots.read().await.get(bot_id).cloned() {
            return Ok(Some(bot));
        }

        let Some(bot) = self.directory.get_bot(bot_id).await? else {
            debug!(bot_id = %bot_id, "no bot registered under this id");
            return Ok(None);
        };

        self.bots.write().await.insert(bot_id.to_string(), bot.clone());
        Ok(Some(bot))
    }

    /// Look up an agent profile by id.
    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentProfile>> {
        Ok(self.directory.get_agent(agent_id).await?)
    }

    /// Resolve the agent profile a bot fronts, falling back to the default
    /// profile when the bot has no agent or the agent is unregistered.
    pub async fn agent_for_bot(&self, bot: &BotConfig) -> Result<AgentProfile> {
        let Some(agent_id) = bot.agent_id.as_deref() else {
            warn!(bot_id = %bot.id, "bot has no agent configured, using default profile");
            return Ok(AgentProfile::default());
        };

        match self.directory.get_agent(agent_id).await? {
            Some(profile) => Ok(profile),
            None => {
                warn!(
                    bot_id = %bot.id,
                    agent_id = %agent_id,
                    "agent not found, using default profile"
                );
                Ok(AgentProfile::default())
            }
        }
    }

    /// All active bots straight from the directory (used at startup).
    pub async fn active_bots(&self) -> Result<Vec<BotConfig>> {
        Ok(self.directory.active_bots().await?)
    }

    /// Get (or build and cache) the Web API client for a bot.
    pub async fn client_for(&self, bot: &BotConfig) -> Result<Arc<SlackClient>> {
        if let Some(client) = self.clients.read().await.get(&bot.id).cloned() {
            return Ok(client);
        }

        let client = Arc::new(SlackClient::new(bot.bot_token.clone())?);
        self.clients
            .write()
            .await
            .insert(bot.id.clone(), Arc::clone(&client));
        Ok(client)
    }

    /// Re-fetch active bot configurations and update the caches. Bots whose
    /// token changed lose their cached client so the next event rebuilds it.
    pub async fn refresh(&self) {
        let active = match self.directory.active_bots().await {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "registry refresh failed");
                return;
            }
        };

        let mut bots = self.bots.write().await;
        let mut clients = self.clients.write().await;
        for bot in active {
            let token_changed = bots
                .get(&bot.id)
                .map(|cached| cached.bot_token != bot.bot_token)
                .unwrap_or(false);
            if token_changed {
                clients.remove(&bot.id);
            }
            bots.insert(bot.id.clone(), bot);
        }
        debug!(cached = bots.len(), "registry refreshed");
    }

    /// Spawn the background refresh loop. Runs until [`shutdown`] is called.
    ///
    /// [`shutdown`]: BotRegistry::shutdown
    pub fn spawn_refresh(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(registry.refresh_interval);
            // The first tick fires immediately; skip it so startup state stands.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => registry.refresh().await,
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("registry refresh loop stopped");
        })
    }

    /// Stop the background refresh loop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
