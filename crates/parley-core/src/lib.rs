// ABOUTME: Library root for parley-core.
// ABOUTME: Exports the task bridge, event filter, pipeline, analysis, store, and config modules.

pub mod analysis;
pub mod bridge;
pub mod config;
pub mod dedup;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod store;

pub use bridge::{TaskBridge, TaskError, TaskTicket};
pub use config::{Config, GeneratorKind};
pub use dedup::EventFilter;
pub use error::{format_error_for_user, generate_error_id, CoreError, Result};
pub use pipeline::{build_generator, ApiGenerator, MessagePipeline, ResponseGenerator, RuleBasedGenerator};
pub use store::{AgentProfile, BotConfig, BotDirectory, ChatMessage, MemoryDirectory, MemoryStore, SqliteStore, ThreadStore};
