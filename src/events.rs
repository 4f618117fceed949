// src/events.rs

//! Best-effort event publishing for worker and pass lifecycle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::SyncRunResult;

/// Events published by the live worker. Serializable so sinks can forward
/// them to queues or webhooks as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    WorkerStarted { auction_code: String },
    WorkerPaused,
    WorkerResumed,
    WorkerStopped,
    PassCompleted { result: SyncRunResult },
    PassFailed { error: String },
}

impl SyncEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkerStarted { .. } => "worker_started",
            Self::WorkerPaused => "worker_paused",
            Self::WorkerResumed => "worker_resumed",
            Self::WorkerStopped => "worker_stopped",
            Self::PassCompleted { .. } => "pass_completed",
            Self::PassFailed { .. } => "pass_failed",
        }
    }
}

/// Event transport contract. Publishing is best-effort: the worker logs and
/// swallows sink errors, so a broken transport never affects a pass.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: SyncEvent) -> Result<()>;
}

/// Default sink: every event goes to the log facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn publish(&self, event: SyncEvent) -> Result<()> {
        match &event {
            SyncEvent::PassCompleted { result } => log::info!("event pass_completed: {result}"),
            SyncEvent::PassFailed { error } => log::warn!("event pass_failed: {error}"),
            other => log::info!("event {}", other.name()),
        }
        Ok(())
    }
}
