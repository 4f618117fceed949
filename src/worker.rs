// src/worker.rs

//! Long-lived worker that repeats sync passes on an interval, with pause,
//! resume, and cooperative stop.
//!
//! All transitions and event emission happen under one coordinating lock, so
//! concurrent `start`/`pause`/`stop` callers cannot race the loop task. The
//! pass itself runs outside the lock: a slow network call never blocks
//! `status()` or a control call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::events::{EventSink, SyncEvent};
use crate::models::{Config, SyncRunResult};
use crate::parse::SelectorPageParser;
use crate::store::Store;
use crate::sync::SyncEngine;

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Stopping,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of the worker, safe to hand to status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct LiveState {
    pub status: WorkerStatus,
    pub config: Option<Config>,
    pub paused_at: Option<DateTime<Utc>>,
    pub last_result: Option<SyncRunResult>,
    pub last_error: Option<String>,
}

/// Builds the engine a `start()` call will loop over. Injectable so tests
/// can run the worker against stub fetchers and stores.
pub type EngineFactory = dyn Fn(&Config) -> Result<SyncEngine> + Send + Sync;

#[derive(Default)]
struct WorkerState {
    status: WorkerStatus,
    config: Option<Config>,
    paused_at: Option<DateTime<Utc>>,
    last_result: Option<SyncRunResult>,
    last_error: Option<String>,
    stop_tx: Option<watch::Sender<bool>>,
    pause_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

pub struct LiveWorker {
    sink: Arc<dyn EventSink>,
    factory: Arc<EngineFactory>,
    shared: Arc<Mutex<WorkerState>>,
}

impl LiveWorker {
    /// Worker wired for production: each `start()` builds a selector parser
    /// and an HTTP-backed engine from the supplied config.
    pub fn new(store: Arc<dyn Store>, sink: Arc<dyn EventSink>) -> Self {
        Self::with_engine_factory(sink, move |config: &Config| {
            let parser = Arc::new(SelectorPageParser::new(&config.parser)?);
            SyncEngine::from_config(config, Arc::clone(&store), parser)
        })
    }

    pub fn with_engine_factory(
        sink: Arc<dyn EventSink>,
        factory: impl Fn(&Config) -> Result<SyncEngine> + Send + Sync + 'static,
    ) -> Self {
        Self {
            sink,
            factory: Arc::new(factory),
            shared: Arc::new(Mutex::new(WorkerState::default())),
        }
    }

    /// Start the loop, or reopen the pause gate when the worker is `Paused`.
    ///
    /// From `Idle` this validates the config, builds the engine (so bad
    /// selectors or a missing auction target fail here, before any network
    /// activity), and spawns the loop task. From `Paused` it validates the
    /// config but only resumes the existing loop; changing the config
    /// requires `stop()` first.
    pub async fn start(&self, config: Config) -> Result<()> {
        let mut state = self.shared.lock().await;
        match state.status {
            WorkerStatus::Running => Err(AppError::worker("worker is already running")),
            WorkerStatus::Stopping => Err(AppError::worker("worker is stopping")),
            WorkerStatus::Paused => {
                config.validate()?;
                if let Some(pause_tx) = &state.pause_tx {
                    let _ = pause_tx.send(false);
                }
                state.status = WorkerStatus::Running;
                state.paused_at = None;
                log::info!("worker resumed");
                publish(&self.sink, SyncEvent::WorkerResumed).await;
                Ok(())
            }
            WorkerStatus::Idle => {
                config.validate()?;
                let engine = (self.factory)(&config)?;
                let auction_code = engine.options().auction_code.clone();
                let interval = config.worker.interval_secs.map(Duration::from_secs);

                let (stop_tx, stop_rx) = watch::channel(false);
                let (pause_tx, pause_rx) = watch::channel(false);
                let handle = tokio::spawn(run_loop(
                    engine,
                    Arc::clone(&self.sink),
                    Arc::clone(&self.shared),
                    interval,
                    stop_rx,
                    pause_rx,
                ));

                state.status = WorkerStatus::Running;
                state.config = Some(config);
                state.paused_at = None;
                state.stop_tx = Some(stop_tx);
                state.pause_tx = Some(pause_tx);
                state.handle = Some(handle);
                log::info!("worker started for auction {auction_code}");
                publish(&self.sink, SyncEvent::WorkerStarted { auction_code }).await;
                Ok(())
            }
        }
    }

    /// Close the gate: the current pass finishes, no further pass starts
    /// until `start()` is called again.
    pub async fn pause(&self) -> Result<()> {
        let mut state = self.shared.lock().await;
        if state.status != WorkerStatus::Running {
            return Err(AppError::worker(format!(
                "cannot pause a {} worker",
                state.status
            )));
        }
        if let Some(pause_tx) = &state.pause_tx {
            let _ = pause_tx.send(true);
        }
        state.status = WorkerStatus::Paused;
        state.paused_at = Some(Utc::now());
        log::info!("worker paused");
        publish(&self.sink, SyncEvent::WorkerPaused).await;
        Ok(())
    }

    /// Signal stop and wait for the loop task to exit. After this returns
    /// the worker is `Idle` and no background activity remains. Stopping an
    /// idle worker is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let handle = {
            let mut state = self.shared.lock().await;
            match state.status {
                WorkerStatus::Idle => return Ok(()),
                WorkerStatus::Stopping => {
                    return Err(AppError::worker("stop is already in progress"));
                }
                WorkerStatus::Running | WorkerStatus::Paused => {}
            }
            state.status = WorkerStatus::Stopping;
            if let Some(stop_tx) = &state.stop_tx {
                let _ = stop_tx.send(true);
            }
            // A paused loop is parked at the gate; open it so it can see
            // the stop signal and exit.
            if let Some(pause_tx) = &state.pause_tx {
                let _ = pause_tx.send(false);
            }
            state.handle.take()
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::warn!("worker loop task ended abnormally: {e}");
            }
        }

        let mut state = self.shared.lock().await;
        settle_idle(&mut state);
        log::info!("worker stopped");
        publish(&self.sink, SyncEvent::WorkerStopped).await;
        Ok(())
    }

    pub async fn status(&self) -> LiveState {
        let state = self.shared.lock().await;
        LiveState {
            status: state.status,
            config: state.config.clone(),
            paused_at: state.paused_at,
            last_result: state.last_result.clone(),
            last_error: state.last_error.clone(),
        }
    }
}

fn settle_idle(state: &mut WorkerState) {
    state.status = WorkerStatus::Idle;
    state.config = None;
    state.paused_at = None;
    state.stop_tx = None;
    state.pause_tx = None;
    state.handle = None;
}

async fn publish(sink: &Arc<dyn EventSink>, event: SyncEvent) {
    if let Err(e) = sink.publish(event).await {
        log::warn!("event publish failed: {e}");
    }
}

/// The loop task. Holds the coordinating lock only while recording results
/// and emitting events, never across a pass or a wait.
async fn run_loop(
    engine: SyncEngine,
    sink: Arc<dyn EventSink>,
    shared: Arc<Mutex<WorkerState>>,
    interval: Option<Duration>,
    mut stop_rx: watch::Receiver<bool>,
    mut pause_rx: watch::Receiver<bool>,
) {
    loop {
        if wait_at_gate(&mut stop_rx, &mut pause_rx).await {
            return;
        }

        let outcome = engine.run().await;
        {
            let mut state = shared.lock().await;
            let event = match outcome {
                Ok(result) => {
                    state.last_error = None;
                    state.last_result = Some(result.clone());
                    SyncEvent::PassCompleted { result }
                }
                Err(e) => {
                    let message = e.to_string();
                    log::error!("pass failed before a run row existed: {message}");
                    state.last_error = Some(message.clone());
                    SyncEvent::PassFailed { error: message }
                }
            };
            publish(&sink, event).await;
        }

        let period = match interval {
            Some(period) => period,
            None => {
                // Single-pass mode. Settle to Idle unless a stop() call is
                // already doing it; that caller owns the stopped event.
                let mut state = shared.lock().await;
                if state.status != WorkerStatus::Stopping {
                    settle_idle(&mut state);
                    log::info!("worker finished single pass");
                    publish(&sink, SyncEvent::WorkerStopped).await;
                }
                return;
            }
        };

        if wait_for_interval(period, &mut stop_rx).await {
            return;
        }
    }
}

/// Wait until the pause gate is open. Returns true when stop was signalled
/// (or the control channels vanished) and the loop should exit.
async fn wait_at_gate(
    stop_rx: &mut watch::Receiver<bool>,
    pause_rx: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        if *stop_rx.borrow() {
            return true;
        }
        if !*pause_rx.borrow() {
            return false;
        }
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    return true;
                }
            }
            changed = pause_rx.changed() => {
                if changed.is_err() {
                    return true;
                }
            }
        }
    }
}

/// Sleep for one interval, interruptible by stop. Returns true when the
/// loop should exit instead of running another pass.
async fn wait_for_interval(period: Duration, stop_rx: &mut watch::Receiver<bool>) -> bool {
    if *stop_rx.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(period) => false,
        changed = stop_rx.changed() => changed.is_err() || *stop_rx.borrow(),
    }
}
