//! The polling loop that feeds KeyScaler assets into the [`AssetManager`].
//!
//! One cycle: drive in-flight processors, authorise, dispatch every asset of the response in
//! array order, then compute how long to sleep. While a CSR is waiting for its certificate
//! the shorter `certificateWaitSecs` interval is used.
//!
//! 中文: 轮询循环。每个周期先推进处理中的资产，再认证并按顺序分发新资产，最后计算休眠时间。

use crate::asset::{AssetManager, AssetStatus, Collaborators, ProcessorFactory};
use crate::common::AgentConfig;
use crate::error::{Error, Result};
use crate::message::build_acknowledge_message;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub cycles: u64,
    pub assets_dispatched: u64,
    pub assets_succeeded: u64,
    pub assets_failed: u64,
    pub unsupported_assets: u64,
    pub auth_failures: u64,
    pub heartbeats: u64,
    pub last_poll: Option<DateTime<Utc>>,
}

pub struct Worker {
    config: AgentConfig,
    collaborators: Collaborators,
    factory: ProcessorFactory,
    manager: AssetManager,
    interval: Duration,
    stats: WorkerStats,
}

impl Worker {
    /// Worker with the built-in processor types.
    pub fn new(config: AgentConfig, collaborators: Collaborators) -> Self {
        let factory = ProcessorFactory::with_defaults(&collaborators, &config);
        Self::with_factory(config, collaborators, factory)
    }

    pub fn with_factory(
        config: AgentConfig,
        collaborators: Collaborators,
        factory: ProcessorFactory,
    ) -> Self {
        let interval = config.polling.interval();
        Self {
            config,
            collaborators,
            factory,
            manager: AssetManager::new(),
            interval,
            stats: WorkerStats::default(),
        }
    }

    pub fn manager(&self) -> &AssetManager {
        &self.manager
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Current regular polling interval, including any override delivered by an asset.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Delay until the next poll.
    pub fn next_delay(&self) -> Duration {
        if self.manager.is_waiting_for_certificate() {
            self.interval.min(self.config.polling.certificate_wait())
        } else {
            self.interval
        }
    }

    /// Runs a single poll cycle and returns the delay before the next one.
    ///
    /// Only authorisation problems are returned as errors; per-asset failures are reported to
    /// KeyScaler through acknowledgements.
    pub fn poll_once(&mut self) -> Result<Duration> {
        self.manager.update();
        self.stats.cycles += 1;
        self.stats.last_poll = Some(Utc::now());

        let result = self.dispatch_assets();
        self.heartbeat();
        result.map(|()| self.next_delay())
    }

    /// Polls until `stop` is set. Between polls the worker sleeps in short ticks, checking
    /// the flag and driving in-flight processors after each one.
    pub fn run(&mut self, stop: &AtomicBool) {
        tracing::info!(interval = ?self.interval, "worker started");
        while !stop.load(Ordering::Relaxed) {
            let delay = self.poll_once().unwrap_or_else(|e| {
                tracing::warn!(
                    error = %e,
                    "poll cycle failed, retrying after the regular interval"
                );
                self.interval
            });
            self.sleep(delay, stop);
        }
        tracing::info!(in_flight = self.manager.assets_processing_count(), "worker stopped");
    }

    fn sleep(&mut self, delay: Duration, stop: &AtomicBool) {
        let tick = self.config.polling.tick();
        let started = Instant::now();
        while !stop.load(Ordering::Relaxed) {
            let elapsed = started.elapsed();
            if elapsed >= delay {
                break;
            }
            thread::sleep(tick.min(delay - elapsed));
            self.manager.update();
        }
    }

    fn dispatch_assets(&mut self) -> Result<()> {
        let authorisation = self.collaborators.messenger.identify_and_authorise().inspect_err(|e| {
            self.stats.auth_failures += 1;
            tracing::error!(error = %e, "authorisation with KeyScaler failed");
        })?;
        if !authorisation.message.is_empty() {
            tracing::debug!(message = %authorisation.message, "authorised");
        }

        let response: Value = serde_json::from_str(&authorisation.da_json)
            .map_err(|e| Error::Deserialize(format!("authorisation response: {}", e)))?;
        let Some(assets) = response.get("assets").and_then(Value::as_array) else {
            tracing::debug!("no assets offered");
            return Ok(());
        };

        for asset in assets {
            self.dispatch(asset, &authorisation.session, &authorisation.key_id);
        }
        Ok(())
    }

    fn dispatch(&mut self, asset: &Value, session: &crate::common::SessionKey, key_id: &str) {
        let asset_id = asset.get("assetId").and_then(Value::as_str).unwrap_or_default();
        let asset_type = asset.get("type").and_then(Value::as_str).unwrap_or_default();
        if asset_id.is_empty() {
            tracing::warn!(asset_type = %asset_type, "skipping asset without assetId");
            return;
        }
        if self.manager.is_asset_processing(asset_id) {
            tracing::debug!(asset_id = %asset_id, "asset still in flight, not re-dispatched");
            return;
        }

        let Some(processor) = self.factory.create(asset_type, asset_id) else {
            self.reject_unsupported(asset_id, asset_type);
            return;
        };

        tracing::info!(asset_id = %asset_id, asset_type = %asset_type, "dispatching asset");
        self.stats.assets_dispatched += 1;
        let (status, sleep_hint) = self.manager.process_asset(processor, asset, session, key_id);
        match status {
            AssetStatus::Success => self.stats.assets_succeeded += 1,
            AssetStatus::Failure => self.stats.assets_failed += 1,
            AssetStatus::InProgress => {}
        }
        if let Some(interval) = sleep_hint.filter(|interval| !interval.is_zero()) {
            tracing::info!(asset_id = %asset_id, ?interval, "polling interval overridden");
            self.interval = interval;
        }
    }

    fn reject_unsupported(&mut self, asset_id: &str, asset_type: &str) {
        tracing::warn!(asset_id = %asset_id, asset_type = %asset_type, "unsupported asset type");
        self.stats.unsupported_assets += 1;
        let reason = format!("Unsupported asset type: {}", asset_type);
        let acknowledgement = build_acknowledge_message(asset_id, false, &reason);
        if let Err(e) = self.collaborators.messenger.acknowledge_receipt(&acknowledgement) {
            tracing::error!(asset_id = %asset_id, error = %e, "failed to send acknowledgement");
        }
    }

    fn heartbeat(&mut self) {
        let every = self.config.polling.heartbeat_every;
        if every == 0 || self.stats.cycles % every != 0 {
            return;
        }
        self.stats.heartbeats += 1;
        tracing::info!(
            cycles = self.stats.cycles,
            dispatched = self.stats.assets_dispatched,
            in_flight = self.manager.assets_processing_count(),
            "heartbeat"
        );
    }
}
