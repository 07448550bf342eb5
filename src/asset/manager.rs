//! Owns the in-flight processors and drives them to completion.
//!
//! 中文: 资产管理器，持有正在处理的处理器，定期调用 `update` 并移除已完成的处理器。

use super::processor::AssetProcessor;
use crate::common::SessionKey;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Outcome of dispatching one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    InProgress,
    Success,
    Failure,
}

/// Tracks at most one processor per asset id.
///
/// Single owner: the worker thread is the only caller, so the map needs no lock.
#[derive(Default)]
pub struct AssetManager {
    processors: HashMap<String, Box<dyn AssetProcessor>>,
    waiting_for_certificate: bool,
}

impl AssetManager {
    pub fn new() -> Self {
        Default::default()
    }

    /// Hands `asset` to `processor`. Completed processors are dropped right away; unfinished
    /// ones are kept until [`update`](Self::update) sees them complete.
    ///
    /// A processor for an asset id that is already in flight is refused with
    /// [`AssetStatus::InProgress`] and never runs.
    pub fn process_asset(
        &mut self,
        mut processor: Box<dyn AssetProcessor>,
        asset: &Value,
        session: &SessionKey,
        key_id: &str,
    ) -> (AssetStatus, Option<Duration>) {
        let asset_id = processor.asset_id().to_string();
        if self.processors.contains_key(&asset_id) {
            tracing::warn!(
                asset_id = %asset_id,
                "asset already in flight, ignoring duplicate dispatch"
            );
            return (AssetStatus::InProgress, None);
        }

        let sleep_hint = processor.handle_asset(asset, session, key_id);
        self.track_certificate_signals(processor.as_ref());

        if !processor.is_complete() {
            tracing::debug!(asset_id = %asset_id, "asset processing continues in background");
            self.processors.insert(asset_id, processor);
            return (AssetStatus::InProgress, sleep_hint);
        }

        let status = if processor.is_success() {
            tracing::info!(asset_id = %asset_id, "asset processed");
            AssetStatus::Success
        } else {
            tracing::warn!(
                asset_id = %asset_id,
                error = %processor.error_message(),
                "asset failed"
            );
            AssetStatus::Failure
        };
        (status, sleep_hint)
    }

    /// Polls every in-flight processor once and forgets the completed ones.
    pub fn update(&mut self) {
        let mut signals = Vec::new();
        self.processors.retain(|asset_id, processor| {
            processor.update();
            signals.push((processor.wait_for_certificate(), processor.certificate_received()));
            if processor.is_complete() {
                tracing::debug!(
                    asset_id = %asset_id,
                    success = processor.is_success(),
                    "asset finished"
                );
                false
            } else {
                true
            }
        });
        for (waiting, received) in signals {
            self.apply_certificate_signals(waiting, received);
        }
    }

    pub fn is_asset_processing(&self, asset_id: &str) -> bool {
        self.processors.contains_key(asset_id)
    }

    pub fn assets_processing_count(&self) -> usize {
        self.processors.len()
    }

    /// A CSR has been submitted and its certificate has not arrived yet.
    pub fn is_waiting_for_certificate(&self) -> bool {
        self.waiting_for_certificate
    }

    fn track_certificate_signals(&mut self, processor: &dyn AssetProcessor) {
        self.apply_certificate_signals(
            processor.wait_for_certificate(),
            processor.certificate_received(),
        );
    }

    fn apply_certificate_signals(&mut self, waiting: bool, received: bool) {
        if waiting {
            self.waiting_for_certificate = true;
        }
        if received && self.waiting_for_certificate {
            tracing::debug!("signed certificate received, leaving certificate wait");
            self.waiting_for_certificate = false;
        }
    }
}
