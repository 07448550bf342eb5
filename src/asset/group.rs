//! `group` assets: device group metadata.
//!
//! `{"assetId": "...", "metadata": "<base64>"}`. The decoded metadata replaces the file
//! configured as `storage.groupMetadataPath`. The parent directory is expected to exist.

use super::Collaborators;
use super::processor::{AssetProcessor, ProcessorState, required_str};
use crate::common::SessionKey;
use crate::common::utils::write_atomic;
use crate::error::{Error, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Writes device group metadata to the configured file.
///
/// 中文: 将设备组元数据写入配置的文件。
pub struct GroupProcessor {
    state: ProcessorState,
    collaborators: Collaborators,
    metadata_path: PathBuf,
}

impl GroupProcessor {
    /// An empty `metadata_path` is accepted here and fails the asset when it is handled.
    ///
    /// 中文: 创建处理器；路径为空时在处理资产时失败。
    pub fn new(asset_id: &str, collaborators: Collaborators, metadata_path: PathBuf) -> Self {
        Self {
            state: ProcessorState::new(asset_id),
            collaborators,
            metadata_path,
        }
    }

    fn process(&self, asset: &Value) -> Result<()> {
        if self.metadata_path.as_os_str().is_empty() {
            return Err(Error::Storage("group metadata path is not configured".to_string()));
        }
        let metadata = BASE64.decode(required_str(asset, "metadata")?)?;

        write_atomic(&self.metadata_path, &metadata, None).map_err(|e| {
            Error::Storage(format!(
                "failed to write group metadata to {}: {}",
                self.metadata_path.display(),
                e
            ))
        })?;
        tracing::info!(
            asset_id = %self.state.asset_id(),
            path = %self.metadata_path.display(),
            bytes = metadata.len(),
            "group metadata stored"
        );
        Ok(())
    }
}

impl AssetProcessor for GroupProcessor {
    fn asset_id(&self) -> &str {
        self.state.asset_id()
    }

    fn handle_asset(
        &mut self,
        asset: &Value,
        _session: &SessionKey,
        _key_id: &str,
    ) -> Option<Duration> {
        let result = self.process(asset);
        let events = &self.collaborators.events;
        match &result {
            Ok(()) => events.notify_group_metadata_success(self.state.asset_id()),
            Err(e) => events.notify_group_metadata_failure(self.state.asset_id(), &e.to_string()),
        }
        self.state.finish(self.collaborators.messenger.as_ref(), result);
        None
    }

    fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    fn is_success(&self) -> bool {
        self.state.is_success()
    }

    fn error_message(&self) -> &str {
        self.state.error_message()
    }
}
