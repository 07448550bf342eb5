//! `certificateData` assets: generate a key pair on the device and have KeyScaler sign a CSR.
//!
//! The signed certificate arrives later as a `certificate` asset. Until then the processor
//! reports [`wait_for_certificate`](AssetProcessor::wait_for_certificate) so the worker polls
//! more often.

use super::Collaborators;
use super::certificate::CertificateProcessor;
use super::processor::{AssetProcessor, ProcessorState};
use crate::common::SessionKey;
use crate::common::config::StorageConfig;
use crate::crypto::{CsrBundle, CsrInstructions};
use crate::error::{Error, Result};
use crate::storage::{
    FilePersistence, KeyStorageStrategy, PlaintextStore, SessionEnvelopeStore, TpmEnvelopeStore,
};
use serde_json::Value;
use std::fs;
use std::time::Duration;

/// Generates a key pair, submits the CSR and parks the private key until the certificate
/// arrives.
///
/// 中文: 生成密钥对并提交 CSR，在证书到达前暂存私钥。
pub struct CertificateDataProcessor {
    state: ProcessorState,
    collaborators: Collaborators,
    storage: StorageConfig,
    waiting: bool,
}

impl CertificateDataProcessor {
    /// 中文: 为给定资产创建处理器。
    pub fn new(asset_id: &str, collaborators: Collaborators, storage: StorageConfig) -> Self {
        Self {
            state: ProcessorState::new(asset_id),
            collaborators,
            storage,
            waiting: false,
        }
    }

    fn submit(&self, instructions: &CsrInstructions, bundle: &CsrBundle) -> Result<()> {
        let messenger = self.collaborators.messenger.as_ref();
        let authorisation = messenger.identify_and_authorise()?;
        let reply = messenger.submit_csr_for_signing(
            &authorisation.da_json,
            &instructions.certificate_id,
            &bundle.csr_pem,
        )?;
        tracing::debug!(
            asset_id = %instructions.asset_id,
            reply = %reply,
            "CSR accepted for signing"
        );
        Ok(())
    }

    /// Runs exactly one storage strategy. Encrypted strategies write the interim file that the
    /// follow-up `certificate` asset promotes.
    fn store_private_key(
        &self,
        instructions: &CsrInstructions,
        private_key_pem: &[u8],
        session: &SessionKey,
        key_id: &str,
    ) -> Result<KeyStorageStrategy> {
        let authority = self.collaborators.authority.as_ref();
        let tpm = self.collaborators.tpm.as_ref();
        let permissions = self.storage.file_permissions;
        let interim_path = CertificateProcessor::interim_key_path(&instructions.private_key_path);

        let strategy = KeyStorageStrategy::select(
            instructions.store_encrypted,
            self.collaborators.key_provider.is_some(),
            tpm.is_available(),
        );
        match strategy {
            KeyStorageStrategy::Provider => match &self.collaborators.key_provider {
                Some(provider) => provider.store_private_key(instructions, private_key_pem)?,
                None => return Err(Error::Storage("no key storage provider".to_string())),
            },
            KeyStorageStrategy::Tpm => {
                TpmEnvelopeStore::new(authority, tpm, permissions)
                    .save(&interim_path, private_key_pem)?
            }
            KeyStorageStrategy::SessionEnvelope => SessionEnvelopeStore::new(
                authority,
                session,
                key_id,
                &instructions.asset_id,
                false,
                permissions,
            )
            .save(&interim_path, private_key_pem)?,
            KeyStorageStrategy::Plaintext => {
                PlaintextStore::new(permissions)
                    .save(&instructions.private_key_path, private_key_pem)?
            }
        }
        Ok(strategy)
    }

    fn process(&mut self, asset: &Value, session: &SessionKey, key_id: &str) -> Result<()> {
        let asset_id = self.state.asset_id().to_string();
        let events = self.collaborators.events.clone();

        let instructions = CsrInstructions::from_asset(asset)
            .inspect_err(|e| events.notify_csr_failure(&asset_id, &e.to_string()))?;

        if let Some(dir) = instructions.storage_dir() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                tracing::info!(path = %dir.display(), "creating certificate storage directory");
                fs::create_dir_all(dir)
                    .inspect_err(|e| events.notify_csr_failure(&asset_id, &e.to_string()))?;
            }
        }

        let generator = self.collaborators.csr_generator.clone().ok_or_else(|| {
            let e = Error::Crypto("no CSR generator available on this device".to_string());
            events.notify_csr_failure(&asset_id, &e.to_string());
            e
        })?;
        let bundle = generator
            .generate(&instructions)
            .inspect_err(|e| events.notify_csr_failure(&asset_id, &e.to_string()))?;

        self.submit(&instructions, &bundle)
            .inspect_err(|e| events.notify_csr_failure(&asset_id, &e.to_string()))?;
        events.notify_csr_submitted(&asset_id);
        self.waiting = true;

        let strategy = self
            .store_private_key(&instructions, bundle.private_key_pem.as_bytes(), session, key_id)
            .inspect_err(|e| events.notify_private_key_failure(&asset_id, &e.to_string()))?;
        tracing::info!(asset_id = %asset_id, ?strategy, "CSR private key stored");
        events.notify_private_key_stored(&asset_id);
        Ok(())
    }
}

impl AssetProcessor for CertificateDataProcessor {
    fn asset_id(&self) -> &str {
        self.state.asset_id()
    }

    fn handle_asset(
        &mut self,
        asset: &Value,
        session: &SessionKey,
        key_id: &str,
    ) -> Option<Duration> {
        let result = self.process(asset, session, key_id);
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

    fn wait_for_certificate(&self) -> bool {
        self.waiting && self.state.is_success()
    }
}
