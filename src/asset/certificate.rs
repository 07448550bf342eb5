//! `certificate` assets: a signed certificate, optionally with its private key.
//!
//! Expected members: `assetId`, `certificateId`, `filePath` (directory), `certificate`
//! (base64 ciphertext), and optionally `privateKey` (base64 ciphertext), `storeEncrypted`,
//! `signAppHash`.
//!
//! Files land in `<filePath>/<certificateId>.pem` and `<filePath>/<certificateId>.key`.
//! When no private key is delivered inline, the interim key left behind by a
//! `certificateData` asset (`<certificateId>.key.interim`) is decrypted and promoted to the
//! final key file. A cloud-enveloped interim was sealed under an earlier session, so its key
//! material is requested again by the envelope's `key-id`.
//!
//! The certificate is stored before the private key is looked at; a key that cannot be
//! promoted fails the asset but leaves the stored certificate and the interim file in place.

use super::Collaborators;
use super::processor::{AssetProcessor, ProcessorState, flag, optional_str, required_str};
use crate::common::SessionKey;
use crate::common::config::StorageConfig;
use crate::common::utils::sibling_with_suffix;
use crate::crypto::CipherMode;
use crate::envelope::{self, Envelope, StoredEnvelope};
use crate::error::{Error, Result};
use crate::storage::{
    CertificateTarget, FilePersistence, PlaintextStore, SessionEnvelopeStore, TpmEnvelopeStore,
};
use crate::tpm::tpm_seal_path;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroizing;

/// Where the private key for this certificate came from.
enum KeySource {
    Inline(Zeroizing<Vec<u8>>),
    /// Promoted from the interim file; carries the CSR asset id recorded in its envelope.
    Interim {
        key: Zeroizing<Vec<u8>>,
        csr_asset_id: String,
        tpm_sealed: bool,
    },
    None,
}

/// Everything that decides how one asset's files are written.
struct Placement<'a> {
    target: CertificateTarget,
    session: &'a SessionKey,
    key_id: &'a str,
    sign_apphash: bool,
    certificate_id: &'a str,
}

/// Stores a delivered certificate and its private key.
///
/// 中文: 存储下发的证书及其私钥。
pub struct CertificateProcessor {
    state: ProcessorState,
    collaborators: Collaborators,
    storage: StorageConfig,
    received: bool,
}

impl CertificateProcessor {
    /// 中文: 为给定资产创建处理器。
    pub fn new(asset_id: &str, collaborators: Collaborators, storage: StorageConfig) -> Self {
        Self {
            state: ProcessorState::new(asset_id),
            collaborators,
            storage,
            received: false,
        }
    }

    /// `<dir>/<certificateId>.pem`
    ///
    /// 中文: 证书文件路径。
    pub fn certificate_path(dir: &Path, certificate_id: &str) -> PathBuf {
        dir.join(format!("{}.pem", certificate_id))
    }

    /// `<dir>/<certificateId>.key`
    ///
    /// 中文: 私钥文件路径。
    pub fn private_key_path(dir: &Path, certificate_id: &str) -> PathBuf {
        dir.join(format!("{}.key", certificate_id))
    }

    /// The file a CSR round trip parks its private key in until the certificate arrives.
    ///
    /// 中文: CSR 流程中等待证书期间暂存私钥的中间文件路径。
    pub fn interim_key_path(private_key_path: &Path) -> PathBuf {
        sibling_with_suffix(private_key_path, "interim")
    }

    fn decrypt_member(
        &self,
        asset: &Value,
        field: &'static str,
        session: &SessionKey,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let ciphertext = BASE64.decode(required_str(asset, field)?)?;
        let plaintext = self.collaborators.authority.cipher_aes(
            &session.key,
            &session.iv,
            &ciphertext,
            CipherMode::Decrypt,
        )?;
        Ok(Zeroizing::new(plaintext))
    }

    fn open_cloud_interim(&self, cloud: &Envelope) -> Result<Zeroizing<Vec<u8>>> {
        tracing::debug!(
            asset_id = %self.state.asset_id(),
            key_id = %cloud.key_id,
            "requesting interim key material"
        );
        let interim_session = self
            .collaborators
            .messenger
            .request_envelope_key(&cloud.key_id, cloud.sign_apphash)?;
        let key = self.collaborators.authority.cipher_aes(
            &interim_session.key,
            &interim_session.iv,
            &cloud.ciphertext,
            CipherMode::Decrypt,
        )?;
        Ok(Zeroizing::new(key))
    }

    fn load_private_key(
        &self,
        asset: &Value,
        session: &SessionKey,
        key_path: &Path,
    ) -> Result<KeySource> {
        if optional_str(asset, "privateKey").is_some() {
            return Ok(KeySource::Inline(self.decrypt_member(asset, "privateKey", session)?));
        }

        let interim_path = Self::interim_key_path(key_path);
        if !interim_path.exists() {
            return Ok(KeySource::None);
        }
        tracing::debug!(
            asset_id = %self.state.asset_id(),
            path = %interim_path.display(),
            "promoting interim private key"
        );

        let text = fs::read_to_string(&interim_path)?;
        match StoredEnvelope::decode(&text)? {
            StoredEnvelope::Cloud(cloud) => Ok(KeySource::Interim {
                key: self.open_cloud_interim(&cloud)?,
                csr_asset_id: cloud.asset_id,
                tpm_sealed: false,
            }),
            StoredEnvelope::Tpm(sealed) => {
                let key = envelope::open_with_tpm(
                    self.collaborators.authority.as_ref(),
                    self.collaborators.tpm.as_ref(),
                    &interim_path,
                    &sealed,
                )?;
                Ok(KeySource::Interim {
                    key: Zeroizing::new(key),
                    csr_asset_id: String::new(),
                    tpm_sealed: true,
                })
            }
        }
    }

    fn process(&mut self, asset: &Value, session: &SessionKey, key_id: &str) -> Result<()> {
        // Validation
        let certificate_id = required_str(asset, "certificateId")?;
        let dir = PathBuf::from(required_str(asset, "filePath")?);
        required_str(asset, "certificate")?;
        let store_encrypted = flag(asset, "storeEncrypted");
        let sign_apphash = flag(asset, "signAppHash");

        let asset_id = self.state.asset_id().to_string();
        let events = self.collaborators.events.clone();
        let certificate_path = Self::certificate_path(&dir, certificate_id);
        let key_path = Self::private_key_path(&dir, certificate_id);

        // Certificate
        let certificate = self
            .decrypt_member(asset, "certificate", session)
            .inspect_err(|e| events.notify_certificate_failure(&asset_id, &e.to_string()))?;
        events.notify_certificate_received(&asset_id);
        self.received = true;

        fs::create_dir_all(&dir)
            .inspect_err(|e| events.notify_certificate_failure(&asset_id, &e.to_string()))?;

        let placement = Placement {
            target: CertificateTarget::select(
                store_encrypted,
                self.storage.use_certificate_store
                    && self.collaborators.certificate_store.is_some(),
                self.collaborators.tpm.is_available(),
            ),
            session,
            key_id,
            sign_apphash,
            certificate_id,
        };
        tracing::debug!(asset_id = %asset_id, target = ?placement.target, "storing certificate");

        self.store(&placement, &certificate_path, &certificate, "", false)
            .inspect_err(|e| events.notify_certificate_failure(&asset_id, &e.to_string()))?;
        events.notify_certificate_stored(&asset_id);

        // Private key
        let key_source = self
            .load_private_key(asset, session, &key_path)
            .inspect_err(|e| events.notify_private_key_failure(&asset_id, &e.to_string()))?;
        let (key, csr_asset_id, interim) = match &key_source {
            KeySource::Inline(key) => (key, "", None),
            KeySource::Interim {
                key,
                csr_asset_id,
                tpm_sealed,
            } => (key, csr_asset_id.as_str(), Some(*tpm_sealed)),
            KeySource::None => return Ok(()),
        };
        events.notify_private_key_received(&asset_id);

        self.store(&placement, &key_path, key, csr_asset_id, true)
            .inspect_err(|e| events.notify_private_key_failure(&asset_id, &e.to_string()))?;
        events.notify_private_key_stored(&asset_id);

        if let Some(tpm_sealed) = interim {
            self.remove_interim(&key_path, tpm_sealed);
        }
        Ok(())
    }

    fn remove_interim(&self, key_path: &Path, tpm_sealed: bool) {
        let interim_path = Self::interim_key_path(key_path);
        if let Err(e) = fs::remove_file(&interim_path) {
            tracing::warn!(
                path = %interim_path.display(),
                error = %e,
                "failed to remove interim private key"
            );
        }
        if tpm_sealed {
            let seal_path = tpm_seal_path(&interim_path);
            if let Err(e) = self.collaborators.tpm.delete_key(&seal_path) {
                tracing::warn!(
                    seal_path = %seal_path,
                    error = %e,
                    "failed to delete sealed interim key"
                );
            }
        }
    }

    fn store(
        &self,
        placement: &Placement<'_>,
        path: &Path,
        data: &[u8],
        asset_id: &str,
        is_private_key: bool,
    ) -> Result<()> {
        let authority = self.collaborators.authority.as_ref();
        let permissions = self.storage.file_permissions;
        match placement.target {
            CertificateTarget::Plaintext => PlaintextStore::new(permissions).save(path, data),
            CertificateTarget::Tpm => {
                TpmEnvelopeStore::new(authority, self.collaborators.tpm.as_ref(), permissions)
                    .save(path, data)
            }
            CertificateTarget::SessionEnvelope => SessionEnvelopeStore::new(
                authority,
                placement.session,
                placement.key_id,
                asset_id,
                placement.sign_apphash,
                permissions,
            )
            .save(path, data),
            CertificateTarget::CertificateStore => {
                let store = self
                    .collaborators
                    .certificate_store
                    .as_ref()
                    .ok_or_else(|| Error::Storage("no certificate store available".to_string()))?;
                if is_private_key {
                    store.import_private_key(placement.certificate_id, data)
                } else {
                    store.import_certificate(placement.certificate_id, data)
                }
            }
        }
    }
}

impl AssetProcessor for CertificateProcessor {
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

    fn certificate_received(&self) -> bool {
        self.received
    }
}
