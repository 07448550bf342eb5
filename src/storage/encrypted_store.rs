//! Encrypted storage implementations for `FilePersistence`.
// 中文: `FilePersistence` 的加密存储实现。

use super::traits::FilePersistence;
use crate::common::SessionKey;
use crate::common::utils::write_atomic;
use crate::crypto::DeviceAuthority;
use crate::envelope::{self, TpmEnvelope};
use crate::error::Result;
use crate::tpm::TpmWrapper;
use std::fs;
use std::path::Path;

/// A persistence strategy that encrypts with the KeyScaler session key and writes the
/// resulting cloud envelope.
///
/// The key never touches the disk; `key-id` tells the service which key to hand out when the
/// file has to be opened again.
///
/// 中文: 使用 KeyScaler 会话密钥加密并写入云端信封的持久化策略。
pub struct SessionEnvelopeStore<'a> {
    authority: &'a dyn DeviceAuthority,
    session: &'a SessionKey,
    key_id: &'a str,
    asset_id: &'a str,
    sign_apphash: bool,
    permissions: u32,
}

impl<'a> SessionEnvelopeStore<'a> {
    pub fn new(
        authority: &'a dyn DeviceAuthority,
        session: &'a SessionKey,
        key_id: &'a str,
        asset_id: &'a str,
        sign_apphash: bool,
        permissions: u32,
    ) -> Self {
        Self {
            authority,
            session,
            key_id,
            asset_id,
            sign_apphash,
            permissions,
        }
    }
}

impl FilePersistence for SessionEnvelopeStore<'_> {
    fn save(&self, path: &Path, data: &[u8]) -> Result<()> {
        let text = envelope::seal_with_session_key(
            self.authority,
            self.session,
            self.key_id,
            self.asset_id,
            data,
            self.sign_apphash,
        )?;
        write_atomic(path, text.as_bytes(), Some(self.permissions))?;
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        let text = fs::read_to_string(path)?;
        let (_, plaintext) = envelope::open_with_session_key(self.authority, self.session, &text)?;
        Ok(plaintext)
    }

    fn is_encrypted(&self) -> bool {
        true
    }
}

/// A persistence strategy that encrypts under a TPM-sealed key.
///
/// Each file gets its own random key, sealed at the TPM path derived from the file path.
///
/// 中文: 使用 TPM 密封密钥加密的持久化策略。每个文件拥有独立的随机密钥。
pub struct TpmEnvelopeStore<'a> {
    authority: &'a dyn DeviceAuthority,
    tpm: &'a dyn TpmWrapper,
    permissions: u32,
}

impl<'a> TpmEnvelopeStore<'a> {
    pub fn new(
        authority: &'a dyn DeviceAuthority,
        tpm: &'a dyn TpmWrapper,
        permissions: u32,
    ) -> Self {
        Self {
            authority,
            tpm,
            permissions,
        }
    }
}

impl FilePersistence for TpmEnvelopeStore<'_> {
    fn save(&self, path: &Path, data: &[u8]) -> Result<()> {
        let text = envelope::seal_with_tpm(self.authority, self.tpm, path, data)?;
        write_atomic(path, text.as_bytes(), Some(self.permissions))?;
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        let text = fs::read_to_string(path)?;
        let envelope = TpmEnvelope::decode(&text)?;
        envelope::open_with_tpm(self.authority, self.tpm, path, &envelope)
    }

    fn is_encrypted(&self) -> bool {
        true
    }
}
