//! The encrypted JSON block exchanged with KeyScaler and written to local storage.
//!
//! Two shapes exist:
//!
//! - [`Envelope`]: `{"key-id", "asset-id"?, "ciphertext", "sign-apphash"}`. The symmetric key
//!   lives in the cloud and is identified by `key-id`.
//! - [`TpmEnvelope`]: `{"ciphertext", "iv"}`. The symmetric key is sealed in the local TPM under
//!   a path derived from the storage file path and never appears in the document.
//!
//! Ciphertext and IV bytes are carried base64-encoded.
//!
//! Decoding is a two-step algorithm: the text is first parsed as JSON directly, and if that
//! fails it is base64-decoded and parsed again. Older storage paths persisted the envelope
//! base64-wrapped, newer ones write it bare; both are accepted indefinitely, new data is always
//! written bare.
//!
//! 中文: 与 KeyScaler 交换并写入本地存储的加密 JSON 块。解码分两步：先直接解析 JSON，
//! 失败后再对整体做 base64 解码并重新解析。

use crate::common::SessionKey;
use crate::crypto::{CipherMode, DeviceAuthority};
use crate::error::{Error, Result};
use crate::tpm::{TpmWrapper, tpm_seal_path};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

const TPM_KEY_SIZE: usize = 32;
const TPM_IV_SIZE: usize = 16;

mod b64 {
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        BASE64.decode(text.trim()).map_err(serde::de::Error::custom)
    }
}

/// Cloud-keyed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "key-id", default)]
    pub key_id: String,
    /// Only present for keys that originated from a CSR.
    #[serde(rename = "asset-id", default, skip_serializing_if = "String::is_empty")]
    pub asset_id: String,
    #[serde(with = "b64", default)]
    pub ciphertext: Vec<u8>,
    /// Whether an application hash must be signed when the key material is requested later.
    #[serde(rename = "sign-apphash", default)]
    pub sign_apphash: bool,
}

impl Envelope {
    pub fn new(key_id: &str, asset_id: &str, ciphertext: Vec<u8>, sign_apphash: bool) -> Self {
        Self {
            key_id: key_id.to_string(),
            asset_id: asset_id.to_string(),
            ciphertext,
            sign_apphash,
        }
    }

    /// Serializes to the canonical (unwrapped) JSON form. `asset-id` is omitted when empty.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes either a bare or a base64-wrapped envelope.
    ///
    /// # Errors
    /// `MissingField` when `key-id` or `ciphertext` is absent or empty.
    pub fn decode(text: &str) -> Result<Self> {
        let envelope: Self = decode_two_step(text)?;
        if envelope.key_id.is_empty() {
            return Err(Error::MissingField("key-id"));
        }
        if envelope.ciphertext.is_empty() {
            return Err(Error::MissingField("ciphertext"));
        }
        Ok(envelope)
    }
}

/// TPM-keyed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpmEnvelope {
    #[serde(with = "b64", default)]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64", default)]
    pub iv: Vec<u8>,
}

impl TpmEnvelope {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        let envelope: Self = decode_two_step(text)?;
        if envelope.ciphertext.is_empty() {
            return Err(Error::MissingField("ciphertext"));
        }
        if envelope.iv.is_empty() {
            return Err(Error::MissingField("iv"));
        }
        Ok(envelope)
    }
}

/// Either kind of envelope, as found in a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredEnvelope {
    Cloud(Envelope),
    Tpm(TpmEnvelope),
}

impl StoredEnvelope {
    pub fn decode(text: &str) -> Result<Self> {
        match Envelope::decode(text) {
            Ok(envelope) => Ok(Self::Cloud(envelope)),
            Err(cloud_err) => TpmEnvelope::decode(text).map(Self::Tpm).map_err(|_| cloud_err),
        }
    }
}

fn decode_two_step<T: DeserializeOwned>(text: &str) -> Result<T> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::Format("empty envelope".to_string()));
    }
    match serde_json::from_str::<T>(text) {
        Ok(value) => Ok(value),
        Err(direct_err) => {
            let unwrapped = BASE64.decode(text).map_err(|_| {
                Error::Deserialize(format!("envelope is neither JSON nor base64: {}", direct_err))
            })?;
            serde_json::from_slice(&unwrapped).map_err(|e| Error::Deserialize(e.to_string()))
        }
    }
}

/// Encrypts `plaintext` with the session key and wraps it in a cloud envelope.
pub fn seal_with_session_key(
    authority: &dyn DeviceAuthority,
    session: &SessionKey,
    key_id: &str,
    asset_id: &str,
    plaintext: &[u8],
    sign_apphash: bool,
) -> Result<String> {
    if key_id.is_empty() {
        return Err(Error::MissingField("key-id"));
    }
    let ciphertext =
        authority.cipher_aes(&session.key, &session.iv, plaintext, CipherMode::Encrypt)?;
    Envelope::new(key_id, asset_id, ciphertext, sign_apphash).encode()
}

/// Decodes a cloud envelope and decrypts its ciphertext with `session`.
pub fn open_with_session_key(
    authority: &dyn DeviceAuthority,
    session: &SessionKey,
    text: &str,
) -> Result<(Envelope, Vec<u8>)> {
    let envelope = Envelope::decode(text)?;
    let plaintext = authority.cipher_aes(
        &session.key,
        &session.iv,
        &envelope.ciphertext,
        CipherMode::Decrypt,
    )?;
    Ok((envelope, plaintext))
}

/// Encrypts `plaintext` under a fresh TPM-generated key, seals that key at the path derived
/// from `file_path` and returns the encoded [`TpmEnvelope`].
pub fn seal_with_tpm(
    authority: &dyn DeviceAuthority,
    tpm: &dyn TpmWrapper,
    file_path: &Path,
    plaintext: &[u8],
) -> Result<String> {
    let key = zeroize::Zeroizing::new(tpm.get_random(TPM_KEY_SIZE)?);
    let iv = tpm.get_random(TPM_IV_SIZE)?;
    let ciphertext = authority.cipher_aes(&key, &iv, plaintext, CipherMode::Encrypt)?;
    tpm.create_seal(&tpm_seal_path(file_path), &key, true)?;
    TpmEnvelope { ciphertext, iv }.encode()
}

/// Reverses [`seal_with_tpm`] for the envelope stored at `file_path`.
pub fn open_with_tpm(
    authority: &dyn DeviceAuthority,
    tpm: &dyn TpmWrapper,
    file_path: &Path,
    envelope: &TpmEnvelope,
) -> Result<Vec<u8>> {
    let key = zeroize::Zeroizing::new(tpm.unseal(&tpm_seal_path(file_path))?);
    authority.cipher_aes(&key, &envelope.iv, &envelope.ciphertext, CipherMode::Decrypt)
}
