//! Device identity and cipher provider.
// 中文: 设备身份与对称加解密提供者。

use crate::error::{Error, Result};
use crate::message::{AuthenticationRequest, build_dfactor_auth_message};
use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const KEY_SIZE: usize = 32;
const IV_SIZE: usize = 16;

/// Direction of a symmetric cipher call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Encrypt,
    Decrypt,
}

/// Identity and crypto provider for this device.
///
/// In production this is backed by the device-key generation library; the agent only
/// relies on the operations below.
///
/// 中文: 设备身份与加密提供者。生产环境中由设备密钥生成库实现。
pub trait DeviceAuthority: Send + Sync {
    /// Produces the authentication request body sent to KeyScaler.
    fn identify_and_authorise(&self, user_agent: &str, edge_device: bool) -> Result<String>;

    /// AES with the session key and IV handed out by KeyScaler.
    fn cipher_aes(
        &self,
        key: &[u8],
        iv: &[u8],
        input: &[u8],
        mode: CipherMode,
    ) -> Result<Vec<u8>>;

    fn digest_sha256(&self, input: &[u8]) -> Vec<u8>;

    fn device_tid(&self) -> String;

    /// Unique device identifier.
    fn udi(&self) -> String;
}

/// Software implementation of [`DeviceAuthority`] using AES-256-CBC with PKCS#7 padding and
/// SHA-256.
///
/// Keys are 32 bytes and IVs one AES block (16 bytes).
///
/// 中文: 基于 AES-256-CBC（PKCS#7 填充）与 SHA-256 的软件实现。
#[derive(Debug, Clone)]
pub struct SoftwareAuthority {
    device_tid: String,
    udi: String,
    key_id: String,
    device_secret: Vec<u8>,
}

impl SoftwareAuthority {
    pub fn new(device_tid: &str, udi: &str, key_id: &str, device_secret: &[u8]) -> Self {
        Self {
            device_tid: device_tid.to_string(),
            udi: udi.to_string(),
            key_id: key_id.to_string(),
            device_secret: device_secret.to_vec(),
        }
    }

    fn check_sizes(key: &[u8], iv: &[u8]) -> Result<()> {
        if key.len() != KEY_SIZE {
            return Err(Error::Crypto(format!(
                "invalid key size: expected {}, got {}",
                KEY_SIZE,
                key.len()
            )));
        }
        if iv.len() != IV_SIZE {
            return Err(Error::Crypto(format!(
                "invalid IV size: expected {}, got {}",
                IV_SIZE,
                iv.len()
            )));
        }
        Ok(())
    }
}

impl DeviceAuthority for SoftwareAuthority {
    fn identify_and_authorise(&self, user_agent: &str, edge_device: bool) -> Result<String> {
        let mut seed = self.udi.as_bytes().to_vec();
        seed.extend_from_slice(&self.device_secret);
        let request = AuthenticationRequest {
            udi: self.udi.clone(),
            device_tid: self.device_tid.clone(),
            key_id: self.key_id.clone(),
            dfactor: hex::encode(self.digest_sha256(&seed)),
            user_agent: user_agent.to_string(),
            edge_device,
        };
        Ok(build_dfactor_auth_message(&request))
    }

    fn cipher_aes(
        &self,
        key: &[u8],
        iv: &[u8],
        input: &[u8],
        mode: CipherMode,
    ) -> Result<Vec<u8>> {
        Self::check_sizes(key, iv)?;
        match mode {
            CipherMode::Encrypt => Aes256CbcEnc::new_from_slices(key, iv)
                .map(|cipher| cipher.encrypt_padded_vec_mut::<Pkcs7>(input))
                .map_err(|e| Error::Crypto(e.to_string())),
            CipherMode::Decrypt => Aes256CbcDec::new_from_slices(key, iv)
                .map_err(|e| Error::Crypto(e.to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(input)
                .map_err(|_| Error::Crypto("AES decryption failed".to_string())),
        }
    }

    fn digest_sha256(&self, input: &[u8]) -> Vec<u8> {
        Sha256::digest(input).to_vec()
    }

    fn device_tid(&self) -> String {
        self.device_tid.clone()
    }

    fn udi(&self) -> String {
        self.udi.clone()
    }
}
