//! The storage module, defining how certificates and private keys are persisted.
// 中文: 存储模块，定义证书与私钥的持久化方式。

pub mod encrypted_store;
pub mod plaintext_store;
pub mod traits;

pub use encrypted_store::{SessionEnvelopeStore, TpmEnvelopeStore};
pub use plaintext_store::PlaintextStore;
pub use traits::{CertificateStore, FilePersistence, KeyStorageProvider};

/// Where a CSR-generated private key goes. Exactly one strategy runs per asset and a failing
/// strategy is never retried with another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStorageStrategy {
    /// Custom storage provider configured on the device.
    Provider,
    /// Encrypted under a TPM-sealed key.
    Tpm,
    /// Encrypted with the KeyScaler session key (cloud envelope).
    SessionEnvelope,
    Plaintext,
}

impl KeyStorageStrategy {
    pub fn select(store_encrypted: bool, provider_available: bool, tpm_available: bool) -> Self {
        if provider_available {
            Self::Provider
        } else if store_encrypted && tpm_available {
            Self::Tpm
        } else if store_encrypted {
            Self::SessionEnvelope
        } else {
            Self::Plaintext
        }
    }
}

/// Where a delivered certificate (and its key) goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateTarget {
    Plaintext,
    CertificateStore,
    Tpm,
    SessionEnvelope,
}

impl CertificateTarget {
    pub fn select(
        store_encrypted: bool,
        certificate_store_available: bool,
        tpm_available: bool,
    ) -> Self {
        match (store_encrypted, certificate_store_available, tpm_available) {
            (false, _, _) => Self::Plaintext,
            (true, true, _) => Self::CertificateStore,
            (true, false, true) => Self::Tpm,
            (true, false, false) => Self::SessionEnvelope,
        }
    }
}
