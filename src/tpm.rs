//! TPM sealing interface.
//!
//! A device without a TPM is a normal configuration: callers check
//! [`TpmWrapper::is_available`] and pick another storage strategy.

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Low-level TPM2 operations used for local key sealing.
pub trait TpmWrapper: Send + Sync {
    fn is_available(&self) -> bool;

    fn get_random(&self, len: usize) -> Result<Vec<u8>>;

    /// Seals `data` under `path`. Fails if an object exists there and `overwrite` is false.
    fn create_seal(&self, path: &str, data: &[u8], overwrite: bool) -> Result<()>;

    fn unseal(&self, path: &str) -> Result<Vec<u8>>;

    fn delete_key(&self, path: &str) -> Result<()>;
}

/// Stand-in used on devices without a TPM.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTpm;

impl TpmWrapper for NoTpm {
    fn is_available(&self) -> bool {
        false
    }

    fn get_random(&self, _len: usize) -> Result<Vec<u8>> {
        Err(crate::Error::Tpm("no TPM present".to_string()))
    }

    fn create_seal(&self, _path: &str, _data: &[u8], _overwrite: bool) -> Result<()> {
        Err(crate::Error::Tpm("no TPM present".to_string()))
    }

    fn unseal(&self, _path: &str) -> Result<Vec<u8>> {
        Err(crate::Error::Tpm("no TPM present".to_string()))
    }

    fn delete_key(&self, _path: &str) -> Result<()> {
        Err(crate::Error::Tpm("no TPM present".to_string()))
    }
}

/// The TPM object path holding the symmetric key for a file stored at `file_path`.
pub fn tpm_seal_path(file_path: &Path) -> String {
    let mut path = PathBuf::from("/keyscaler/seal");
    for component in file_path.components() {
        if let std::path::Component::Normal(part) = component {
            path.push(part);
        }
    }
    path.to_string_lossy().replace('\\', "/")
}
