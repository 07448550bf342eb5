//! Plaintext storage implementation for `FilePersistence`.
// 中文: `FilePersistence` 的明文存储实现。

use super::traits::FilePersistence;
use crate::common::utils::write_atomic;
use crate::error::Result;
use std::fs;
use std::path::Path;

/// A persistence strategy that writes the bytes as they are.
///
/// Used when an asset arrives with `storeEncrypted=false`. The file is still written
/// atomically and with restrictive permissions.
///
/// 中文: 按原样写入字节的持久化策略，用于 `storeEncrypted=false` 的资产。
pub struct PlaintextStore {
    permissions: u32,
}

impl PlaintextStore {
    pub fn new(permissions: u32) -> Self {
        Self { permissions }
    }
}

impl FilePersistence for PlaintextStore {
    fn save(&self, path: &Path, data: &[u8]) -> Result<()> {
        write_atomic(path, data, Some(self.permissions))?;
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path)?)
    }

    fn is_encrypted(&self) -> bool {
        false
    }
}
