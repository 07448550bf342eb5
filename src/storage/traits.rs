//! Traits for abstracting storage operations.
// 中文: 用于抽象存储操作的 Trait。

use crate::crypto::CsrInstructions;
use crate::error::Result;
use std::path::Path;

/// Defines the universal interface for persisting credential material to a file.
///
/// This trait abstracts saving (`save`) and loading (`load`) of certificate and key bytes.
/// It decouples the asset processors from whether the file ends up in plaintext, inside a
/// cloud-keyed envelope or inside a TPM-keyed envelope.
///
/// 中文: 定义了将凭据材料持久化到文件的通用接口。
///
/// 它将资产处理器与文件最终以明文、云端密钥信封还是 TPM 密钥信封存储解耦。
pub trait FilePersistence {
    /// Writes `data` to `path` in the representation this strategy stands for.
    ///
    /// 中文: 以该策略对应的表示形式将 `data` 写入 `path`。
    fn save(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Reads back and, if needed, decrypts what [`save`](Self::save) wrote.
    ///
    /// 中文: 读取并在需要时解密 `save` 写入的内容。
    fn load(&self, path: &Path) -> Result<Vec<u8>>;

    /// Returns `true` if the persistence strategy uses encryption.
    ///
    /// 中文: 如果持久化策略使用加密，则返回 `true`。
    fn is_encrypted(&self) -> bool;
}

/// Platform certificate store (Windows CertStore/NCrypt and the like).
pub trait CertificateStore: Send + Sync {
    fn import_certificate(&self, certificate_id: &str, certificate_pem: &[u8]) -> Result<()>;

    fn import_private_key(&self, certificate_id: &str, private_key_pem: &[u8]) -> Result<()>;
}

/// Custom private key storage provider, such as an OpenSSL provider module.
pub trait KeyStorageProvider: Send + Sync {
    fn store_private_key(
        &self,
        instructions: &CsrInstructions,
        private_key_pem: &[u8],
    ) -> Result<()>;
}
