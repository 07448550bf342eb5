use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 安全地比较两个字节序列，防止时序攻击
///
/// Always walks every byte; only a full match returns `true`.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0;
    for (byte_a, byte_b) in a.iter().zip(b.iter()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}

/// Session key material handed out by KeyScaler for one authorisation round.
///
/// Wiped from memory when dropped.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    pub key: Vec<u8>,
    pub iv: Vec<u8>,
}

impl SessionKey {
    pub fn new(key: impl Into<Vec<u8>>, iv: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            iv: iv.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("key", &"<redacted>")
            .field("iv_len", &self.iv.len())
            .finish()
    }
}

/// Writes `data` atomically: the bytes land in a sibling temp file which is then renamed
/// over `path`. On unix the given permissions are applied before the rename.
pub fn write_atomic(path: &Path, data: &[u8], permissions: Option<u32>) -> std::io::Result<()> {
    let temp_path = sibling_with_suffix(path, "tmp");
    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    #[cfg(unix)]
    if let Some(mode) = permissions {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&temp_path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = permissions;

    fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&temp_path);
    })
}

/// `/a/b/key.pem` + `interim` -> `/a/b/key.pem.interim`
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// A file that is deleted when this guard goes out of scope.
///
/// 中文: 离开作用域时自动删除的临时文件。
#[derive(Debug)]
pub struct TemporaryFile {
    path: TempPath,
}

impl TemporaryFile {
    /// Creates an empty, uniquely named file inside `dir`. The file name ends with the file
    /// name component of `name_hint`.
    pub fn new(dir: &Path, name_hint: &str) -> std::io::Result<Self> {
        let suffix = Path::new(name_hint)
            .file_name()
            .map(|name| format!("-{}", name.to_string_lossy()))
            .unwrap_or_default();
        let path = tempfile::Builder::new()
            .prefix("keyscaler")
            .suffix(&suffix)
            .tempfile_in(dir)?
            .into_temp_path();
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
