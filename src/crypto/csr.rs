//! Certificate signing request instructions and the generator interface.

use crate::error::{Error, Result};
use serde_json::Value;
use std::path::PathBuf;
use zeroize::Zeroizing;

/// Everything needed to create a CSR and later store its private key.
///
/// Built from a `certificateData` asset.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrInstructions {
    pub certificate_id: String,
    pub asset_id: String,
    pub common_name: String,
    pub private_key_path: PathBuf,
    pub store_encrypted: bool,
    pub is_ca: bool,
}

impl CsrInstructions {
    /// Reads and validates the mandatory fields of a `certificateData` asset.
    ///
    /// Checked in order: `filePath`, `commonName`, `certificateId`, `assetId`, `storeEncrypted`.
    /// The private key is placed at `<filePath>/<certificateId>.key`.
    pub fn from_asset(asset: &Value) -> Result<Self> {
        let file_path = non_empty_str(asset, "filePath")?;
        let common_name = non_empty_str(asset, "commonName")?;
        let certificate_id = non_empty_str(asset, "certificateId")?;
        let asset_id = non_empty_str(asset, "assetId")?;
        let store_encrypted = asset
            .get("storeEncrypted")
            .ok_or(Error::MissingField("storeEncrypted"))?
            .as_bool()
            .ok_or_else(|| Error::InvalidField {
                field: "storeEncrypted",
                reason: "expected a boolean".to_string(),
            })?;
        let is_ca = asset.get("isCa").and_then(Value::as_bool).unwrap_or(false);

        Ok(Self {
            private_key_path: PathBuf::from(file_path).join(format!("{}.key", certificate_id)),
            certificate_id: certificate_id.to_string(),
            asset_id: asset_id.to_string(),
            common_name: common_name.to_string(),
            store_encrypted,
            is_ca,
        })
    }

    /// Directory that has to exist before the key can be written.
    pub fn storage_dir(&self) -> Option<&std::path::Path> {
        self.private_key_path.parent()
    }
}

fn non_empty_str<'a>(asset: &'a Value, field: &'static str) -> Result<&'a str> {
    match asset.get(field).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::MissingField(field)),
    }
}

/// A freshly generated key pair and the PEM-encoded request for it.
pub struct CsrBundle {
    pub csr_pem: String,
    pub private_key_pem: Zeroizing<String>,
}

/// Generates key pairs and PKCS#10 requests; supplied by the platform crypto library.
pub trait CsrGenerator: Send + Sync {
    fn generate(&self, instructions: &CsrInstructions) -> Result<CsrBundle>;
}
