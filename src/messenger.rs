//! Transport abstraction used by the asset processors.
// 中文: 资产处理器使用的传输抽象。

use crate::common::SessionKey;
use crate::error::Result;
use std::path::Path;

/// Result of a successful KeyScaler authorisation.
#[derive(Debug, Clone, Default)]
pub struct Authorisation {
    /// Raw authorisation response; carries the `assets` array.
    pub da_json: String,
    pub key_id: String,
    pub session: SessionKey,
    /// Informational message returned by the service.
    pub message: String,
}

/// Talks to KeyScaler on behalf of the processors.
///
/// Two transports exist in the field (HTTP POST and MQTT publish); processors do not care
/// which one is behind this trait. Implementations are only ever called from the worker
/// thread, so they need not be internally synchronised beyond `Send + Sync` for sharing.
///
/// Errors are returned as [`Error::Transport`](crate::Error::Transport) carrying the
/// service's message.
pub trait AssetMessenger: Send + Sync {
    fn identify_and_authorise(&self) -> Result<Authorisation>;

    /// Posts a delivery-status acknowledgement; returns the service's reply message.
    fn acknowledge_receipt(&self, json: &str) -> Result<String>;

    /// Posts the per-account APM password batch.
    fn acknowledge_apm_receipt(&self, json: &str) -> Result<String>;

    fn submit_csr_for_signing(
        &self,
        auth_json: &str,
        certificate_id: &str,
        csr: &str,
    ) -> Result<String>;

    /// Requests the key material identified by the `key-id` of a stored cloud envelope, so
    /// that envelopes written under an earlier session can still be opened. With
    /// `sign_apphash` the request carries a signed application hash.
    ///
    /// 中文: 按云端信封中的 `key-id` 重新获取密钥材料，用于打开早先会话写入的信封。
    fn request_envelope_key(&self, key_id: &str, sign_apphash: bool) -> Result<SessionKey>;

    /// Downloads `url` to `dest_path`.
    fn fetch_file(&self, url: &str, dest_path: &Path) -> Result<()>;

    fn send_script_output(&self, script_id: &str, topic: &str, output: &str) -> Result<()>;
}
