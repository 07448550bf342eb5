//! `script` and `codeSigning` assets: verified remote execution.
//!
//! ```json
//! {"assetId": "...", "scriptId": "...", "recipe": "<base64 ciphertext>",
//!  "signature": "<base64>", "publicKey": "<PEM>", "outputTopic": "...",
//!  "fileUrl": "...", "fileName": "..."}
//! ```
//!
//! The recipe decrypts to a base64 string. Its RSA/SHA-256 signature is checked against the
//! supplied public key before anything else happens; only then is it decoded to the script
//! text. `codeSigning` assets that reference a target file download `fileUrl` first and expose
//! the local copy to the script as `KEYSCALER_TARGET_FILE`.
//!
//! The script runs on its own thread. [`update`](AssetProcessor::update) polls the result
//! channel without blocking; dropping an unfinished processor cancels the script and does not
//! wait for it.

use super::Collaborators;
use super::processor::{AssetProcessor, ProcessorState, optional_str, required_str};
use crate::common::config::AgentConfig;
use crate::common::{SessionKey, TemporaryFile};
use crate::crypto::{CipherMode, verify_recipe_signature};
use crate::error::{Error, Result};
use crate::executor::{CancelFlag, ScriptOutput, ScriptRequest};
use crate::message::{build_script_result_message, merge_json};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::Value;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

pub const TARGET_FILE_ENV: &str = "KEYSCALER_TARGET_FILE";
pub const VERIFY_FAILURE: &str = "Failed to verify recipe";

/// Which asset type a [`ScriptProcessor`] handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Script,
    CodeSigning,
}

struct RunningScript {
    result: Receiver<Result<ScriptOutput>>,
    cancel: CancelFlag,
}

/// Verifies a signed recipe and runs it on a background thread.
///
/// 中文: 校验签名脚本并在后台线程中执行。
pub struct ScriptProcessor {
    kind: ScriptKind,
    state: ProcessorState,
    collaborators: Collaborators,
    config: AgentConfig,
    script_id: String,
    output_topic: String,
    running: Option<RunningScript>,
    target_file: Option<TemporaryFile>,
}

impl ScriptProcessor {
    /// Processor for a `script` asset.
    ///
    /// 中文: 处理 `script` 资产。
    pub fn script(asset_id: &str, collaborators: Collaborators, config: AgentConfig) -> Self {
        Self::new(ScriptKind::Script, asset_id, collaborators, config)
    }

    /// Processor for a `codeSigning` asset, which may carry a target file to download.
    ///
    /// 中文: 处理 `codeSigning` 资产，可附带需下载的目标文件。
    pub fn code_signing(asset_id: &str, collaborators: Collaborators, config: AgentConfig) -> Self {
        Self::new(ScriptKind::CodeSigning, asset_id, collaborators, config)
    }

    fn new(
        kind: ScriptKind,
        asset_id: &str,
        collaborators: Collaborators,
        config: AgentConfig,
    ) -> Self {
        Self {
            kind,
            state: ProcessorState::new(asset_id),
            collaborators,
            config,
            script_id: asset_id.to_string(),
            output_topic: String::new(),
            running: None,
            target_file: None,
        }
    }

    /// 中文: 处理器类型。
    pub fn kind(&self) -> ScriptKind {
        self.kind
    }

    /// The script has been started and its result has not been collected yet.
    ///
    /// 中文: 脚本已启动且尚未收到结果。
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Decrypts the recipe, verifies its signature and returns the script text.
    fn verified_script(&self, asset: &Value, session: &SessionKey) -> Result<String> {
        let ciphertext = BASE64.decode(required_str(asset, "recipe")?)?;
        let signature = BASE64.decode(required_str(asset, "signature")?)?;
        let public_key = required_str(asset, "publicKey")?;

        let recipe = self.collaborators.authority.cipher_aes(
            &session.key,
            &session.iv,
            &ciphertext,
            CipherMode::Decrypt,
        )?;
        let recipe = String::from_utf8(recipe)?;
        let recipe = recipe.trim();

        verify_recipe_signature(public_key, recipe.as_bytes(), &signature).map_err(|e| {
            tracing::warn!(
                asset_id = %self.state.asset_id(),
                error = %e,
                "recipe signature rejected"
            );
            Error::Signature(VERIFY_FAILURE.to_string())
        })?;

        Ok(String::from_utf8(BASE64.decode(recipe)?)?)
    }

    fn prepare(&mut self, asset: &Value, session: &SessionKey) -> Result<ScriptRequest> {
        if let Some(script_id) = optional_str(asset, "scriptId") {
            self.script_id = script_id.to_string();
        }
        self.output_topic = optional_str(asset, "outputTopic").unwrap_or_default().to_string();
        let file_url = match self.kind {
            ScriptKind::CodeSigning => optional_str(asset, "fileUrl"),
            ScriptKind::Script => None,
        };

        let script = self.verified_script(asset, session)?;
        let mut request = ScriptRequest {
            script,
            env: Vec::new(),
        };

        if let Some(url) = file_url {
            let name_hint = optional_str(asset, "fileName").unwrap_or("target");
            let target = TemporaryFile::new(&self.config.storage.temp_dir, name_hint)?;
            self.collaborators.messenger.fetch_file(url, target.path())?;
            request.env.push((
                TARGET_FILE_ENV.to_string(),
                target.path().to_string_lossy().into_owned(),
            ));
            self.target_file = Some(target);
        }
        Ok(request)
    }

    fn spawn(&mut self, request: ScriptRequest) {
        let (sender, receiver) = mpsc::channel();
        let cancel = CancelFlag::new();
        let executor = self.collaborators.executor.clone();
        let worker_cancel = cancel.clone();
        let asset_id = self.state.asset_id().to_string();

        let spawned = thread::Builder::new()
            .name(format!("script-{}", asset_id))
            .spawn(move || {
                let result = executor.execute(&request, &worker_cancel);
                // The processor may be gone already; nobody is left to tell.
                let _ = sender.send(result);
            });

        match spawned {
            Ok(_) => {
                tracing::info!(asset_id = %asset_id, kind = ?self.kind, "script started");
                self.collaborators.events.notify_script_started(&asset_id);
                self.running = Some(RunningScript {
                    result: receiver,
                    cancel,
                });
            }
            Err(e) => self.fail(Error::Script(format!("failed to start script thread: {}", e))),
        }
    }

    fn fail(&mut self, error: Error) {
        let message = error.to_string();
        self.collaborators
            .events
            .notify_script_failure(self.state.asset_id(), &message);
        self.state.finish(self.collaborators.messenger.as_ref(), Err(error));
    }

    fn finish(&mut self, result: Result<ScriptOutput>) {
        self.running = None;
        let output = match result {
            Ok(output) => output,
            Err(e) => return self.fail(e),
        };

        let success = output.succeeded();
        let reason = if success {
            String::new()
        } else {
            format!(
                "Script exited with code {}: {}{}",
                output.exit_code, output.stdout, output.stderr
            )
        };
        if !self.state.complete(success, reason) {
            return;
        }

        let asset_id = self.state.asset_id().to_string();
        let messenger = self.collaborators.messenger.clone();
        if !self.output_topic.is_empty() {
            let published =
                messenger.send_script_output(&self.script_id, &self.output_topic, &output.stdout);
            if let Err(e) = published {
                tracing::error!(
                    asset_id = %asset_id,
                    error = %e,
                    "failed to publish script output"
                );
            }
        }

        let compress = self.config.script.compress_output;
        let acknowledgement = build_script_result_message(&output.stdout, compress)
            .and_then(|result| merge_json(&self.state.acknowledgement(), &result))
            .unwrap_or_else(|e| {
                tracing::error!(asset_id = %asset_id, error = %e, "failed to build script result");
                self.state.acknowledgement()
            });
        self.state.send_acknowledgement(messenger.as_ref(), &acknowledgement);

        if success {
            self.collaborators.events.notify_script_success(&asset_id);
        } else {
            self.collaborators
                .events
                .notify_script_failure(&asset_id, self.state.error_message());
        }
    }
}

impl AssetProcessor for ScriptProcessor {
    fn asset_id(&self) -> &str {
        self.state.asset_id()
    }

    fn handle_asset(
        &mut self,
        asset: &Value,
        session: &SessionKey,
        _key_id: &str,
    ) -> Option<Duration> {
        if self.state.is_complete() || self.running.is_some() {
            return None;
        }
        match self.prepare(asset, session) {
            Ok(request) => self.spawn(request),
            Err(e) => self.fail(e),
        }
        None
    }

    fn update(&mut self) {
        if self.state.is_complete() {
            return;
        }
        let Some(running) = &self.running else {
            return;
        };
        match running.result.try_recv() {
            Ok(result) => self.finish(result),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.running = None;
                self.fail(Error::Script("script worker terminated unexpectedly".to_string()));
            }
        }
    }

    fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    fn is_success(&self) -> bool {
        self.state.is_success()
    }

    fn error_message(&self) -> &str {
        self.state.error_message()
    }
}

impl Drop for ScriptProcessor {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            tracing::debug!(asset_id = %self.state.asset_id(), "cancelling unfinished script");
            running.cancel.cancel();
        }
    }
}
