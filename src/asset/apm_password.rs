//! `apmPassword` assets: rotate local account passwords.
//!
//! ```json
//! {"assetId": "...", "accounts": [{"name": "...", "salt": "...", "validationHash": "..."}],
//!  "autoRotate": true, "pollingRate": 600}
//! ```
//!
//! The new password for an account is `hex(sha256(session_key || salt))`. The server proves it
//! derived the same value by sending `hex(sha256(password))` as `validationHash`; the password
//! is only changed when both agree.
//!
//! The asset succeeds whenever the batch was processed, even if single accounts failed; the
//! per-account outcome travels in the APM receipt instead.

use super::Collaborators;
use super::processor::{AssetProcessor, ProcessorState, flag};
use crate::common::{SessionKey, constant_time_eq};
use crate::error::{Error, Result};
use crate::message::build_apm_passwords_message;
use secrecy::SecretString;
use serde_json::Value;
use std::time::Duration;

/// Changes an OS account password (through the platform's shell mechanism).
pub trait PasswordChanger: Send + Sync {
    fn change_password(&self, username: &str, password: &SecretString) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccountResult {
    Success,
    #[default]
    Failed,
}

impl AccountResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountResult::Success => "SUCCESS",
            AccountResult::Failed => "FAILED",
        }
    }
}

/// One account record of the batch and its outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub salt: String,
    pub validation_hash: String,
    pub result: AccountResult,
    pub reason: String,
}

impl Account {
    fn from_record(record: &Value) -> Self {
        let member = |field: &str| {
            record
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            name: member("name"),
            salt: member("salt"),
            validation_hash: member("validationHash"),
            ..Default::default()
        }
    }

    fn missing_field(&self) -> Option<&'static str> {
        if self.name.is_empty() {
            Some("name")
        } else if self.salt.is_empty() {
            Some("salt")
        } else if self.validation_hash.is_empty() {
            Some("validationHash")
        } else {
            None
        }
    }

    fn fail(&mut self, reason: impl Into<String>) {
        self.result = AccountResult::Failed;
        self.reason = reason.into();
    }
}

pub struct ApmPasswordProcessor {
    state: ProcessorState,
    collaborators: Collaborators,
    accounts: Vec<Account>,
}

impl ApmPasswordProcessor {
    pub fn new(asset_id: &str, collaborators: Collaborators) -> Self {
        Self {
            state: ProcessorState::new(asset_id),
            collaborators,
            accounts: Vec::new(),
        }
    }

    /// Outcomes of the last processed batch.
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    fn derive_password(&self, session: &SessionKey, salt: &str) -> String {
        let mut material = zeroize::Zeroizing::new(session.key.clone());
        material.extend_from_slice(salt.as_bytes());
        hex::encode(self.collaborators.authority.digest_sha256(&material))
    }

    fn rotate(&self, account: &mut Account, session: &SessionKey) {
        if let Some(field) = account.missing_field() {
            account.fail(format!("Missing {}", field));
            return;
        }

        let password = SecretString::from(self.derive_password(session, &account.salt));
        let expected = hex::encode(
            self.collaborators
                .authority
                .digest_sha256(secrecy::ExposeSecret::expose_secret(&password).as_bytes()),
        );
        if !constant_time_eq(
            expected.as_bytes(),
            account.validation_hash.to_ascii_lowercase().as_bytes(),
        ) {
            account.fail("Validation hash mismatch");
            return;
        }

        let Some(changer) = &self.collaborators.password_changer else {
            account.fail("Password change is not supported on this device");
            return;
        };
        match changer.change_password(&account.name, &password) {
            Ok(()) => {
                account.result = AccountResult::Success;
                account.reason.clear();
            }
            Err(e) => account.fail(e.to_string()),
        }
    }

    fn process(&mut self, asset: &Value, session: &SessionKey) -> Result<Option<Duration>> {
        let asset_id = self.state.asset_id().to_string();
        let records = asset
            .get("accounts")
            .and_then(Value::as_array)
            .ok_or(Error::MissingField("accounts"))?;

        let mut accounts: Vec<Account> = records.iter().map(Account::from_record).collect();
        for account in &mut accounts {
            self.rotate(account, session);
            let events = &self.collaborators.events;
            match account.result {
                AccountResult::Success => events.notify_apm_success(&account.name),
                AccountResult::Failed => {
                    tracing::warn!(
                        asset_id = %asset_id,
                        account = %account.name,
                        reason = %account.reason,
                        "password rotation failed"
                    );
                    events.notify_apm_failure(&account.name, &account.reason)
                }
            }
        }

        let receipt = build_apm_passwords_message(&asset_id, &accounts);
        if let Err(e) = self.collaborators.messenger.acknowledge_apm_receipt(&receipt) {
            tracing::error!(asset_id = %asset_id, error = %e, "failed to send APM receipt");
        }
        self.accounts = accounts;

        let polling_rate = asset.get("pollingRate").and_then(Value::as_u64).unwrap_or(0);
        let rotate = flag(asset, "autoRotate") && polling_rate > 0;
        Ok(rotate.then(|| Duration::from_secs(polling_rate)))
    }
}

impl AssetProcessor for ApmPasswordProcessor {
    fn asset_id(&self) -> &str {
        self.state.asset_id()
    }

    fn handle_asset(
        &mut self,
        asset: &Value,
        session: &SessionKey,
        _key_id: &str,
    ) -> Option<Duration> {
        let (result, sleep_hint) = match self.process(asset, session) {
            Ok(hint) => (Ok(()), hint),
            Err(e) => (Err(e), None),
        };
        self.state.finish(self.collaborators.messenger.as_ref(), result);
        sleep_hint
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
