//! The asset processor contract and the state every processor shares.
//!
//! ```text
//! CREATED ── handle_asset ──> VALIDATING ──> FAILED (terminal)
//!                                  │
//!                                  └──> PROCESSING ──> DONE (terminal, synchronous types)
//!                                            │
//!                                            └──> RUNNING ── update ──> DONE (scripts)
//! ```
//!
//! Validation always runs before the first side effect. Once a processor is complete it
//! stays complete: `update` becomes a no-op, no receipt is sent twice and no event is raised
//! again.

use crate::common::SessionKey;
use crate::message::build_acknowledge_message;
use crate::messenger::AssetMessenger;
use serde_json::Value;
use std::time::Duration;

/// Per-asset handler driven by the [`AssetManager`](super::AssetManager).
pub trait AssetProcessor: Send {
    fn asset_id(&self) -> &str;

    /// Consumes the asset. Synchronous types are complete when this returns; script types
    /// leave a background task running and finish in [`update`](Self::update).
    ///
    /// Returns a polling interval override when the asset carries one.
    fn handle_asset(
        &mut self,
        asset: &Value,
        session: &SessionKey,
        key_id: &str,
    ) -> Option<Duration>;

    /// Non-blocking progress check. Does nothing once complete.
    fn update(&mut self) {}

    fn is_complete(&self) -> bool;

    /// Only meaningful once [`is_complete`](Self::is_complete) returns `true`.
    fn is_success(&self) -> bool;

    fn error_message(&self) -> &str;

    /// A CSR was submitted and the signed certificate will arrive in a later poll.
    fn wait_for_certificate(&self) -> bool {
        false
    }

    /// A signed certificate was delivered.
    fn certificate_received(&self) -> bool {
        false
    }
}

/// Completion flags shared by every processor.
#[derive(Debug, Clone, Default)]
pub struct ProcessorState {
    asset_id: String,
    complete: bool,
    success: bool,
    error_message: String,
}

impl ProcessorState {
    pub fn new(asset_id: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            ..Default::default()
        }
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_success(&self) -> bool {
        self.complete && self.success
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Marks the processor complete. Returns `false` (and changes nothing) if it already was.
    pub fn complete(&mut self, success: bool, error_message: impl Into<String>) -> bool {
        if self.complete {
            return false;
        }
        self.complete = true;
        self.success = success;
        self.error_message = if success { String::new() } else { error_message.into() };
        true
    }

    /// The delivery-status acknowledgement for the current outcome.
    pub fn acknowledgement(&self) -> String {
        build_acknowledge_message(&self.asset_id, self.is_success(), &self.error_message)
    }

    /// Sends `message` as this asset's acknowledgement. Transport failures are logged; the next
    /// poll re-authenticates and the service re-offers undelivered assets.
    pub fn send_acknowledgement(&self, messenger: &dyn AssetMessenger, message: &str) {
        match messenger.acknowledge_receipt(message) {
            Ok(reply) => {
                tracing::debug!(asset_id = %self.asset_id, reply = %reply, "acknowledgement sent")
            }
            Err(e) => tracing::error!(
                asset_id = %self.asset_id,
                error = %e,
                "failed to send acknowledgement"
            ),
        }
    }

    /// Completes the processor and sends the plain acknowledgement, once.
    pub fn finish(&mut self, messenger: &dyn AssetMessenger, result: crate::Result<()>) {
        let (success, reason) = match result {
            Ok(()) => (true, String::new()),
            Err(e) => (false, e.to_string()),
        };
        if self.complete(success, reason) {
            if !success {
                tracing::warn!(
                    asset_id = %self.asset_id,
                    error = %self.error_message,
                    "asset processing failed"
                );
            }
            self.send_acknowledgement(messenger, &self.acknowledgement());
        }
    }
}

/// Reads a non-empty string member.
pub(crate) fn required_str<'a>(asset: &'a Value, field: &'static str) -> crate::Result<&'a str> {
    match asset.get(field).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(crate::Error::MissingField(field)),
    }
}

pub(crate) fn optional_str<'a>(asset: &'a Value, field: &str) -> Option<&'a str> {
    asset
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

pub(crate) fn flag(asset: &Value, field: &str) -> bool {
    asset.get(field).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_is_monotonic() {
        let mut state = ProcessorState::new("a1");
        assert!(!state.is_success());
        assert!(state.complete(false, "boom"));
        assert!(!state.complete(true, ""));
        assert!(state.is_complete());
        assert!(!state.is_success());
        assert_eq!(state.error_message(), "boom");
    }

    #[test]
    fn acknowledgement_reflects_outcome() {
        let mut state = ProcessorState::new("a1");
        state.complete(false, "Missing filePath");
        assert_eq!(
            state.acknowledgement(),
            r#"{"assetDeliveryStatus":{"assetId":"a1","status":false,"failureReason":"Missing filePath"}}"#
        );
    }

    #[test]
    fn field_helpers() {
        let asset = serde_json::json!({"a": "x", "b": "", "c": true});
        assert_eq!(required_str(&asset, "a").unwrap(), "x");
        assert!(required_str(&asset, "b").is_err());
        assert!(optional_str(&asset, "b").is_none());
        assert!(flag(&asset, "c"));
        assert!(!flag(&asset, "missing"));
    }
}
