//! Lifecycle notifications.
//!
//! The event manager is a fire-and-forget sink: nothing it does can influence asset
//! processing, so every method returns `()` and defaults to doing nothing.

/// Milestones raised by the asset processors.
#[allow(unused_variables)]
pub trait EventManager: Send + Sync {
    fn notify_certificate_received(&self, asset_id: &str) {}
    fn notify_certificate_stored(&self, asset_id: &str) {}
    fn notify_certificate_failure(&self, asset_id: &str, error: &str) {}

    fn notify_private_key_received(&self, asset_id: &str) {}
    fn notify_private_key_stored(&self, asset_id: &str) {}
    fn notify_private_key_failure(&self, asset_id: &str, error: &str) {}

    fn notify_csr_submitted(&self, asset_id: &str) {}
    fn notify_csr_failure(&self, asset_id: &str, error: &str) {}

    fn notify_apm_success(&self, username: &str) {}
    fn notify_apm_failure(&self, username: &str, error: &str) {}

    fn notify_script_started(&self, asset_id: &str) {}
    fn notify_script_success(&self, asset_id: &str) {}
    fn notify_script_failure(&self, asset_id: &str, error: &str) {}

    fn notify_group_metadata_success(&self, asset_id: &str) {}
    fn notify_group_metadata_failure(&self, asset_id: &str, error: &str) {}
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventManager;

impl EventManager for NullEventManager {}

/// Forwards notifications to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventManager;

impl EventManager for TracingEventManager {
    fn notify_certificate_received(&self, asset_id: &str) {
        tracing::info!(asset_id, "certificate received");
    }
    fn notify_certificate_stored(&self, asset_id: &str) {
        tracing::info!(asset_id, "certificate stored");
    }
    fn notify_certificate_failure(&self, asset_id: &str, error: &str) {
        tracing::error!(asset_id, error, "certificate failure");
    }
    fn notify_private_key_received(&self, asset_id: &str) {
        tracing::info!(asset_id, "private key received");
    }
    fn notify_private_key_stored(&self, asset_id: &str) {
        tracing::info!(asset_id, "private key stored");
    }
    fn notify_private_key_failure(&self, asset_id: &str, error: &str) {
        tracing::error!(asset_id, error, "private key failure");
    }
    fn notify_csr_submitted(&self, asset_id: &str) {
        tracing::info!(asset_id, "CSR submitted");
    }
    fn notify_csr_failure(&self, asset_id: &str, error: &str) {
        tracing::error!(asset_id, error, "CSR failure");
    }
    fn notify_apm_success(&self, username: &str) {
        tracing::info!(username, "APM password changed");
    }
    fn notify_apm_failure(&self, username: &str, error: &str) {
        tracing::warn!(username, error, "APM password change failed");
    }
    fn notify_script_started(&self, asset_id: &str) {
        tracing::info!(asset_id, "script started");
    }
    fn notify_script_success(&self, asset_id: &str) {
        tracing::info!(asset_id, "script succeeded");
    }
    fn notify_script_failure(&self, asset_id: &str, error: &str) {
        tracing::warn!(asset_id, error, "script failed");
    }
    fn notify_group_metadata_success(&self, asset_id: &str) {
        tracing::info!(asset_id, "group metadata stored");
    }
    fn notify_group_metadata_failure(&self, asset_id: &str, error: &str) {
        tracing::error!(asset_id, error, "group metadata failure");
    }
}
