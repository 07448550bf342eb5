//! # KeyScaler Agent: device-side credential processing
//!
//! `keyscaler-agent` is the core of a device agent that polls the KeyScaler service for
//! *assets* (certificates, CSR instructions, account passwords, signed scripts, group
//! metadata) and processes each one through a dedicated state machine.
//!
//! ## Core Concepts
//!
//! - **`AssetProcessor`**: one instance per asset. Validates, decrypts, stores or executes,
//!   then acknowledges the outcome to KeyScaler exactly once.
//! - **`AssetManager`**: keeps unfinished processors (scripts) alive and drives them.
//! - **`Worker`**: the polling loop feeding assets into the manager.
//! - **Collaborators**: device authority, transport, TPM, event sink and platform stores are
//!   traits injected through [`asset::Collaborators`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keyscaler_agent::prelude::*;
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! let config = AgentConfig::from_json(&std::fs::read_to_string("agent.json")?)?;
//! let authority = Arc::new(SoftwareAuthority::new(tid, udi, key_id, secret));
//! let collaborators = Collaborators::new(authority, Arc::new(my_messenger));
//!
//! let stop = AtomicBool::new(false);
//! Worker::new(config, collaborators).run(&stop);
//! ```

pub mod asset;
pub mod common;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod events;
pub mod executor;
pub mod message;
pub mod messenger;
pub mod storage;
pub mod tpm;
pub mod worker;

pub use error::{Error, Result};

/// The most commonly used types.
pub mod prelude {
    pub use crate::asset::{
        AssetManager, AssetProcessor, AssetStatus, AssetType, Collaborators, ProcessorFactory,
    };
    pub use crate::common::{AgentConfig, SessionKey};
    pub use crate::crypto::{DeviceAuthority, SoftwareAuthority};
    pub use crate::error::{Error, Result};
    pub use crate::events::EventManager;
    pub use crate::messenger::{AssetMessenger, Authorisation};
    pub use crate::tpm::TpmWrapper;
    pub use crate::worker::{Worker, WorkerStats};
}

/// The version of the `keyscaler-agent` crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
