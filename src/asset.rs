//! Asset processing: the per-type state machines and the manager that drives them.
//!
//! KeyScaler hands out assets as JSON objects carrying at least `assetId` and `type`.
//! A [`ProcessorFactory`] maps the type string to a constructor, the resulting
//! [`AssetProcessor`] is handed to the [`AssetManager`], which keeps it alive until it
//! reports completion.
//!
//! 中文: 资产处理模块。工厂根据类型字符串创建处理器，由管理器驱动直至完成。

pub mod apm_password;
pub mod certificate;
pub mod certificate_data;
pub mod group;
pub mod manager;
pub mod processor;
pub mod script;

pub use manager::{AssetManager, AssetStatus};
pub use processor::{AssetProcessor, ProcessorState};

use crate::common::AgentConfig;
use crate::crypto::{CsrGenerator, DeviceAuthority};
use crate::events::{EventManager, TracingEventManager};
use crate::executor::{ScriptExecutor, ShellExecutor};
use crate::messenger::AssetMessenger;
use crate::storage::{CertificateStore, KeyStorageProvider};
use crate::tpm::{NoTpm, TpmWrapper};
use apm_password::PasswordChanger;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Kinds of asset understood by this agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetType {
    Certificate,
    CertificateData,
    ApmPassword,
    Script,
    CodeSigning,
    Group,
}

impl AssetType {
    pub const ALL: [AssetType; 6] = [
        AssetType::Certificate,
        AssetType::CertificateData,
        AssetType::ApmPassword,
        AssetType::Script,
        AssetType::CodeSigning,
        AssetType::Group,
    ];

    /// Wire name as sent by KeyScaler.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Certificate => "certificate",
            AssetType::CertificateData => "certificateData",
            AssetType::ApmPassword => "apmPassword",
            AssetType::Script => "script",
            AssetType::CodeSigning => "codeSigning",
            AssetType::Group => "group",
        }
    }

    /// Case-insensitive lookup of a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a processor may call out to. Injected once at startup.
#[derive(Clone)]
pub struct Collaborators {
    pub authority: Arc<dyn DeviceAuthority>,
    pub messenger: Arc<dyn AssetMessenger>,
    pub events: Arc<dyn EventManager>,
    pub tpm: Arc<dyn TpmWrapper>,
    pub executor: Arc<dyn ScriptExecutor>,
    pub csr_generator: Option<Arc<dyn CsrGenerator>>,
    pub certificate_store: Option<Arc<dyn CertificateStore>>,
    pub key_provider: Option<Arc<dyn KeyStorageProvider>>,
    pub password_changer: Option<Arc<dyn PasswordChanger>>,
}

impl Collaborators {
    /// Minimal set: no TPM, no platform stores, `tracing` events and a `/bin/sh` executor.
    pub fn new(authority: Arc<dyn DeviceAuthority>, messenger: Arc<dyn AssetMessenger>) -> Self {
        Self {
            authority,
            messenger,
            events: Arc::new(TracingEventManager),
            tpm: Arc::new(NoTpm),
            executor: Arc::new(ShellExecutor::default()),
            csr_generator: None,
            certificate_store: None,
            key_provider: None,
            password_changer: None,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventManager>) -> Self {
        self.events = events;
        self
    }

    pub fn with_tpm(mut self, tpm: Arc<dyn TpmWrapper>) -> Self {
        self.tpm = tpm;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn ScriptExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_csr_generator(mut self, generator: Arc<dyn CsrGenerator>) -> Self {
        self.csr_generator = Some(generator);
        self
    }

    pub fn with_certificate_store(mut self, store: Arc<dyn CertificateStore>) -> Self {
        self.certificate_store = Some(store);
        self
    }

    pub fn with_key_provider(mut self, provider: Arc<dyn KeyStorageProvider>) -> Self {
        self.key_provider = Some(provider);
        self
    }

    pub fn with_password_changer(mut self, changer: Arc<dyn PasswordChanger>) -> Self {
        self.password_changer = Some(changer);
        self
    }
}

type Constructor = Box<dyn Fn(&str) -> Box<dyn AssetProcessor> + Send + Sync>;

/// Maps asset type names to processor constructors.
///
/// Starts with the built-in types; [`register`](Self::register) adds new types or replaces
/// existing ones (tests use this to swap in doubles).
pub struct ProcessorFactory {
    constructors: HashMap<String, Constructor>,
}

impl ProcessorFactory {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn with_defaults(collaborators: &Collaborators, config: &AgentConfig) -> Self {
        let mut factory = Self::empty();
        for kind in AssetType::ALL {
            let collaborators = collaborators.clone();
            let config = config.clone();
            factory.register(kind.as_str(), move |asset_id| {
                build_processor(kind, asset_id, &collaborators, &config)
            });
        }
        factory
    }

    pub fn register<F>(&mut self, type_name: &str, constructor: F)
    where
        F: Fn(&str) -> Box<dyn AssetProcessor> + Send + Sync + 'static,
    {
        self.constructors
            .insert(type_name.to_ascii_lowercase(), Box::new(constructor));
    }

    /// `None` for unknown types.
    pub fn create(&self, type_name: &str, asset_id: &str) -> Option<Box<dyn AssetProcessor>> {
        self.constructors
            .get(&type_name.to_ascii_lowercase())
            .map(|constructor| constructor(asset_id))
    }
}

fn build_processor(
    kind: AssetType,
    asset_id: &str,
    collaborators: &Collaborators,
    config: &AgentConfig,
) -> Box<dyn AssetProcessor> {
    match kind {
        AssetType::Certificate => Box::new(certificate::CertificateProcessor::new(
            asset_id,
            collaborators.clone(),
            config.storage.clone(),
        )),
        AssetType::CertificateData => Box::new(certificate_data::CertificateDataProcessor::new(
            asset_id,
            collaborators.clone(),
            config.storage.clone(),
        )),
        AssetType::ApmPassword => Box::new(apm_password::ApmPasswordProcessor::new(
            asset_id,
            collaborators.clone(),
        )),
        AssetType::Script => Box::new(script::ScriptProcessor::script(
            asset_id,
            collaborators.clone(),
            config.clone(),
        )),
        AssetType::CodeSigning => Box::new(script::ScriptProcessor::code_signing(
            asset_id,
            collaborators.clone(),
            config.clone(),
        )),
        AssetType::Group => Box::new(group::GroupProcessor::new(
            asset_id,
            collaborators.clone(),
            config.storage.group_metadata_path.clone(),
        )),
    }
}
