//! Script execution primitives.

use crate::common::config::ScriptConfig;
use crate::error::{Error, Result};
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Cooperative cancellation shared between a processor and its background worker.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A verified, decrypted script ready to run.
#[derive(Debug, Clone, Default)]
pub struct ScriptRequest {
    pub script: String,
    pub env: Vec<(String, String)>,
}

/// What a finished script left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs scripts. Called from a background thread; must honour `cancel` promptly.
pub trait ScriptExecutor: Send + Sync {
    fn execute(&self, request: &ScriptRequest, cancel: &CancelFlag) -> Result<ScriptOutput>;
}

/// Runs the script through `<shell> -c`, killing the child when cancelled.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    poll_interval: Duration,
}

impl ShellExecutor {
    pub fn new(shell: &str) -> Self {
        Self {
            shell: shell.to_string(),
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn from_config(config: &ScriptConfig) -> Self {
        Self::new(&config.shell)
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buffer);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

impl ScriptExecutor for ShellExecutor {
    fn execute(&self, request: &ScriptRequest, cancel: &CancelFlag) -> Result<ScriptOutput> {
        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&request.script)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Script(format!("failed to spawn {}: {}", self.shell, e)))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Script("script cancelled".to_string()));
            }
            match child.try_wait()? {
                Some(status) => break status,
                None => thread::sleep(self.poll_interval),
            }
        };

        Ok(ScriptOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }
}
