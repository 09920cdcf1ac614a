//! Delivery backend — the opaque collaborator that gets a rendered prompt
//! to the assistant. The engine only sees a boolean success contract.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;

/// Backend health, checked before every fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    /// Delivery is expected to work.
    Ready,
    /// The assistant is installed but not currently running.
    NotRunning,
    /// No way to deliver; fires fail immediately without retry.
    NotInstalled,
}

/// Sends a rendered prompt and reports success or failure.
#[async_trait]
pub trait DeliveryBackend: Send + Sync {
    async fn send_prompt(&self, prompt: &str, new_conversation: bool) -> bool;
    fn status(&self) -> BackendStatus;
}

/// Delivers prompts through the assistant's command-line tool
/// (`<cli> -p --print <prompt>`).
pub struct CliBackend {
    cli_path: PathBuf,
}

impl CliBackend {
    /// `cli` may be an absolute path or a bare binary name resolved via
    /// `$PATH`. Resolution happens once, at construction.
    pub fn new(cli: &str) -> Self {
        let cli_path = if cli.contains(std::path::MAIN_SEPARATOR) {
            // Home-relative CLI paths are common in configs ("~/bin/claude").
            PathBuf::from(shellexpand::tilde(cli).into_owned())
        } else {
            which::which(cli).unwrap_or_else(|_| PathBuf::from(cli))
        };
        Self { cli_path }
    }

    pub fn cli_path(&self) -> &PathBuf {
        &self.cli_path
    }
}

#[async_trait]
impl DeliveryBackend for CliBackend {
    async fn send_prompt(&self, prompt: &str, _new_conversation: bool) -> bool {
        // The CLI starts a fresh conversation per invocation, so the
        // new-conversation flag is implicit here.
        let result = tokio::process::Command::new(&self.cli_path)
            .args(["-p", "--print", prompt])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match result {
            Ok(status) if status.success() => true,
            Ok(status) => {
                tracing::warn!("⚠️ Assistant CLI exited with {status}");
                false
            }
            Err(e) => {
                tracing::warn!("⚠️ Assistant CLI failed to start: {e}");
                false
            }
        }
    }

    fn status(&self) -> BackendStatus {
        if self.cli_path.is_file() {
            BackendStatus::Ready
        } else {
            BackendStatus::NotInstalled
        }
    }
}
