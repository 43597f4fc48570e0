//! Optional external idea generator.
//!
//! The generator is a capability, not a dependency: the session holds an
//! `Option<Arc<dyn MuseBackend>>` and absence is simply `None`. Failure of a
//! present generator is indistinguishable from absence at the call site -
//! the supply manager logs it and falls through to the pack pool.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Fixed instruction preamble sent ahead of the user prompt.
pub const IDEA_PREAMBLE: &str = "You suggest one short, playful activity for someone who is \
bored. Reply with a single sentence and nothing else.";

/// The short user prompt the supply manager sends on every consult.
pub const IDEA_PROMPT: &str = "Give me one idea for something fun to do right now.";

#[derive(Debug, Error)]
pub enum MuseError {
    #[error("generator failed to start: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("generator exited with status {status}")]
    Failed { status: i32 },

    #[error("generator timed out after {0:?}")]
    TimedOut(Duration),

    #[error("generator returned no text")]
    Empty,
}

/// An external collaborator that can produce idea text.
#[async_trait]
pub trait MuseBackend: Send + Sync {
    /// Produce one idea for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns `MuseError` for any failure; callers treat every error as
    /// "capability not available right now".
    async fn generate(&self, prompt: &str) -> Result<String, MuseError>;
}

/// Generator backed by a local command (an on-device model CLI). The
/// preamble and prompt are passed as a single trailing argument; stdout is
/// the idea text.
pub struct CommandMuse {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandMuse {
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MuseBackend for CommandMuse {
    async fn generate(&self, prompt: &str) -> Result<String, MuseError> {
        debug!(program = %self.program, "consulting idea generator");
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .arg(format!("{IDEA_PREAMBLE}\n\n{prompt}"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| MuseError::TimedOut(self.timeout))??;

        if !output.status.success() {
            return Err(MuseError::Failed {
                status: output.status.code().unwrap_or(-1),
            });
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(MuseError::Empty);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn command_output_becomes_idea_text() {
        let muse = CommandMuse::new("echo", Vec::new());
        let text = muse.generate(IDEA_PROMPT).await.expect("echo succeeds");
        assert!(text.contains(IDEA_PROMPT));
        assert!(text.starts_with(IDEA_PREAMBLE));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let muse = CommandMuse::new("false", Vec::new());
        assert!(matches!(
            muse.generate(IDEA_PROMPT).await,
            Err(MuseError::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let muse = CommandMuse::new("definitely-not-a-real-binary-here", Vec::new());
        assert!(matches!(
            muse.generate(IDEA_PROMPT).await,
            Err(MuseError::Spawn(_))
        ));
    }
}
