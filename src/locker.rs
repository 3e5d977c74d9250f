//! Locker command invocation.
//!
//! Spawns the configured external locker and blocks the monitor until it
//! exits. The daemon exists to run this command, so a spawn or wait failure
//! is fatal rather than recoverable.

use async_trait::async_trait;
use std::io;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors from running the locker.
#[derive(Error, Debug)]
pub enum LockerError {
    #[error("cannot run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("unexpected failure waiting for '{command}': {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Something that locks the screen and reports when it is done.
#[async_trait]
pub trait Locker: Send {
    /// Run one lock cycle to completion.
    ///
    /// Returns once the locker process has exited, however it exited; the
    /// child's status is not the caller's concern.
    async fn run(&mut self) -> Result<(), LockerError>;
}

/// The production locker: an external command run with the daemon's
/// environment and stdio, searched on `PATH`.
#[derive(Debug, Clone)]
pub struct LockerCommand {
    program: String,
    args: Vec<String>,
}

impl LockerCommand {
    /// Build from a command line; the first element is the program.
    ///
    /// Returns `None` for an empty command line.
    pub fn new(command_line: &[String]) -> Option<Self> {
        let (program, args) = command_line.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// The full command line, for diagnostics.
    fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

#[async_trait]
impl Locker for LockerCommand {
    async fn run(&mut self) -> Result<(), LockerError> {
        info!("Starting locker: {}", self.display());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .spawn()
            .map_err(|source| LockerError::Spawn {
                command: self.display(),
                source,
            })?;

        // Interrupted waits are retried inside the runtime; only a real wait
        // failure surfaces here.
        let status = child.wait().await.map_err(|source| LockerError::Wait {
            command: self.display(),
            source,
        })?;

        debug!("Locker exited with {}", status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_line_rejected() {
        assert!(LockerCommand::new(&[]).is_none());
    }

    #[test]
    fn test_display_joins_program_and_args() {
        let locker = LockerCommand::new(&[
            "i3lock".to_string(),
            "-n".to_string(),
            "-c".to_string(),
            "000000".to_string(),
        ])
        .unwrap();
        assert_eq!(locker.display(), "i3lock -n -c 000000");
    }

    #[tokio::test]
    async fn test_run_waits_for_exit() {
        let mut locker = LockerCommand::new(&["true".to_string()]).unwrap();
        locker.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_child_exit_status_is_not_surfaced() {
        let mut locker = LockerCommand::new(&["false".to_string()]).unwrap();
        // The locker failing to lock is its problem, not ours.
        locker.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure_reports_command_line() {
        let mut locker = LockerCommand::new(&[
            "definitely-not-a-real-locker".to_string(),
            "--now".to_string(),
        ])
        .unwrap();
        match locker.run().await {
            Err(LockerError::Spawn { command, .. }) => {
                assert_eq!(command, "definitely-not-a-real-locker --now");
            }
            other => panic!("expected Spawn error, got {other:?}"),
        }
    }
}
