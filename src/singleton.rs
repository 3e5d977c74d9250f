//! Single-instance guard over a session-wide PID marker.
//!
//! The marker is a slot shared by every daemon in the session (in production
//! a root-window property, see [`crate::x11`]). A stale PID from a crashed
//! daemon is expected; only a PID that still probes alive counts as a running
//! instance. There is no compare-and-swap at the storage layer, so two
//! daemons starting at the same instant can race past each other. Acceptable
//! for a single interactive desktop session.

use thiserror::Error;
use tracing::debug;

/// Errors from the singleton guard.
#[derive(Error, Debug)]
pub enum SingletonError {
    #[error("another instance is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("marker access failed: {0}")]
    Marker(String),
}

/// Session-wide storage slot for the daemon's PID.
pub trait MarkerSlot {
    /// Read the stored PID, if the slot holds one.
    fn read(&self) -> Result<Option<u32>, SingletonError>;

    /// Store `pid`, overwriting any previous value.
    fn write(&self, pid: u32) -> Result<(), SingletonError>;
}

/// Refuse to proceed if the slot names a live instance.
///
/// A slot that is empty, holds zero, or holds the PID of a process that no
/// longer answers the liveness probe is treated as free.
pub fn check_and_claim<S, F>(slot: &S, alive: F) -> Result<(), SingletonError>
where
    S: MarkerSlot,
    F: Fn(u32) -> bool,
{
    match slot.read()? {
        Some(pid) if pid > 0 && alive(pid) => Err(SingletonError::AlreadyRunning { pid }),
        Some(pid) => {
            debug!("Ignoring stale marker pid {}", pid);
            Ok(())
        }
        None => Ok(()),
    }
}

/// Publish our own PID into the slot.
///
/// Must run after daemonizing: the fork changes the PID.
pub fn publish<S: MarkerSlot>(slot: &S, pid: u32) -> Result<(), SingletonError> {
    slot.write(pid)?;
    debug!("Published pid {} to session marker", pid);
    Ok(())
}

/// Liveness probe by signal: true when `pid` exists and is signalable.
#[allow(clippy::cast_possible_wrap)]
pub fn process_alive(pid: u32) -> bool {
    // Signal 0 performs the permission and existence checks without
    // delivering anything.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}
