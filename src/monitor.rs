//! Idle monitoring and lock triggering.
//!
//! The monitor owns a single serial loop: sample the idle counter, decide
//! whether to lock, then sleep exactly the time remaining until the threshold
//! could next be crossed, waking early if the screensaver pushes a state
//! change. Because the loop is strictly serial there is never more than one
//! locker process at a time, and the loop is deliberately deaf to new events
//! while a locker runs.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::locker::{Locker, LockerError};

/// One read of the screensaver extension's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleQuery {
    /// The extension reports itself disabled; idle time is meaningless.
    pub saver_disabled: bool,
    /// Milliseconds since the last user input event.
    pub ms_since_input: u32,
}

/// An asynchronous screensaver state-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaverEvent {
    /// The screensaver engaged; treated as an explicit lock request.
    On,
    /// The screensaver disengaged.
    Off,
}

/// Errors from the monitor loop.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("idle query failed: {0}")]
    Query(String),

    #[error("screensaver event stream ended")]
    Disconnected,

    #[error(transparent)]
    Locker(#[from] LockerError),
}

/// Source of idle readings and screensaver notifications.
///
/// `next_event` is the loop's single blocking point: it waits for either the
/// next notification or the expiry of the budget, whichever comes first.
#[async_trait]
pub trait IdleSource: Send {
    /// Sample the current idle state.
    async fn query(&mut self) -> Result<IdleQuery, MonitorError>;

    /// Wait up to `budget` for a notification; `None` means the budget
    /// elapsed quietly.
    async fn next_event(&mut self, budget: Duration)
    -> Result<Option<SaverEvent>, MonitorError>;
}

/// Working state carried across loop iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MonitorState {
    /// A lock was requested by notification and not yet serviced.
    forced: bool,
    /// A lock cycle finished on the previous iteration; the next `On`
    /// notification is stale echo and must not re-trigger.
    just_unlocked: bool,
    /// How long the next bounded wait may sleep.
    next_timeout: Duration,
}

/// The idle monitor and its collaborators.
pub struct Monitor<S, L> {
    source: S,
    locker: L,
    threshold: Duration,
    state: MonitorState,
}

impl<S: IdleSource, L: Locker> Monitor<S, L> {
    pub fn new(source: S, locker: L, threshold: Duration) -> Self {
        Self {
            source,
            locker,
            threshold,
            state: MonitorState {
                forced: false,
                just_unlocked: false,
                next_timeout: threshold,
            },
        }
    }

    /// Run the loop until the source fails or the locker cannot be run.
    ///
    /// There is no success return; the daemon monitors until the process is
    /// terminated.
    pub async fn run(&mut self) -> Result<(), MonitorError> {
        info!(
            "Monitoring idle time, threshold {}ms",
            self.threshold.as_millis()
        );
        loop {
            self.tick().await?;
        }
    }

    /// One loop iteration: sample, maybe lock, bounded wait, handle at most
    /// one notification.
    async fn tick(&mut self) -> Result<(), MonitorError> {
        let query = self.source.query().await?;

        if query.saver_disabled && !self.state.forced {
            // Idle detection is inactive; keep the previous timeout so a
            // future forced lock still gets serviced promptly.
            debug!("Screensaver extension disabled, skipping idle check");
        } else {
            let idle = Duration::from_millis(u64::from(query.ms_since_input));
            if idle > self.threshold || self.state.forced {
                if self.state.forced {
                    info!("Forced lock requested, locking");
                } else {
                    info!(
                        "Idle for {}ms exceeds threshold {}ms, locking",
                        idle.as_millis(),
                        self.threshold.as_millis()
                    );
                }
                self.locker.run().await?;
                self.state.next_timeout = self.threshold;
                self.state.forced = false;
                self.state.just_unlocked = true;
            } else {
                // Sleep exactly until the threshold could be crossed.
                self.state.next_timeout = self.threshold - idle;
            }
        }

        let event = self.source.next_event(self.state.next_timeout).await?;
        if let Some(event) = event {
            debug!("Screensaver notification: {:?}", event);
            if event == SaverEvent::On && !self.state.just_unlocked {
                self.state.forced = true;
            }
        }
        // The suppression window is exactly one iteration.
        self.state.just_unlocked = false;

        Ok(())
    }
}
