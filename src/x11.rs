//! X11 collaborator: connection, MIT-SCREEN-SAVER queries and notifications,
//! and the root-window property used as the session singleton marker.
//!
//! The connection is shared between the monitor (queries, property access)
//! and a blocking event pump that forwards screensaver notifications into a
//! channel. Dropping the session disconnects on every exit path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, trace, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::Event;
use x11rb::protocol::screensaver::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt as _, PropMode, Window};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::monitor::{IdleQuery, IdleSource, MonitorError, SaverEvent};
use crate::singleton::{MarkerSlot, SingletonError};

/// Root-window property holding the running daemon's PID.
///
/// The name is shared with xcbautolock so the two guards see each other.
const MARKER_PROPERTY: &str = "XLOCKER_PID";

/// Notifications buffered between pump and monitor.
const EVENT_CHANNEL_DEPTH: usize = 16;

/// Errors from the X11 layer.
#[derive(Error, Debug)]
pub enum X11Error {
    #[error("not able to connect to the X session: {0}")]
    Connect(#[from] x11rb::errors::ConnectError),

    #[error("X connection failed: {0}")]
    Connection(#[from] x11rb::errors::ConnectionError),

    #[error("X request failed: {0}")]
    Reply(#[from] x11rb::errors::ReplyError),

    #[error("MIT-SCREEN-SAVER extension is not available")]
    SaverExtensionMissing,
}

/// An open X session prepared for idle monitoring.
pub struct X11Session {
    conn: Arc<RustConnection>,
    root: Window,
    marker_atom: Atom,
    events: Option<mpsc::Receiver<SaverEvent>>,
}

impl X11Session {
    /// Connect to the display, verify the screensaver extension, intern the
    /// marker atom, and subscribe to screensaver notifications on the root
    /// window.
    pub fn connect() -> Result<Self, X11Error> {
        let (conn, screen_num) = RustConnection::connect(None)?;
        let root = conn.setup().roots[screen_num].root;

        if conn
            .extension_information(screensaver::X11_EXTENSION_NAME)?
            .is_none()
        {
            return Err(X11Error::SaverExtensionMissing);
        }

        let marker_atom = conn
            .intern_atom(false, MARKER_PROPERTY.as_bytes())?
            .reply()?
            .atom;

        conn.screensaver_select_input(root, screensaver::Event::NOTIFY_MASK)?;
        conn.flush()?;

        debug!("Connected to X, root window {:#x}", root);

        Ok(Self {
            conn: Arc::new(conn),
            root,
            marker_atom,
            events: None,
        })
    }

    /// Start the blocking event pump.
    ///
    /// Must run inside a tokio runtime; the pump thread owns
    /// `wait_for_event` and forwards screensaver state changes until the
    /// connection breaks or the session is dropped.
    pub fn start_event_pump(&mut self) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            loop {
                let event = match conn.wait_for_event() {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("X event stream failed: {}", e);
                        break;
                    }
                };

                if let Event::ScreensaverNotify(notify) = event {
                    let state = screensaver::State::from(notify.state);
                    let saver_event = if state == screensaver::State::ON {
                        SaverEvent::On
                    } else if state == screensaver::State::OFF {
                        SaverEvent::Off
                    } else {
                        continue;
                    };

                    trace!("Screensaver notify: {:?}", saver_event);
                    if tx.blocking_send(saver_event).is_err() {
                        // Receiver dropped; the daemon is shutting down.
                        break;
                    }
                }
            }
        });

        self.events = Some(rx);
    }

    fn query_idle(&self) -> Result<IdleQuery, X11Error> {
        let reply = self.conn.screensaver_query_info(self.root)?.reply()?;
        Ok(IdleQuery {
            saver_disabled: screensaver::State::from(reply.state) == screensaver::State::DISABLED,
            ms_since_input: reply.ms_since_user_input,
        })
    }
}

#[async_trait]
impl IdleSource for X11Session {
    async fn query(&mut self) -> Result<IdleQuery, MonitorError> {
        self.query_idle()
            .map_err(|e| MonitorError::Query(e.to_string()))
    }

    async fn next_event(
        &mut self,
        budget: Duration,
    ) -> Result<Option<SaverEvent>, MonitorError> {
        let Some(events) = self.events.as_mut() else {
            // No pump running; just burn the budget.
            tokio::time::sleep(budget).await;
            return Ok(None);
        };

        match timeout(budget, events.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(event)) => Ok(Some(event)),
            Ok(None) => Err(MonitorError::Disconnected),
        }
    }
}

impl MarkerSlot for X11Session {
    fn read(&self) -> Result<Option<u32>, SingletonError> {
        let reply = self
            .conn
            .get_property(false, self.root, self.marker_atom, AtomEnum::ANY, 0, 1)
            .map_err(|e| SingletonError::Marker(e.to_string()))?
            .reply()
            .map_err(|e| SingletonError::Marker(e.to_string()))?;

        if reply.type_ != Atom::from(AtomEnum::INTEGER) {
            return Ok(None);
        }
        Ok(reply.value32().and_then(|mut values| values.next()))
    }

    fn write(&self, pid: u32) -> Result<(), SingletonError> {
        self.conn
            .change_property32(
                PropMode::REPLACE,
                self.root,
                self.marker_atom,
                AtomEnum::INTEGER,
                &[pid],
            )
            .map_err(|e| SingletonError::Marker(e.to_string()))?;
        self.conn
            .flush()
            .map_err(|e| SingletonError::Marker(e.to_string()))?;
        Ok(())
    }
}
