//! xautolockd - Idle-triggered screen lock daemon for X11.
//!
//! Watches the session's user-input idle time through the MIT-SCREEN-SAVER
//! extension and starts an external locker command once the idle threshold
//! is crossed, or immediately when the screensaver engages. A root-window
//! property keeps a second instance from starting in the same session.

mod config;
mod locker;
mod monitor;
mod singleton;
mod timespec;
mod x11;

use crate::config::{Config, Settings};
use crate::locker::LockerCommand;
use crate::monitor::Monitor;
use crate::x11::X11Session;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Idle-triggered screen lock daemon for X11.
///
/// Runs the given locker command when the session has been idle longer than
/// the threshold, or when the screensaver engages.
#[derive(Parser, Debug)]
#[command(name = "xautolockd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Idle threshold before locking (e.g. "30s", "5m", "1h"; a bare number
    /// is milliseconds).
    #[arg(short = 't', long = "timeout", value_parser = timespec::parse_timespec)]
    timeout: Option<Duration>,

    /// Run in the foreground instead of detaching from the session.
    #[arg(short = 'f', long)]
    foreground: bool,

    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Locker command and its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    locker: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("xautolockd v{} starting", env!("CARGO_PKG_VERSION"));

    let config =
        Config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    let settings = Settings::resolve(args.timeout, args.foreground, &args.locker, &config)?;

    let mut session = X11Session::connect().context("Failed to open the X session")?;

    singleton::check_and_claim(&session, singleton::process_alive)?;

    if !settings.foreground {
        detach().context("Failed to daemonize")?;
    }

    // Our PID changed if we forked, so publish only now.
    singleton::publish(&session, std::process::id())?;

    // The fork above must happen before any runtime threads exist, so the
    // runtime is built by hand instead of with #[tokio::main].
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(async {
        session.start_event_pump();
        run(session, &settings).await
    })
}

/// Initialize logging with the specified level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(format!("xautolockd={level}"))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}

/// Detach from the controlling session, keeping the current directory and
/// redirecting stdio to /dev/null.
fn detach() -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
    daemonize::Daemonize::new().working_directory(cwd).start()?;
    Ok(())
}

/// Run the monitor loop until a fatal error or a termination signal.
async fn run(session: X11Session, settings: &Settings) -> Result<()> {
    let locker = LockerCommand::new(&settings.locker).context("No locker specified")?;
    let mut monitor = Monitor::new(session, locker, settings.timeout);

    tokio::select! {
        result = monitor.run() => result.context("Monitoring failed")?,
        result = shutdown_signal() => {
            result?;
            info!("Shutdown signal received, exiting");
        }
    }

    // Dropping the monitor drops the session, which disconnects from X.
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for SIGINT")?;
        }
        _ = term.recv() => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_timeout_and_locker() {
        let args =
            Args::try_parse_from(["xautolockd", "-t", "5m", "i3lock", "-n", "-c", "000000"])
                .unwrap();
        assert_eq!(args.timeout, Some(Duration::from_millis(300_000)));
        assert!(!args.foreground);
        assert_eq!(args.locker, vec!["i3lock", "-n", "-c", "000000"]);
    }

    #[test]
    fn test_args_foreground_flag() {
        let args = Args::try_parse_from(["xautolockd", "-f", "slock"]).unwrap();
        assert!(args.foreground);
        assert_eq!(args.locker, vec!["slock"]);
    }

    #[test]
    fn test_args_reject_bad_timeout() {
        assert!(Args::try_parse_from(["xautolockd", "-t", "soon", "slock"]).is_err());
    }

    #[test]
    fn test_args_timeout_defaults_to_unset() {
        let args = Args::try_parse_from(["xautolockd", "slock"]).unwrap();
        assert_eq!(args.timeout, None);
    }
}
