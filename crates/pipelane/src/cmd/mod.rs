use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use pipelane_peer::{PeerError, StatusEvent};
use tokio_util::sync::CancellationToken;

use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod find;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a channel and reply to every message with the same message.
    Echo(EchoArgs),
    /// Run one request/response transaction.
    Send(SendArgs),
    /// Serve a channel and print received messages.
    Listen(ListenArgs),
    /// Find open channels by partial name.
    Find(FindArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Find(args) => find::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct ChannelArgs {
    /// Channel name, identical on both sides.
    pub channel: String,
    /// Directory holding channel sockets.
    #[arg(long, value_name = "DIR", env = "PIPELANE_RUNTIME_DIR")]
    pub runtime_dir: Option<PathBuf>,
    /// Speak the unframed text variant instead of binary frames.
    #[arg(long)]
    pub text: bool,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    #[command(flatten)]
    pub endpoint: ChannelArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub endpoint: ChannelArgs,
    /// Message type of the request frame.
    #[arg(long = "type", short = 't', default_value = "1", allow_negative_numbers = true)]
    pub msg_type: i32,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Window for each connect attempt (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s", env = "PIPELANE_CONNECT_TIMEOUT")]
    pub connect_timeout: String,
    /// Connect retries after the first attempt times out.
    #[arg(long, default_value = "10")]
    pub retries: u32,
    /// Bound on sending the request and reading the response.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub endpoint: ChannelArgs,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct FindArgs {
    /// Part of the channel name to look for. Lists every channel when omitted.
    pub partial: Option<String>,
    /// Directory holding channel sockets.
    #[arg(long, value_name = "DIR", env = "PIPELANE_RUNTIME_DIR")]
    pub runtime_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn build_runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| crate::exit::io_error("runtime setup failed", err))
}

/// Cancel `token` on Ctrl-C.
pub(crate) fn install_ctrlc_handler(token: CancellationToken) -> CliResult<()> {
    ctrlc::set_handler(move || token.cancel()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}

/// Exit code for a finished receive loop.
///
/// Cancellation is the normal way out. A loop that ended on its own stopped
/// because listening failed; `failure` carries the reported reason.
pub(crate) fn receive_loop_code(
    result: Result<pipelane_peer::Result<()>, tokio::task::JoinError>,
    failure: Option<String>,
) -> CliResult<i32> {
    match result {
        Ok(Err(PeerError::Cancelled)) => Ok(SUCCESS),
        Ok(Ok(())) => Err(CliError::new(
            TRANSPORT_ERROR,
            failure.unwrap_or_else(|| "listener stopped".to_string()),
        )),
        Ok(Err(err)) => Err(peer_error("receive failed", err)),
        Err(err) => Err(peer_error("receive failed", PeerError::Join(err))),
    }
}

/// Log a status event for the user and remember listener failures.
pub(crate) fn note_status(event: &StatusEvent, failure: &mut Option<String>) {
    if let StatusEvent::ListenerFailed { reason } = event {
        *failure = Some(reason.clone());
    }
    log_status(event);
}

pub(crate) fn log_status(event: &StatusEvent) {
    if event.is_fault() {
        tracing::warn!("{event}");
    } else {
        tracing::info!("{event}");
    }
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
