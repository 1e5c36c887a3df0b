use pipelane_frame::{Binary, Framing, Text};
use pipelane_peer::{message_channel, status_channel, PipeServer, ServerConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cmd::{build_runtime, install_ctrlc_handler, note_status, receive_loop_code, EchoArgs};
use crate::exit::CliResult;

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let cancel = CancellationToken::new();
    install_ctrlc_handler(cancel.clone())?;

    let runtime = build_runtime()?;
    if args.endpoint.text {
        runtime.block_on(echo::<Text>(&args, cancel))
    } else {
        runtime.block_on(echo::<Binary>(&args, cancel))
    }
}

async fn echo<F: Framing>(args: &EchoArgs, cancel: CancellationToken) -> CliResult<i32> {
    let server = PipeServer::<F>::with_config(ServerConfig {
        runtime_dir: args.endpoint.runtime_dir.clone(),
        ..ServerConfig::default()
    });
    let (messages, mut inbox) = message_channel();
    let (status, mut events) = status_channel();
    let mut task = server.receive(&args.endpoint.channel, messages, status, Some(cancel));

    let mut failure = None;

    let result = loop {
        tokio::select! {
            Some(message) = inbox.recv() => {
                info!(channel = %args.endpoint.channel, size = F::wire_len(&message), "echoing message");
                if let Err(err) = server.send(message).await {
                    warn!(error = %err, "echo send failed");
                }
            }
            Some(event) = events.recv() => note_status(&event, &mut failure),
            result = &mut task => break result,
        }
    };

    for event in events.drain() {
        note_status(&event, &mut failure);
    }
    receive_loop_code(result, failure)
}
