use pipelane_frame::{Binary, Framing, Text};
use pipelane_peer::{message_channel, status_channel, PipeServer, ServerConfig};
use tokio_util::sync::CancellationToken;

use crate::cmd::{build_runtime, install_ctrlc_handler, note_status, receive_loop_code, ListenArgs};
use crate::exit::CliResult;
use crate::output::{OutputFormat, Render};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let cancel = CancellationToken::new();
    install_ctrlc_handler(cancel.clone())?;

    let runtime = build_runtime()?;
    if args.endpoint.text {
        runtime.block_on(listen::<Text>(&args, format, cancel))
    } else {
        runtime.block_on(listen::<Binary>(&args, format, cancel))
    }
}

async fn listen<F>(args: &ListenArgs, format: OutputFormat, cancel: CancellationToken) -> CliResult<i32>
where
    F: Framing,
    F::Message: Render,
{
    let server = PipeServer::<F>::with_config(ServerConfig {
        runtime_dir: args.endpoint.runtime_dir.clone(),
        ..ServerConfig::default()
    });
    let (messages, mut inbox) = message_channel();
    let (status, mut events) = status_channel();
    let mut task = server.receive(&args.endpoint.channel, messages, status, Some(cancel.clone()));

    let mut printed = 0usize;
    let mut failure = None;

    let result = loop {
        tokio::select! {
            Some(message) = inbox.recv() => {
                message.render(&args.endpoint.channel, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    cancel.cancel();
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
