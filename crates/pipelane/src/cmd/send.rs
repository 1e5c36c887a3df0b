use std::fs;

use pipelane_frame::{Binary, Frame, Framing, Text};
use pipelane_peer::{message_channel, status_channel, transact, ClientConfig, TransactionOutcome};
use tokio_util::sync::CancellationToken;

use crate::cmd::{build_runtime, install_ctrlc_handler, log_status, parse_duration, SendArgs};
use crate::exit::{outcome_code, peer_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{OutputFormat, Render};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ClientConfig {
        connect_timeout: parse_duration(&args.connect_timeout)?,
        connect_retries: args.retries,
        operation_timeout: parse_duration(&args.timeout)?,
        runtime_dir: args.endpoint.runtime_dir.clone(),
    };
    let payload = resolve_payload(&args)?;

    let cancel = CancellationToken::new();
    install_ctrlc_handler(cancel.clone())?;

    let runtime = build_runtime()?;
    if args.endpoint.text {
        let text = String::from_utf8(payload).map_err(|err| {
            CliError::new(DATA_INVALID, format!("text payload is not UTF-8: {err}"))
        })?;
        runtime.block_on(send::<Text>(&args, text, &config, cancel, format))
    } else {
        let frame = Frame::new(args.msg_type, payload);
        runtime.block_on(send::<Binary>(&args, frame, &config, cancel, format))
    }
}

async fn send<F>(
    args: &SendArgs,
    request: F::Message,
    config: &ClientConfig,
    cancel: CancellationToken,
    format: OutputFormat,
) -> CliResult<i32>
where
    F: Framing,
    F::Message: Render,
{
    let (status, mut events) = status_channel();
    let (responses, mut inbox) = message_channel();
    let outcome = transact::<F>(
        &args.endpoint.channel,
        request,
        &status,
        Some(&responses),
        Some(&cancel),
        config,
    )
    .await
    .map_err(|err| peer_error("send failed", err))?;

    for event in events.drain() {
        log_status(&event);
    }
    if let Some(response) = inbox.try_recv() {
        response.render(&args.endpoint.channel, format);
    }

    outcome_result(outcome)
}

fn outcome_result(outcome: TransactionOutcome) -> CliResult<i32> {
    if outcome.is_responded() {
        return Ok(SUCCESS);
    }
    Err(CliError::new(outcome_code(outcome), outcome.to_string()))
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}
