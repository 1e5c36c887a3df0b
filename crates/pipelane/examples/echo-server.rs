//! Minimal echo server. Serves one channel and answers every frame with
//! the same frame until Ctrl-C.
//!
//! Run with:
//!   cargo run --example echo-server --features peer
//!
//! In another terminal:
//!   cargo run --features cli -- send echo-example --type 7 --json '{"hello":"world"}'

use pipelane::frame::Binary;
use pipelane::peer::{message_channel, status_channel, PipeServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = PipeServer::<Binary>::new();
    let (messages, mut inbox) = message_channel();
    let (status, mut events) = status_channel();
    let mut task = server.receive("echo-example", messages, status, None);

    loop {
        tokio::select! {
            Some(frame) = inbox.recv() => {
                eprintln!("Received {} bytes, type {}", frame.payload.len(), frame.msg_type);
                server.send(frame).await?;
            }
            Some(event) = events.recv() => eprintln!("{event}"),
            _ = tokio::signal::ctrl_c() => server.shutdown(),
            result = &mut task => {
                if let Err(err) = result? {
                    if !err.is_cancelled() {
                        return Err(err.into());
                    }
                }
                break;
            }
        }
    }

    Ok(())
}
