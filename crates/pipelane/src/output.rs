use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pipelane_frame::Frame;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A received message the CLI can print.
pub trait Render {
    fn render(&self, channel: &str, format: OutputFormat);
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    channel: &'a str,
    msg_type: i32,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

#[derive(Serialize)]
struct TextOutput<'a> {
    channel: &'a str,
    size: usize,
    text: &'a str,
    timestamp: String,
}

impl Render for Frame {
    fn render(&self, channel: &str, format: OutputFormat) {
        let frame = self;
        match format {
            OutputFormat::Json => {
                let out = FrameOutput {
                    channel,
                    msg_type: frame.msg_type,
                    payload_size: frame.payload.len(),
                    payload: payload_preview(frame.payload.as_ref()),
                    timestamp: now_unix_seconds(),
                };
                print_json(&out);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(vec!["CHANNEL", "TYPE", "SIZE", "PAYLOAD"])
                    .add_row(vec![
                        channel.to_string(),
                        frame.msg_type.to_string(),
                        frame.payload.len().to_string(),
                        payload_preview(frame.payload.as_ref()),
                    ]);
                println!("{table}");
            }
            OutputFormat::Pretty => {
                println!(
                    "channel={} type={} size={} payload={}",
                    channel,
                    frame.msg_type,
                    frame.payload.len(),
                    payload_preview(frame.payload.as_ref())
                );
            }
            OutputFormat::Raw => print_raw(frame.payload.as_ref()),
        }
    }
}

impl Render for String {
    fn render(&self, channel: &str, format: OutputFormat) {
        let text = self.as_str();
        match format {
            OutputFormat::Json => {
                let out = TextOutput {
                    channel,
                    size: text.len(),
                    text,
                    timestamp: now_unix_seconds(),
                };
                print_json(&out);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(vec!["CHANNEL", "SIZE", "TEXT"])
                    .add_row(vec![
                        channel.to_string(),
                        text.len().to_string(),
                        text.to_string(),
                    ]);
                println!("{table}");
            }
            OutputFormat::Pretty => {
                println!("channel={} size={} text={}", channel, text.len(), text);
            }
            OutputFormat::Raw => print_raw(text.as_bytes()),
        }
    }
}

#[derive(Serialize)]
struct ChannelsOutput<'a> {
    runtime_dir: String,
    channels: &'a [String],
}

pub fn print_channels(runtime_dir: &std::path::Path, channels: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ChannelsOutput {
            runtime_dir: runtime_dir.display().to_string(),
            channels,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL"]);
            for channel in channels {
                table.add_row(vec![channel.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for channel in channels {
                println!("{channel}");
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
