use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

const SCHEMA_BASE: &str = "https://schemas.3leaps.dev/simpl/cli/v1";

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

pub fn schema_id(name: &str) -> String {
    format!("{SCHEMA_BASE}/{name}.schema.json")
}

/// One registration as shown by `ps`, `clean` and `slay`.
#[derive(Debug, Serialize)]
pub struct RegistrationRow {
    pub name: String,
    pub pid: u32,
    pub alive: bool,
}

#[derive(Serialize)]
struct RegistrationsOutput<'a> {
    schema_id: String,
    fifo_dir: String,
    action: &'a str,
    registrations: &'a [RegistrationRow],
}

pub fn print_registrations(
    action: &str,
    fifo_dir: &std::path::Path,
    rows: &[RegistrationRow],
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = RegistrationsOutput {
                schema_id: schema_id(action),
                fifo_dir: fifo_dir.display().to_string(),
                action,
                registrations: rows,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NAME", "PID", "ALIVE"]);
            for row in rows {
                table.add_row(vec![
                    row.name.clone(),
                    row.pid.to_string(),
                    yes_no(row.alive).to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                println!("name={} pid={} alive={}", row.name, row.pid, yes_no(row.alive));
            }
        }
        OutputFormat::Raw => {
            for row in rows {
                println!("{}", row.name);
            }
        }
    }
}

/// A message or proxy seen by the demo receiver, or a reply seen by the
/// demo sender.
#[derive(Debug, Serialize)]
pub struct MessageEvent<'a> {
    pub kind: &'a str,
    pub peer: &'a str,
    pub size: usize,
    pub payload: String,
    pub timestamp: String,
}

impl<'a> MessageEvent<'a> {
    pub fn new(kind: &'a str, peer: &'a str, payload: &[u8]) -> Self {
        Self {
            kind,
            peer,
            size: payload.len(),
            payload: payload_preview(payload),
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_event(event: &MessageEvent<'_>, raw: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct Tagged<'a> {
                schema_id: String,
                #[serde(flatten)]
                event: &'a MessageEvent<'a>,
            }
            let out = Tagged {
                schema_id: schema_id("message-event"),
                event,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "PEER", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    event.kind.to_string(),
                    event.peer.to_string(),
                    event.size.to_string(),
                    event.payload.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "kind={} peer={} size={} payload={}",
                event.kind, event.peer, event.size, event.payload
            );
        }
        OutputFormat::Raw => print_raw(raw),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

pub fn payload_preview(payload: &[u8]) -> String {
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
