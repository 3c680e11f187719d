use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ofcore_controller::Event;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
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

/// One frame found by `slice`.
#[derive(Debug, Clone, Serialize)]
pub struct FrameRow {
    pub index: usize,
    pub version: String,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub length: usize,
    /// `None` for frames too short to carry one.
    pub xid: Option<u32>,
}

impl FrameRow {
    fn xid_label(&self, hex: bool) -> String {
        match (self.xid, hex) {
            (Some(xid), true) => format!("0x{xid:08x}"),
            (Some(xid), false) => xid.to_string(),
            (None, _) => "-".to_string(),
        }
    }
}

#[derive(Serialize)]
struct SliceOutput<'a> {
    frames: &'a [FrameRow],
    leftover: usize,
}

pub fn print_frames(rows: &[FrameRow], leftover: usize, raw: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = SliceOutput {
                frames: rows,
                leftover,
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
                .set_header(vec!["#", "VERSION", "TYPE", "LENGTH", "XID"]);
            for row in rows {
                table.add_row(vec![
                    row.index.to_string(),
                    row.version.clone(),
                    row.msg_type.clone(),
                    row.length.to_string(),
                    row.xid_label(true),
                ]);
            }
            println!("{table}");
            println!("{} frame(s), {leftover} leftover byte(s)", rows.len());
        }
        OutputFormat::Pretty => {
            for row in rows {
                println!(
                    "#{} version={} type={} length={} xid={}",
                    row.index,
                    row.version,
                    row.msg_type,
                    row.length,
                    row.xid_label(false)
                );
            }
            println!("leftover={leftover}");
        }
        OutputFormat::Raw => print_raw(raw),
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dpid: Option<String>,
    payload: serde_json::Value,
    timestamp: String,
}

pub fn print_event(event: &Event, format: OutputFormat) {
    let name = event.name();
    let dpid = event.dpid().map(|d| format!("{d:016x}"));
    let payload = event.payload();
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            let out = EventOutput {
                name: &name,
                dpid,
                payload,
                timestamp: now_unix_seconds(),
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
                .set_header(vec!["EVENT", "DPID", "PAYLOAD"])
                .add_row(vec![
                    name,
                    dpid.unwrap_or_else(|| "-".to_string()),
                    payload.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{name} dpid={} {}",
                dpid.unwrap_or_else(|| "-".to_string()),
                payload
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
