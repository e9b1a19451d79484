use std::io::{IsTerminal, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use buildtap_frame::Frame;
use buildtap_payload::{DecodedMessage, MessageBody, Value};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
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

#[derive(Serialize)]
struct MessageOutput<'a> {
    index: usize,
    channel_id: u64,
    payload_size: usize,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<String>,
}

/// Prints decoded messages one at a time.
///
/// Table output is accumulated and rendered once by [`MessagePrinter::finish`].
pub struct MessagePrinter {
    format: OutputFormat,
    table: Option<Table>,
    printed: usize,
}

impl MessagePrinter {
    pub fn new(format: OutputFormat) -> Self {
        let table = matches!(format, OutputFormat::Table).then(|| {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "CHANNEL", "SIZE", "STATUS", "CONTENT"]);
            table
        });
        Self {
            format,
            table,
            printed: 0,
        }
    }

    pub fn printed(&self) -> usize {
        self.printed
    }

    pub fn print(&mut self, frame: &Frame, message: &DecodedMessage) {
        let index = self.printed;
        self.printed += 1;

        match self.format {
            OutputFormat::Json => {
                let out = message_output(index, frame, message);
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Table => {
                if let Some(table) = self.table.as_mut() {
                    table.add_row(vec![
                        index.to_string(),
                        message.channel.to_string(),
                        frame.payload.len().to_string(),
                        status_name(message).to_string(),
                        content_preview(message),
                    ]);
                }
            }
            OutputFormat::Pretty => {
                println!(
                    "#{index} channel={} size={} {}",
                    message.channel,
                    frame.payload.len(),
                    content_preview(message)
                );
            }
            OutputFormat::Raw => print_raw(frame.payload.as_ref()),
        }
    }

    pub fn finish(self) {
        if let Some(table) = self.table {
            if self.printed > 0 {
                println!("{table}");
            }
        }
    }
}

fn message_output<'a>(
    index: usize,
    frame: &Frame,
    message: &'a DecodedMessage,
) -> MessageOutput<'a> {
    let (values, error, raw) = match &message.body {
        MessageBody::Values(values) => (Some(values.as_slice()), None, None),
        MessageBody::Undecodable { reason, raw } => {
            (None, Some(reason.as_str()), Some(STANDARD.encode(raw)))
        }
    };
    MessageOutput {
        index,
        channel_id: message.channel,
        payload_size: frame.payload.len(),
        status: status_name(message),
        values,
        error,
        raw,
    }
}

fn status_name(message: &DecodedMessage) -> &'static str {
    if message.is_decoded() {
        "decoded"
    } else {
        "undecodable"
    }
}

fn content_preview(message: &DecodedMessage) -> String {
    match &message.body {
        MessageBody::Values(values) => values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" "),
        MessageBody::Undecodable { reason, raw } => {
            format!("undecodable ({reason}), {} raw bytes", raw.len())
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}
