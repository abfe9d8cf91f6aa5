//! Rendering of trace messages as text or JSON lines

use crate::config::OutputFormat;
use anyhow::Result;
use can_trace_decoder::{OutputEvent, TraceMessage};
use serde::ser::{Serialize, Serializer};

/// One JSON line per trace message
#[derive(serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JsonMessage<'a> {
    StreamBeginning {
        stream: &'a str,
    },
    Event {
        stream: &'a str,
        name: &'a str,
        timestamp: i32,
        frame_id: i32,
        fields: Fields<'a>,
    },
    StreamEnd {
        stream: &'a str,
    },
}

/// Event fields serialized as a map in schema order
struct Fields<'a>(&'a OutputEvent<'a>);

impl Serialize for Fields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.fields())
    }
}

/// Render one message of the trace named `stream`
pub fn render(format: OutputFormat, stream: &str, message: &TraceMessage<'_>) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(stream, message)),
        OutputFormat::Json => {
            let json = match message {
                TraceMessage::StreamBeginning => JsonMessage::StreamBeginning { stream },
                TraceMessage::Event(event) => JsonMessage::Event {
                    stream,
                    name: event.name(),
                    timestamp: event.timestamp,
                    frame_id: event.frame_id,
                    fields: Fields(event),
                },
                TraceMessage::StreamEnd => JsonMessage::StreamEnd { stream },
            };
            Ok(serde_json::to_string(&json)?)
        }
    }
}

fn render_text(stream: &str, message: &TraceMessage<'_>) -> String {
    match message {
        TraceMessage::StreamBeginning => format!("=== begin {} ===", stream),
        TraceMessage::Event(event) => {
            let fields: Vec<String> = event
                .fields()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect();
            let seconds = event.elapsed().num_milliseconds() as f64 / 1000.0;
            format!(
                "[{:.3}s] 0x{:03X} {} {}",
                seconds,
                event.frame_id,
                event.name(),
                fields.join(" ")
            )
        }
        TraceMessage::StreamEnd => format!("=== end {} ===", stream),
    }
}
