//! Messages exchanged with the browser UI. Every frame is a JSON object
//! `{"event": <name>, "data": <payload>}`; payload-less events omit `data`.

use sdm_automation::parse_ticket_lines;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SetUser {
        first: String,
        last: String,
    },
    UploadBatch(BatchUpload),
    StartBatch {
        #[serde(rename = "type", default)]
        ticket_type: Option<String>,
    },
    ProcessCurrentTicket(Vec<String>),
    SkipCurrentTicket,
}

/// Ticket numbers as already-split lines, or the raw file content.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BatchUpload {
    Lines(Vec<String>),
    Text(String),
}

impl BatchUpload {
    /// Purely numeric lines, trimmed, in upload order.
    pub fn into_tickets(self) -> Vec<String> {
        match self {
            BatchUpload::Lines(lines) => parse_ticket_lines(&lines.join("\n")),
            BatchUpload::Text(text) => parse_ticket_lines(&text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Log {
        #[serde(rename = "type")]
        level: LogLevel,
        msg: String,
    },
    TicketReady {
        index: usize,
        total: usize,
        #[serde(rename = "ticketNum")]
        ticket_num: String,
        tasks: Vec<String>,
    },
    LoadingTicket,
    BatchComplete,
}
