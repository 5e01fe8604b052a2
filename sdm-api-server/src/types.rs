use sdm_automation::{target, TaskOutcome};
use serde::Serialize;
use serde_json::Value;

/// A validated `POST /api/run` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub request_number: String,
    pub ticket_type: String,
    pub tasks: Vec<String>,
}

impl RunRequest {
    /// Read the body leniently: numbers are accepted wherever strings are, unparseable
    /// bodies count as empty. `None` when `requestNumber` is missing or blank.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        let body: Value = serde_json::from_slice(body).unwrap_or(Value::Null);

        let request_number = body
            .get("requestNumber")
            .and_then(scalar_text)
            .filter(|n| !n.is_empty())?;

        let ticket_type = body
            .get("ticketType")
            .and_then(scalar_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| target::DEFAULT_TICKET_TYPE.to_string());

        // an explicit empty list runs no tasks; only an absent field takes the defaults
        let tasks: Vec<String> = match body.get("tasks") {
            None | Some(Value::Null) => target::DEFAULT_TASKS.iter().map(|t| t.to_string()).collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(scalar_text)
                .filter(|t| !t.is_empty())
                .collect(),
            Some(other) => scalar_text(other).into_iter().filter(|t| !t.is_empty()).collect(),
        };

        Some(Self {
            request_number,
            ticket_type,
            tasks,
        })
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub success: bool,
    pub request_number: String,
    pub ticket_type: String,
    pub results: Vec<TaskOutcome>,
}
