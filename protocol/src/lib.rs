//! Wire types for the runner's client channel and health endpoint.
//!
//! Everything a client sends or receives over the WebSocket is one of the
//! JSON shapes defined here. The enums are internally tagged on `type` so a
//! message like `{"type": "input", "data": "a"}` round-trips without any
//! manual dispatch.

use serde::Deserialize;
use serde::Serialize;

/// A message received from the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Submit source code for compilation and execution.
    Code { language: String, source: String },
    /// Stream data to the running program's stdin.
    Input { data: String },
    /// Ask the server to end the session.
    Exit,
}

/// A tagged frame emitted to the client.
///
/// Frames on one connection are totally ordered: they all pass through the
/// session's single writer task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    CompileSuccess {
        stdout: String,
    },
    CompileError {
        stderr: String,
    },
    Stdout {
        data: String,
    },
    Stderr {
        data: String,
    },
    /// Echo of an `input` payload so the client can render the keystroke.
    Echo {
        data: String,
    },
    Exit {
        #[serde(skip_serializing_if = "Option::is_none")]
        return_code: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
    Error {
        error: String,
    },
}

impl Frame {
    /// Frame emitted by the waiter when the program terminates. `error` is
    /// omitted entirely when the wait itself succeeded.
    pub fn process_exit(return_code: i32, error: Option<String>) -> Self {
        Frame::Exit {
            return_code: Some(return_code),
            error,
            data: None,
        }
    }

    /// Frame emitted in response to a client-requested `exit`.
    pub fn client_exit() -> Self {
        Frame::Exit {
            return_code: None,
            error: None,
            data: Some("Process exit".to_string()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Frame::Error {
            error: message.into(),
        }
    }
}

/// Snapshot returned by `GET /health`.
///
/// Field names are part of the HTTP contract, hence the camelCase renames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(rename = "maxBoxes")]
    pub max_boxes: usize,
    pub available: usize,
    #[serde(rename = "inUse")]
    pub in_use: usize,
}
