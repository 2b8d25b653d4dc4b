//! WebSocket frames exchanged on `/api/v2/timers/ws`
//!
//! Every frame is a JSON object tagged by its `type` field.

use serde::{Deserialize, Serialize};

use crate::timer::{Timer, TimerStatus};

/// Remaining time and status of one timer inside an `update` frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerDelta {
    pub id: String,
    pub remaining: u64,
    pub status: TimerStatus,
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// All timers of the user, sent once on connect
    Init { timers: Vec<Timer> },
    /// Batched deltas, sent at most once per tick
    Update { timers: Vec<TimerDelta> },
    /// A command was applied
    Ack {
        #[serde(rename = "timerId")]
        timer_id: String,
    },
    Error { message: String },
    Pong,
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }
}

/// Frames sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Ping,
    Command {
        #[serde(rename = "timerId")]
        timer_id: String,
        action: String,
    },
}

/// Timer command carried by a `command` frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    Pause,
    Resume,
    Complete,
}

impl CommandAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandAction::Pause => "pause",
            CommandAction::Resume => "resume",
            CommandAction::Complete => "complete",
        }
    }
}

impl std::str::FromStr for CommandAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pause" => Ok(CommandAction::Pause),
            "resume" => Ok(CommandAction::Resume),
            "complete" => Ok(CommandAction::Complete),
            other => Err(format!("Unknown action: {}", other)),
        }
    }
}
