//! Server synchronisation over the timer WebSocket
//!
//! Transport-agnostic: the embedding application owns the socket, feeds
//! received text frames to [`ServerSync::handle_message`] and asks the
//! sync for outgoing frames and reconnect delays.

use std::time::Duration;

use common::protocol::{ClientFrame, CommandAction, ServerFrame, TimerDelta};
use common::timer::TimerStatus;
use reqwest::Url;
use tracing::{info, warn};

use crate::error::{ClientError, ClientResult};

/// Interval between keepalive pings
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// What a server frame means for the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    TimersUpdated(Vec<TimerDelta>),
    TimerCompleted(String),
    ServerError(String),
    Pong,
}

/// Exponential reconnect backoff
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    attempts: u32,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 0,
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the next attempt, or `None` once attempts are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }

        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(self.attempts))
            .min(self.max_delay);
        self.attempts += 1;
        Some(delay)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Socket URL for `user_id`, derived from the HTTP base URL of the service
pub fn ws_url(base_url: &str, user_id: &str) -> ClientResult<Url> {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        return Err(ClientError::InvalidUrl(base_url.to_string()));
    };

    let mut url = Url::parse(&format!("{}/api/v2/timers/ws", ws_base))
        .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
    url.query_pairs_mut().append_pair("userId", user_id);
    Ok(url)
}

pub fn ping_frame() -> ClientResult<String> {
    Ok(serde_json::to_string(&ClientFrame::Ping)?)
}

pub fn command_frame(timer_id: &str, action: CommandAction) -> ClientResult<String> {
    Ok(serde_json::to_string(&ClientFrame::Command {
        timer_id: timer_id.to_string(),
        action: action.as_str().to_string(),
    })?)
}

/// Turn one server frame into sync events
pub fn decode_frame(text: &str) -> ClientResult<Vec<SyncEvent>> {
    let events = match serde_json::from_str::<ServerFrame>(text)? {
        ServerFrame::Init { timers } => vec![SyncEvent::TimersUpdated(
            timers
                .iter()
                .map(|timer| TimerDelta {
                    id: timer.id.clone(),
                    remaining: timer.remaining,
                    status: timer.status,
                })
                .collect(),
        )],
        ServerFrame::Update { timers } => {
            let completed: Vec<SyncEvent> = timers
                .iter()
                .filter(|delta| delta.status == TimerStatus::Completed)
                .map(|delta| SyncEvent::TimerCompleted(delta.id.clone()))
                .collect();

            let mut events = vec![SyncEvent::TimersUpdated(timers)];
            events.extend(completed);
            events
        }
        ServerFrame::Ack { .. } => Vec::new(),
        ServerFrame::Error { message } => vec![SyncEvent::ServerError(message)],
        ServerFrame::Pong => vec![SyncEvent::Pong],
    };

    Ok(events)
}

/// Connection state of one user's timer socket
#[derive(Debug, Clone)]
pub struct ServerSync {
    url: Url,
    connected: bool,
    reconnect: ReconnectPolicy,
}

impl ServerSync {
    pub fn new(base_url: &str, user_id: &str) -> ClientResult<Self> {
        Ok(Self {
            url: ws_url(base_url, user_id)?,
            connected: false,
            reconnect: ReconnectPolicy::default(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn on_open(&mut self) {
        info!("Connected to {}", self.url);
        self.connected = true;
        self.reconnect.reset();
    }

    /// Record a disconnect; returns how long to wait before reconnecting
    pub fn on_close(&mut self) -> Option<Duration> {
        self.connected = false;

        let delay = self.reconnect.next_delay();
        match delay {
            Some(delay) => info!("Disconnected, reconnecting in {:?}", delay),
            None => warn!("Max reconnect attempts reached for {}", self.url),
        }
        delay
    }

    /// Decode a received frame; undecodable frames are logged and dropped
    pub fn handle_message(&self, text: &str) -> Vec<SyncEvent> {
        match decode_frame(text) {
            Ok(events) => events,
            Err(e) => {
                warn!("Dropping server frame: {}", e);
                Vec::new()
            }
        }
    }

    /// Frame to send for a command, or `None` while disconnected
    pub fn command(&self, timer_id: &str, action: CommandAction) -> Option<String> {
        if !self.connected {
            warn!("Cannot send command, not connected");
            return None;
        }

        command_frame(timer_id, action).ok()
    }

    /// Keepalive frame, or `None` while disconnected
    pub fn ping(&self) -> Option<String> {
        if !self.connected {
            return None;
        }

        ping_frame().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url() {
        assert_eq!(
            ws_url("https://timers.example.com/", "u 1").unwrap().as_str(),
            "wss://timers.example.com/api/v2/timers/ws?userId=u+1"
        );
        assert_eq!(
            ws_url("http://localhost:3002", "u1").unwrap().as_str(),
            "ws://localhost:3002/api/v2/timers/ws?userId=u1"
        );
        assert!(ws_url("ftp://localhost", "u1").is_err());
    }

    #[test]
    fn test_reconnect_backoff() {
        let mut policy = ReconnectPolicy::default();
        let delays: Vec<u128> = std::iter::from_fn(|| policy.next_delay())
            .map(|d| d.as_millis())
            .collect();

        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        assert_eq!(policy.next_delay(), None);

        policy.reset();
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_reconnect_delay_is_capped() {
        let mut policy = ReconnectPolicy {
            max_attempts: 10,
            ..ReconnectPolicy::default()
        };
        let last = std::iter::from_fn(|| policy.next_delay()).last();
        assert_eq!(last, Some(Duration::from_millis(30_000)));
    }

    #[test]
    fn test_update_frame_reports_completions() {
        let events = decode_frame(
            r#"{"type":"update","timers":[
                {"id":"t1","remaining":12,"status":"running"},
                {"id":"t2","remaining":0,"status":"completed"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SyncEvent::TimersUpdated(deltas) if deltas.len() == 2));
        assert_eq!(events[1], SyncEvent::TimerCompleted("t2".to_string()));
    }

    #[test]
    fn test_other_frames() {
        assert_eq!(decode_frame(r#"{"type":"pong"}"#).unwrap(), vec![SyncEvent::Pong]);
        assert_eq!(
            decode_frame(r#"{"type":"error","message":"Missing userId"}"#).unwrap(),
            vec![SyncEvent::ServerError("Missing userId".to_string())]
        );
        assert!(decode_frame(r#"{"type":"ack","timerId":"t1"}"#).unwrap().is_empty());
        assert!(decode_frame("garbage").is_err());
    }

    #[test]
    fn test_commands_need_connection() {
        let mut sync = ServerSync::new("http://localhost:3002", "u1").unwrap();
        assert_eq!(sync.command("t1", CommandAction::Pause), None);

        sync.on_open();
        assert_eq!(
            sync.command("t1", CommandAction::Pause).unwrap(),
            r#"{"type":"command","timerId":"t1","action":"pause"}"#
        );
        assert_eq!(sync.ping().unwrap(), r#"{"type":"ping"}"#);

        assert_eq!(sync.on_close(), Some(Duration::from_secs(1)));
        assert!(!sync.is_connected());
        assert!(sync.handle_message("garbage").is_empty());
    }
}
