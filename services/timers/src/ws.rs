//! Timer WebSocket channel
//!
//! Each connection belongs to one user. On open it receives all of the
//! user's timers, then an `update` frame on every tick that has something
//! to report: the live remaining time of running timers plus transitions
//! made elsewhere (other tabs, the expiry scheduler, REST upserts).

use std::str::FromStr;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use common::error::StoreError;
use common::protocol::{ClientFrame, CommandAction, ServerFrame, TimerDelta};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::events::TimerTransition;
use crate::repositories::Modification;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// Why a command could not be applied
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Timer not found")]
    NotFound,

    #[error("Failed to {0} timer")]
    Store(&'static str, #[source] StoreError),
}

/// State of one WebSocket connection
pub struct Session {
    id: Uuid,
    user_id: String,
    state: AppState,
    /// Transitions received since the last tick, one per timer
    pending: Vec<TimerDelta>,
}

impl Session {
    pub fn new(state: AppState, user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            state,
            pending: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Build the `init` frame and register running timers for expiry
    pub async fn open(&self) -> Result<ServerFrame, StoreError> {
        let now = self.state.timers.now_ms();
        let timers = self.state.timers.get_user_timers(&self.user_id).await?;

        for timer in timers.iter().filter(|t| t.is_running()) {
            self.state.scheduler.schedule(timer);
        }

        Ok(ServerFrame::Init {
            timers: timers.iter().map(|t| t.snapshot(now)).collect(),
        })
    }

    /// Queue a transition made elsewhere for the next tick
    pub fn on_transition(&mut self, transition: TimerTransition) {
        if transition.user_id != self.user_id || transition.origin == Some(self.id) {
            return;
        }

        match self
            .pending
            .iter_mut()
            .find(|delta| delta.id == transition.delta.id)
        {
            Some(existing) => *existing = transition.delta,
            None => self.pending.push(transition.delta),
        }
    }

    /// Compute the `update` frame for this tick, if there is anything to send.
    ///
    /// Running timers that reached zero are completed here; the completion
    /// is only reported by the caller that performed it.
    pub async fn tick(&mut self) -> Option<ServerFrame> {
        let mut deltas = Vec::new();

        match self.state.timers.get_user_timers(&self.user_id).await {
            Ok(timers) => {
                let now = self.state.timers.now_ms();
                for timer in timers.iter().filter(|t| t.is_running()) {
                    if timer.remaining_at(now) > 0 {
                        deltas.push(timer.delta(now));
                        continue;
                    }

                    match self
                        .state
                        .timers
                        .complete_if_expired(&self.user_id, &timer.id)
                        .await
                    {
                        Ok(Modification {
                            timer: completed,
                            changed: true,
                        }) => {
                            info!("Timer {} of user {} completed", completed.id, self.user_id);
                            let delta = completed.delta(now);
                            self.state
                                .hub
                                .publish(Some(self.id), &self.user_id, delta.clone());
                            deltas.push(delta);
                        }
                        Ok(_) => debug!("Timer {} already transitioned", timer.id),
                        Err(StoreError::NotFound) => {
                            debug!("Timer {} deleted during tick", timer.id)
                        }
                        Err(e) => error!("Failed to complete timer {}: {}", timer.id, e),
                    }
                }
            }
            Err(e) => error!("Failed to load timers of user {}: {}", self.user_id, e),
        }

        for delta in self.pending.drain(..) {
            if !deltas.iter().any(|d| d.id == delta.id) {
                deltas.push(delta);
            }
        }

        if deltas.is_empty() {
            None
        } else {
            Some(ServerFrame::Update { timers: deltas })
        }
    }

    /// Apply a command and publish the transition if it changed anything
    pub async fn command(&self, timer_id: &str, action: &str) -> Result<(), CommandError> {
        let action = CommandAction::from_str(action)
            .map_err(|_| CommandError::UnknownAction(action.to_string()))?;

        let timers = &self.state.timers;
        let result = match action {
            CommandAction::Pause => timers.pause_timer(&self.user_id, timer_id).await,
            CommandAction::Resume => timers.resume_timer(&self.user_id, timer_id).await,
            CommandAction::Complete => timers.complete_timer(&self.user_id, timer_id).await,
        };

        let modification = result.map_err(|e| match e {
            StoreError::NotFound => CommandError::NotFound,
            e => CommandError::Store(action.as_str(), e),
        })?;

        if modification.changed {
            let timer = &modification.timer;
            self.state.scheduler.schedule(timer);
            self.state
                .hub
                .publish(Some(self.id), &self.user_id, timer.delta(timers.now_ms()));
        }

        Ok(())
    }

    /// Reply to one text frame from the client
    pub async fn handle_text(&self, text: &str) -> ServerFrame {
        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Invalid frame from user {}: {}", self.user_id, e);
                return ServerFrame::error("Invalid message format");
            }
        };

        match frame {
            ClientFrame::Ping => ServerFrame::Pong,
            ClientFrame::Command { timer_id, action } => {
                match self.command(&timer_id, &action).await {
                    Ok(()) => ServerFrame::Ack { timer_id },
                    Err(e) => {
                        if let CommandError::Store(_, source) = &e {
                            error!("Command {} on timer {} failed: {}", action, timer_id, source);
                        }
                        ServerFrame::error(e.to_string())
                    }
                }
            }
        }
    }
}

/// Upgrade `GET /api/v2/timers/ws?userId=...`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| run_socket(socket, state, params.user_id))
}

fn encode(frame: &ServerFrame) -> Option<Message> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            error!("Failed to encode frame: {}", e);
            None
        }
    }
}

async fn run_socket(socket: WebSocket, state: AppState, user_id: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    let Some(user_id) = user_id.filter(|id| !id.is_empty()) else {
        if let Some(message) = encode(&ServerFrame::error("Missing userId")) {
            let _ = sender.send(message).await;
        }
        let _ = sender.send(Message::Close(None)).await;
        return;
    };

    // Subscribe before loading so no transition falls between the two
    let mut events = state.hub.subscribe();
    let mut session = Session::new(state.clone(), user_id);
    info!(
        "Timer socket {} opened for user {}",
        session.id(),
        session.user_id()
    );

    let init = match session.open().await {
        Ok(frame) => frame,
        Err(e) => {
            error!("Failed to load timers of user {}: {}", session.user_id(), e);
            ServerFrame::error("Failed to load timers")
        }
    };
    if let Some(message) = encode(&init) {
        if sender.send(message).await.is_err() {
            return;
        }
    }

    let mut ticker = tokio::time::interval(state.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        let reply = tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => Some(session.handle_text(&text).await),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => None,
                Some(Err(e)) => {
                    debug!("Timer socket {} receive error: {}", session.id(), e);
                    break;
                }
            },
            _ = ticker.tick() => session.tick().await,
            event = events.recv() => {
                match event {
                    Ok(transition) => session.on_transition(transition),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Timer socket {} missed {} transitions", session.id(), skipped)
                    }
                    Err(RecvError::Closed) => break,
                }
                None
            }
        };

        let Some(message) = reply.as_ref().and_then(encode) else {
            continue;
        };
        if sender.send(message).await.is_err() {
            break;
        }
    }

    info!(
        "Timer socket {} closed for user {}",
        session.id(),
        session.user_id()
    );
}
