//! REST client for the timer service

use common::timer::{Timer, TimerStatus};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{ClientError, ClientResult};

/// Timer state sent when starting or pausing a timer on the server.
///
/// The server replaces the whole record on every upload, so pauses carry
/// the same fields as starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerUpload {
    pub timer_id: String,
    pub creation_id: String,
    pub duration: u64,
    pub label: String,
    pub remaining: u64,
    pub step_index: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertBody<'a> {
    user_id: &'a str,
    timer_id: &'a str,
    creation_id: &'a str,
    duration: u64,
    label: &'a str,
    remaining: u64,
    status: TimerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    step_index: Option<u32>,
}

#[derive(Deserialize)]
struct TimerEnvelope {
    timer: Timer,
}

#[derive(Deserialize)]
struct TimerListEnvelope {
    timers: Vec<Timer>,
}

/// Timer found in an instruction text
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedTimer {
    pub duration: u64,
    pub label: String,
    pub confidence: f64,
    pub raw_time_text: String,
}

#[derive(Deserialize)]
struct DetectEnvelope {
    timer: Option<DetectedTimer>,
}

/// Timer REST client bound to one user
#[derive(Debug, Clone)]
pub struct TimersClient {
    http: Client,
    base_url: String,
    user_id: String,
}

impl TimersClient {
    pub fn new(base_url: &str, user_id: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url, user_id)
    }

    pub fn with_client(http: Client, base_url: &str, user_id: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2/timers{}", self.base_url, path)
    }

    /// All timers of the user with their live remaining time
    pub async fn list(&self) -> ClientResult<Vec<Timer>> {
        let response = self
            .http
            .get(self.url(&format!("/{}", self.user_id)))
            .send()
            .await?;

        let envelope: TimerListEnvelope = check(response).await?.json().await?;
        Ok(envelope.timers)
    }

    /// Upload a timer as running from its `remaining` time
    pub async fn start(&self, timer: &TimerUpload) -> ClientResult<Timer> {
        self.upsert(timer, TimerStatus::Running).await
    }

    /// Upload a timer as paused at its `remaining` time
    pub async fn pause(&self, timer: &TimerUpload) -> ClientResult<Timer> {
        self.upsert(timer, TimerStatus::Paused).await
    }

    async fn upsert(&self, timer: &TimerUpload, status: TimerStatus) -> ClientResult<Timer> {
        let body = UpsertBody {
            user_id: &self.user_id,
            timer_id: &timer.timer_id,
            creation_id: &timer.creation_id,
            duration: timer.duration,
            label: &timer.label,
            remaining: timer.remaining,
            status,
            step_index: timer.step_index,
        };

        debug!("Uploading timer {} as {}", timer.timer_id, status);
        let response = self.http.post(self.url("")).json(&body).send().await?;

        let envelope: TimerEnvelope = check(response).await?.json().await?;
        Ok(envelope.timer)
    }

    pub async fn delete(&self, timer_id: &str) -> ClientResult<()> {
        let response = self
            .http
            .delete(self.url(&format!("/{}/{}", self.user_id, timer_id)))
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    /// Ask the server to find a timer in an instruction text
    pub async fn detect(&self, text: &str) -> ClientResult<Option<DetectedTimer>> {
        let response = self
            .http
            .post(self.url("/detect"))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        let envelope: DetectEnvelope = check(response).await?.json().await?;
        Ok(envelope.timer)
    }
}

/// Turn an error status into [`ClientError::Server`] with the server's message
async fn check(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(text);

    error!("Timer service returned {}: {}", status, message);
    Err(ClientError::Server {
        status: status.as_u16(),
        message,
    })
}
