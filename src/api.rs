//! HTTP client for the control surface.
//!
//! The control surface owns process spawning and killing; this client only
//! issues requests and classifies their outcomes. A server-reported failure
//! and a transport-level failure are distinct cases and never conflated.

use crate::model::{
    ActionResult, AuthoritativeStatus, ControllerConfig, JobKind, StartConfig,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stop reply meaning the process was already gone. Treated as an
/// equivalent success.
const NOT_RUNNING_REPLY: &str = "System not running";

#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered and reported a failure; the message is shown
    /// verbatim.
    #[error("{message}")]
    Server { message: String },
    /// The request never completed: refused, timed out, or the body was
    /// unreadable.
    #[error("connection error")]
    Connection(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct StartRequest<'a> {
    source: &'a str,
    model: &'a str,
    conf: f64,
}

#[derive(Debug, Deserialize)]
struct ActionReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    pid: Option<u32>,
}

/// Labeling and training endpoints reply with a bare message and no status
/// discriminator.
#[derive(Debug, Deserialize)]
struct MessageReply {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    #[serde(default)]
    system: Option<String>,
}

pub struct ControlClient {
    http: reqwest::Client,
    base_url: String,
}

impl ControlClient {
    pub fn new(cfg: &ControllerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .user_agent(cfg.user_agent.clone())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// `POST /start-system` with the start parameters.
    pub async fn start_system(&self, start: &StartConfig) -> Result<ActionResult, ApiError> {
        let reply: ActionReply = self
            .http
            .post(self.url("start-system"))
            .json(&StartRequest {
                source: &start.source,
                model: &start.model,
                conf: start.conf,
            })
            .send()
            .await?
            .json()
            .await?;
        fold_reply(reply)
    }

    /// `POST /stop-system`. A "System not running" reply counts as success.
    pub async fn stop_system(&self) -> Result<ActionResult, ApiError> {
        let reply: ActionReply = self
            .http
            .post(self.url("stop-system"))
            .send()
            .await?
            .json()
            .await?;
        if reply.message.as_deref() == Some(NOT_RUNNING_REPLY) {
            return Ok(ActionResult::success(NOT_RUNNING_REPLY, None));
        }
        fold_reply(reply)
    }

    /// Fire a one-shot job. Capture replies carry a status discriminator and
    /// a pid; labeling and training replies are a bare message.
    pub async fn run_job(&self, kind: JobKind) -> Result<ActionResult, ApiError> {
        let resp = self.http.post(self.url(kind.endpoint())).send().await?;
        match kind {
            JobKind::Capture => {
                let reply: ActionReply = resp.json().await?;
                fold_reply(reply)
            }
            JobKind::Label | JobKind::ManualLabel | JobKind::Train => {
                let reply: MessageReply = resp.json().await?;
                Ok(ActionResult::success(reply.message.unwrap_or_default(), None))
            }
        }
    }

    /// `GET /status`: the server's current view of tracked processes. Keys
    /// other than `system` are tolerated and ignored.
    pub async fn status(&self) -> Result<AuthoritativeStatus, ApiError> {
        let reply: StatusReply = self
            .http
            .get(self.url("status"))
            .send()
            .await?
            .json()
            .await?;
        Ok(AuthoritativeStatus {
            system_running: reply.system.as_deref() == Some("running"),
        })
    }
}

/// Classify a discriminated reply: any status other than "success" is a
/// server-reported failure.
fn fold_reply(reply: ActionReply) -> Result<ActionResult, ApiError> {
    let message = reply.message.unwrap_or_default();
    match reply.status.as_deref() {
        Some("success") => Ok(ActionResult::success(message, reply.pid)),
        Some(_) => Err(ApiError::Server { message }),
        None => Err(ApiError::Server {
            message: if message.is_empty() {
                "malformed reply".to_string()
            } else {
                message
            },
        }),
    }
}
