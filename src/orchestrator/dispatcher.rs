//! Issues start/stop/job requests and folds their outcomes.
//!
//! The dispatcher never touches lifecycle state itself: the controller
//! advances the reconciler optimistically before a request is spawned and
//! folds the resolution back in once it completes.

use crate::api::{ApiError, ControlClient};
use crate::model::{ActionResult, JobKind, StartConfig};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Fixed text shown when a request never completed. Server-reported failure
/// messages are shown verbatim instead.
pub(crate) const CONNECTION_ERROR: &str = "Connection error";

pub(crate) struct ActionDispatcher {
    client: Arc<ControlClient>,
}

impl ActionDispatcher {
    pub fn new(client: Arc<ControlClient>) -> Self {
        Self { client }
    }

    /// Spawn the start request; resolves to a plain result, never an error.
    pub fn spawn_start(&self, start: StartConfig) -> JoinHandle<ActionResult> {
        let client = self.client.clone();
        tokio::spawn(async move { fold(client.start_system(&start).await) })
    }

    pub fn spawn_stop(&self) -> JoinHandle<ActionResult> {
        let client = self.client.clone();
        tokio::spawn(async move { fold(client.stop_system().await) })
    }

    /// Fire a one-shot job and report its resolution on `done_tx`. Jobs never
    /// influence the lifecycle state of the system process.
    pub fn spawn_job(&self, kind: JobKind, done_tx: UnboundedSender<(JobKind, ActionResult)>) {
        let client = self.client.clone();
        tokio::spawn(async move {
            let result = fold(client.run_job(kind).await);
            let _ = done_tx.send((kind, result));
        });
    }
}

/// Collapse the error taxonomy into a displayable result: server failures
/// keep their message, transport failures get the fixed text.
fn fold(res: Result<ActionResult, ApiError>) -> ActionResult {
    match res {
        Ok(r) => r,
        Err(ApiError::Server { message }) => ActionResult::failure(message),
        Err(err @ ApiError::Connection(_)) => {
            tracing::debug!(%err, "request did not complete");
            ActionResult::failure(CONNECTION_ERROR)
        }
    }
}
