//! Recurring status poll.
//!
//! Samples the control surface for the lifetime of the session and forwards
//! each sample to the controller. The next cycle is armed only after the
//! previous call completed, so slow responses throttle the poll rate on
//! their own. A failed poll never causes a transition; policy decides
//! whether it is even mentioned.

use crate::api::ControlClient;
use crate::model::{AuthoritativeStatus, PollPolicy, StateEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

pub(crate) fn spawn(
    client: Arc<ControlClient>,
    interval: Duration,
    policy: PollPolicy,
    sample_tx: UnboundedSender<AuthoritativeStatus>,
    event_tx: UnboundedSender<StateEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match client.status().await {
                Ok(sample) => {
                    if sample_tx.send(sample).is_err() {
                        // Controller is gone; the session is over.
                        break;
                    }
                }
                Err(err) => match policy {
                    PollPolicy::Ignore => {
                        tracing::debug!(%err, "status poll skipped");
                    }
                    PollPolicy::Report => {
                        let _ = event_tx
                            .send(StateEvent::Info(format!("status poll failed: {err}")));
                    }
                },
            }
            tokio::time::sleep(interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ControllerConfig, StartConfig};
    use tokio::sync::mpsc;

    fn unreachable_client() -> Arc<ControlClient> {
        let cfg = ControllerConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            poll_interval: Duration::from_millis(10),
            request_timeout: Duration::from_millis(200),
            poll_policy: PollPolicy::Ignore,
            user_agent: "visionctl-tests".to_string(),
            start: StartConfig {
                source: "0".to_string(),
                model: "yolov8n".to_string(),
                conf: 0.5,
            },
        };
        Arc::new(ControlClient::new(&cfg).expect("client should build"))
    }

    #[tokio::test]
    async fn report_policy_surfaces_failures_without_producing_samples() {
        let (sample_tx, mut sample_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let task = spawn(
            unreachable_client(),
            Duration::from_millis(10),
            PollPolicy::Report,
            sample_tx,
            event_tx,
        );

        let event = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
            .await
            .expect("expected an advisory event")
            .expect("event channel closed");
        assert!(matches!(event, StateEvent::Info(_)));
        assert!(sample_rx.try_recv().is_err());
        task.abort();
    }

    #[tokio::test]
    async fn ignore_policy_swallows_failures_silently() {
        let (sample_tx, mut sample_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let task = spawn(
            unreachable_client(),
            Duration::from_millis(10),
            PollPolicy::Ignore,
            sample_tx,
            event_tx,
        );

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(event_rx.try_recv().is_err());
        assert!(sample_rx.try_recv().is_err());
        task.abort();
    }
}
