//! Session controller.
//!
//! One task owns the reconciler. User commands, request resolutions, and
//! poll samples all arrive through a single select loop, so evidence is
//! applied in the order it resolves and handlers run to completion one at a
//! time. Nothing else touches lifecycle state.

use crate::api::ControlClient;
use crate::model::{
    ActionResult, ControllerConfig, JobKind, JobState, StartConfig, StateEvent,
};
use crate::orchestrator::dispatcher::ActionDispatcher;
use crate::orchestrator::poller;
use crate::reconciler::{Evidence, Reconciler, Step};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Commands emitted by front-ends to drive the session.
#[derive(Debug, Clone)]
pub(crate) enum Command {
    Start(StartConfig),
    Stop,
    Job(JobKind),
    /// Re-emit the current state for the presentation layer.
    Report,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Start,
    Stop,
}

/// The single in-flight start/stop request. The reconciler's guard ensures a
/// second one is never spawned while this is outstanding.
struct PendingAction {
    kind: PendingKind,
    handle: Option<tokio::task::JoinHandle<ActionResult>>,
}

pub(crate) async fn run_controller(
    cfg: ControllerConfig,
    event_tx: UnboundedSender<StateEvent>,
    mut cmd_rx: UnboundedReceiver<Command>,
) -> Result<()> {
    let client = Arc::new(ControlClient::new(&cfg)?);
    let dispatcher = ActionDispatcher::new(client.clone());
    let mut reconciler = Reconciler::new();
    let mut jobs: HashMap<JobKind, JobState> =
        JobKind::ALL.iter().map(|k| (*k, JobState::Idle)).collect();

    let (sample_tx, mut sample_rx) = mpsc::unbounded_channel();
    let poll_task = poller::spawn(
        client,
        cfg.poll_interval,
        cfg.poll_policy,
        sample_tx,
        event_tx.clone(),
    );

    let (job_tx, mut job_rx) = mpsc::unbounded_channel();
    let mut pending: Option<PendingAction> = None;

    let res = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Start(start)) => {
                        match reconciler.apply(Evidence::StartRequested) {
                            Step::Rejected { current } => {
                                let _ = event_tx.send(StateEvent::ActionRejected {
                                    reason: format!("cannot start while {current}"),
                                });
                            }
                            _ => {
                                emit_process(&event_tx, &reconciler);
                                pending = Some(PendingAction {
                                    kind: PendingKind::Start,
                                    handle: Some(dispatcher.spawn_start(start)),
                                });
                            }
                        }
                    }
                    Some(Command::Stop) => {
                        match reconciler.apply(Evidence::StopRequested) {
                            Step::Rejected { current } => {
                                let _ = event_tx.send(StateEvent::ActionRejected {
                                    reason: format!("cannot stop while {current}"),
                                });
                            }
                            _ => {
                                emit_process(&event_tx, &reconciler);
                                pending = Some(PendingAction {
                                    kind: PendingKind::Stop,
                                    handle: Some(dispatcher.spawn_stop()),
                                });
                            }
                        }
                    }
                    Some(Command::Job(kind)) => {
                        jobs.insert(kind, JobState::Requested);
                        let _ = event_tx.send(StateEvent::JobChanged {
                            kind,
                            state: JobState::Requested,
                        });
                        dispatcher.spawn_job(kind, job_tx.clone());
                    }
                    Some(Command::Report) => {
                        emit_process(&event_tx, &reconciler);
                        for (kind, state) in &jobs {
                            if *state != JobState::Idle {
                                let _ = event_tx.send(StateEvent::JobChanged {
                                    kind: *kind,
                                    state: state.clone(),
                                });
                            }
                        }
                    }
                    Some(Command::Quit) | None => break Ok(()),
                }
            }
            // Keep the JoinHandle in place until this branch wins; taking it
            // out in another branch would drop the future mid-flight and the
            // resolution would never be observed.
            maybe_done = async {
                if let Some(p) = &mut pending {
                    if let Some(h) = p.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    let kind = pending.take().map(|p| p.kind);
                    let result = match join_res {
                        Ok(r) => r,
                        Err(e) => ActionResult::failure(format!("request task failed: {e}")),
                    };
                    if !result.is_success() {
                        let _ = event_tx.send(StateEvent::ActionFailed {
                            message: result.message.clone(),
                        });
                    }
                    let evidence = match kind {
                        Some(PendingKind::Start) => Evidence::StartResolved(result),
                        Some(PendingKind::Stop) => Evidence::StopResolved(result),
                        None => continue,
                    };
                    if let Step::Changed { .. } = reconciler.apply(evidence) {
                        emit_process(&event_tx, &reconciler);
                    }
                }
            }
            Some(sample) = sample_rx.recv() => {
                if let Step::Changed { from, to } = reconciler.apply(Evidence::Polled(sample)) {
                    tracing::info!(%from, %to, "authoritative status contradicted displayed state");
                    let _ = event_tx.send(StateEvent::Info(
                        "system stopped outside this session".to_string(),
                    ));
                    emit_process(&event_tx, &reconciler);
                }
            }
            Some((kind, result)) = job_rx.recv() => {
                let state = JobState::Reported(result.message.clone());
                jobs.insert(kind, state.clone());
                let _ = event_tx.send(StateEvent::JobChanged { kind, state });
            }
        }
    };

    poll_task.abort();
    res
}

fn emit_process(event_tx: &UnboundedSender<StateEvent>, reconciler: &Reconciler) {
    let _ = event_tx.send(StateEvent::ProcessChanged {
        state: reconciler.state(),
        handle: reconciler.handle().cloned(),
    });
}
