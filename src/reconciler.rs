//! The lifecycle state machine.
//!
//! Every `ProcessState` mutation happens here. The dispatcher and poller
//! submit [`Evidence`] and the reconciler decides the transition. An
//! optimistic transient state (`Starting`/`Stopping`) entered for an
//! in-flight request outranks poll samples until the request resolves; only
//! at rest does a poll sample have the authority to force a transition.

use crate::model::{ActionOutcome, ActionResult, AuthoritativeStatus, ProcessHandle, ProcessState};

/// Display label for the managed long-running process.
const SYSTEM_LABEL: &str = "system";

/// Evidence proposed to the state machine.
#[derive(Debug, Clone)]
pub enum Evidence {
    /// User asked to start the system; advances optimistically to `Starting`
    /// before the request is sent.
    StartRequested,
    /// User asked to stop the system; advances optimistically to `Stopping`.
    StopRequested,
    /// The start request resolved. Transport failures arrive folded into a
    /// failure result.
    StartResolved(ActionResult),
    /// The stop request resolved. A "not running" reply arrives as success.
    StopResolved(ActionResult),
    /// A status poll sample. Subordinate to any in-flight action.
    Polled(AuthoritativeStatus),
}

/// Outcome of applying one piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Changed {
        from: ProcessState,
        to: ProcessState,
    },
    Unchanged,
    /// The guard refused the request; no network call may be made for it.
    Rejected { current: ProcessState },
}

#[derive(Debug)]
pub struct Reconciler {
    state: ProcessState,
    handle: Option<ProcessHandle>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            state: ProcessState::Offline,
            handle: None,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// The live handle; present only while the process is `Running`.
    pub fn handle(&self) -> Option<&ProcessHandle> {
        match self.state {
            ProcessState::Running => self.handle.as_ref(),
            _ => None,
        }
    }

    /// Apply one piece of evidence and report what happened.
    pub fn apply(&mut self, evidence: Evidence) -> Step {
        use ProcessState::*;

        let from = self.state;
        let to = match (from, evidence) {
            (s, Evidence::StartRequested) if s.can_start() => Starting,
            (s, Evidence::StartRequested) => return Step::Rejected { current: s },
            (s, Evidence::StopRequested) if s.can_stop() => Stopping,
            (s, Evidence::StopRequested) => return Step::Rejected { current: s },

            (Starting, Evidence::StartResolved(res)) => match res.outcome {
                ActionOutcome::Success => {
                    self.handle = Some(ProcessHandle {
                        pid: res.pid,
                        label: SYSTEM_LABEL.to_string(),
                    });
                    Running
                }
                // Rollback: a failed start returns to the pre-action state.
                ActionOutcome::Failure => Offline,
            },
            (Stopping, Evidence::StopResolved(res)) => match res.outcome {
                // Stopping an already-stopped process is not an error; the
                // "not running" reply arrives here as success.
                ActionOutcome::Success => Offline,
                ActionOutcome::Failure => Running,
            },
            // A resolution with no matching in-flight action carries no
            // authority.
            (_, Evidence::StartResolved(_) | Evidence::StopResolved(_)) => {
                return Step::Unchanged
            }

            // A sample racing the in-flight request must not overwrite the
            // optimistic state; the request's own resolution settles it.
            (Starting | Stopping, Evidence::Polled(_)) => return Step::Unchanged,
            // At rest the poll has authority: the process died or was killed
            // outside this session.
            (Running, Evidence::Polled(s)) if !s.system_running => Offline,
            (_, Evidence::Polled(_)) => return Step::Unchanged,
        };

        // The handle survives `Stopping` so a failed stop can restore it;
        // every path away from the running process drops it.
        match to {
            Running | Stopping => {}
            Offline | Starting | Error => self.handle = None,
        }
        self.state = to;
        Step::Changed { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(pid: u32) -> Reconciler {
        let mut r = Reconciler::new();
        assert!(matches!(r.apply(Evidence::StartRequested), Step::Changed { .. }));
        assert!(matches!(
            r.apply(Evidence::StartResolved(ActionResult::success(
                "System started",
                Some(pid)
            ))),
            Step::Changed { .. }
        ));
        r
    }

    fn polled(running: bool) -> Evidence {
        Evidence::Polled(AuthoritativeStatus {
            system_running: running,
        })
    }

    #[test]
    fn start_advances_optimistically_before_resolution() {
        let mut r = Reconciler::new();
        let step = r.apply(Evidence::StartRequested);
        assert_eq!(
            step,
            Step::Changed {
                from: ProcessState::Offline,
                to: ProcessState::Starting
            }
        );
        assert!(r.handle().is_none());
    }

    #[test]
    fn start_success_stores_handle_with_pid() {
        let r = started(1234);
        assert_eq!(r.state(), ProcessState::Running);
        assert_eq!(r.handle().unwrap().pid, Some(1234));
    }

    #[test]
    fn start_failure_rolls_back_to_offline_without_handle() {
        let mut r = Reconciler::new();
        r.apply(Evidence::StartRequested);
        let step = r.apply(Evidence::StartResolved(ActionResult::failure(
            "model not found",
        )));
        assert_eq!(
            step,
            Step::Changed {
                from: ProcessState::Starting,
                to: ProcessState::Offline
            }
        );
        assert!(r.handle().is_none());
    }

    #[test]
    fn start_rejected_while_a_start_is_in_flight() {
        let mut r = Reconciler::new();
        r.apply(Evidence::StartRequested);
        assert_eq!(
            r.apply(Evidence::StartRequested),
            Step::Rejected {
                current: ProcessState::Starting
            }
        );
        assert_eq!(r.state(), ProcessState::Starting);
    }

    #[test]
    fn start_rejected_while_running() {
        let mut r = started(1);
        assert_eq!(
            r.apply(Evidence::StartRequested),
            Step::Rejected {
                current: ProcessState::Running
            }
        );
    }

    #[test]
    fn stop_rejected_while_offline() {
        let mut r = Reconciler::new();
        assert_eq!(
            r.apply(Evidence::StopRequested),
            Step::Rejected {
                current: ProcessState::Offline
            }
        );
        assert_eq!(r.state(), ProcessState::Offline);
    }

    #[test]
    fn no_overlapping_start_and_stop_resolutions() {
        let mut r = Reconciler::new();
        r.apply(Evidence::StartRequested);
        // A stop cannot open while the start resolution is outstanding.
        assert!(matches!(
            r.apply(Evidence::StopRequested),
            Step::Rejected { .. }
        ));
        let mut r = started(1);
        r.apply(Evidence::StopRequested);
        assert!(matches!(
            r.apply(Evidence::StartRequested),
            Step::Rejected { .. }
        ));
    }

    #[test]
    fn stop_success_clears_handle() {
        let mut r = started(1234);
        r.apply(Evidence::StopRequested);
        let step = r.apply(Evidence::StopResolved(ActionResult::success(
            "System stopped",
            None,
        )));
        assert_eq!(
            step,
            Step::Changed {
                from: ProcessState::Stopping,
                to: ProcessState::Offline
            }
        );
        assert!(r.handle().is_none());
    }

    #[test]
    fn stop_against_already_stopped_process_resolves_offline() {
        let mut r = started(1234);
        r.apply(Evidence::StopRequested);
        let step = r.apply(Evidence::StopResolved(ActionResult::success(
            "System not running",
            None,
        )));
        assert_eq!(
            step,
            Step::Changed {
                from: ProcessState::Stopping,
                to: ProcessState::Offline
            }
        );
    }

    #[test]
    fn stop_failure_restores_running_with_the_previous_handle() {
        let mut r = started(1234);
        r.apply(Evidence::StopRequested);
        assert!(r.handle().is_none()); // stale while stopping
        let step = r.apply(Evidence::StopResolved(ActionResult::failure(
            "kill failed",
        )));
        assert_eq!(
            step,
            Step::Changed {
                from: ProcessState::Stopping,
                to: ProcessState::Running
            }
        );
        assert_eq!(r.handle().unwrap().pid, Some(1234));
    }

    #[test]
    fn poll_is_ignored_while_starting() {
        let mut r = Reconciler::new();
        r.apply(Evidence::StartRequested);
        assert_eq!(r.apply(polled(false)), Step::Unchanged);
        assert_eq!(r.apply(polled(true)), Step::Unchanged);
        assert_eq!(r.state(), ProcessState::Starting);
    }

    #[test]
    fn poll_is_ignored_while_stopping() {
        let mut r = started(1);
        r.apply(Evidence::StopRequested);
        assert_eq!(r.apply(polled(true)), Step::Unchanged);
        assert_eq!(r.state(), ProcessState::Stopping);
    }

    #[test]
    fn poll_detects_external_termination_at_rest() {
        let mut r = started(1234);
        let step = r.apply(polled(false));
        assert_eq!(
            step,
            Step::Changed {
                from: ProcessState::Running,
                to: ProcessState::Offline
            }
        );
        assert!(r.handle().is_none());
    }

    #[test]
    fn poll_matching_displayed_state_is_a_noop() {
        let mut r = Reconciler::new();
        assert_eq!(r.apply(polled(false)), Step::Unchanged);
        let mut r = started(1);
        assert_eq!(r.apply(polled(true)), Step::Unchanged);
        assert_eq!(r.state(), ProcessState::Running);
    }

    #[test]
    fn poll_reporting_running_while_offline_is_a_noop() {
        // The poll's authority covers externally-detected termination only.
        let mut r = Reconciler::new();
        assert_eq!(r.apply(polled(true)), Step::Unchanged);
        assert_eq!(r.state(), ProcessState::Offline);
    }

    #[test]
    fn stale_resolution_carries_no_authority() {
        let mut r = Reconciler::new();
        assert_eq!(
            r.apply(Evidence::StartResolved(ActionResult::success("", Some(9)))),
            Step::Unchanged
        );
        assert_eq!(
            r.apply(Evidence::StopResolved(ActionResult::failure("late"))),
            Step::Unchanged
        );
        assert_eq!(r.state(), ProcessState::Offline);
        assert!(r.handle().is_none());
    }
}
