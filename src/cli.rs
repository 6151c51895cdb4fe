use crate::model::{
    ControllerConfig, JobKind, JobState, PollPolicy, ProcessState, StartConfig, StateEvent,
};
use crate::orchestrator::{run_controller, Command};
use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "visionctl",
    version,
    about = "Lifecycle control for a vision detection stack over its HTTP control surface"
)]
pub struct Cli {
    /// Base URL of the control surface
    #[arg(long, default_value = "http://127.0.0.1:8000/api")]
    pub base_url: String,

    /// Capture source for start requests (camera index or stream path)
    #[arg(long, default_value = "0")]
    pub source: String,

    /// Detection model for start requests
    #[arg(long, default_value = "best_seg.pt")]
    pub model: String,

    /// Confidence threshold for start requests, between 0 and 1
    #[arg(long, default_value_t = 0.65)]
    pub conf: f64,

    /// Status poll interval
    #[arg(long, default_value = "2s")]
    pub poll_interval: humantime::Duration,

    /// Timeout for start/stop/job requests
    #[arg(long, default_value = "10s")]
    pub request_timeout: humantime::Duration,

    /// Surface status poll failures instead of dropping them silently
    #[arg(long)]
    pub report_poll_errors: bool,

    /// Issue a start request as soon as the session opens
    #[arg(long)]
    pub start_on_launch: bool,

    /// Run a single action, wait for it to settle, then exit
    #[arg(long, value_enum)]
    pub once: Option<OnceAction>,

    /// With --once: print the settled outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OnceAction {
    Start,
    Stop,
    Capture,
    Label,
    ManualLabel,
    Train,
}

pub async fn run(args: Cli) -> Result<()> {
    if !(0.0..=1.0).contains(&args.conf) {
        bail!("--conf must be between 0 and 1");
    }
    if args.json && args.once.is_none() {
        bail!("--json only applies to --once runs");
    }

    let cfg = build_config(&args);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let controller = tokio::spawn(run_controller(cfg, event_tx, cmd_rx));

    let res = match args.once {
        Some(action) => run_once(&args, action, &cmd_tx, event_rx).await,
        None => run_session(&args, &cmd_tx, event_rx).await,
    };

    let _ = cmd_tx.send(Command::Quit);
    controller.await.context("controller task failed")??;
    res
}

/// Build the controller configuration from CLI arguments.
pub fn build_config(args: &Cli) -> ControllerConfig {
    ControllerConfig {
        base_url: args.base_url.clone(),
        poll_interval: args.poll_interval.into(),
        request_timeout: args.request_timeout.into(),
        poll_policy: if args.report_poll_errors {
            PollPolicy::Report
        } else {
            PollPolicy::Ignore
        },
        user_agent: format!("visionctl/{}", env!("CARGO_PKG_VERSION")),
        start: StartConfig {
            source: args.source.clone(),
            model: args.model.clone(),
            conf: args.conf,
        },
    }
}

/// Interactive session: line commands on stdin, state events on stdout, the
/// poller running underneath for the lifetime of the session.
async fn run_session(
    args: &Cli,
    cmd_tx: &mpsc::UnboundedSender<Command>,
    mut event_rx: mpsc::UnboundedReceiver<StateEvent>,
) -> Result<()> {
    println!("control surface: {}", args.base_url);
    println!("commands: start, stop, capture, label, manual-label, train, status, quit");

    if args.start_on_launch {
        let _ = cmd_tx.send(Command::Start(build_config(args).start));
    }

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            ev = event_rx.recv() => {
                match ev {
                    Some(ev) => print_event(&ev),
                    None => break, // controller ended
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match parse_command(line, args) {
                            Some(Command::Quit) => break,
                            Some(cmd) => {
                                let _ = cmd_tx.send(cmd);
                            }
                            None => println!("unknown command: {line}"),
                        }
                    }
                    Ok(None) => break, // stdin closed
                    Err(e) => return Err(e).context("failed to read stdin"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

/// Map an input line to a controller command.
fn parse_command(line: &str, args: &Cli) -> Option<Command> {
    match line {
        "start" => Some(Command::Start(build_config(args).start)),
        "stop" => Some(Command::Stop),
        "capture" => Some(Command::Job(JobKind::Capture)),
        "label" => Some(Command::Job(JobKind::Label)),
        "manual-label" => Some(Command::Job(JobKind::ManualLabel)),
        "train" => Some(Command::Job(JobKind::Train)),
        "status" => Some(Command::Report),
        "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

/// Drive a single action to a settled outcome and report it.
async fn run_once(
    args: &Cli,
    action: OnceAction,
    cmd_tx: &mpsc::UnboundedSender<Command>,
    mut event_rx: mpsc::UnboundedReceiver<StateEvent>,
) -> Result<()> {
    let cmd = match action {
        OnceAction::Start => Command::Start(build_config(args).start),
        OnceAction::Stop => Command::Stop,
        OnceAction::Capture => Command::Job(JobKind::Capture),
        OnceAction::Label => Command::Job(JobKind::Label),
        OnceAction::ManualLabel => Command::Job(JobKind::ManualLabel),
        OnceAction::Train => Command::Job(JobKind::Train),
    };
    let _ = cmd_tx.send(cmd);

    // The first settled observation ends the run: a non-transient process
    // state for start/stop, a reported state for jobs.
    let mut failure: Option<String> = None;
    while let Some(ev) = event_rx.recv().await {
        match &ev {
            StateEvent::ProcessChanged { state, handle } if !state.is_transient() => {
                if let Some(message) = failure.take() {
                    bail!("{message}");
                }
                if args.json {
                    let summary = serde_json::json!({
                        "state": state,
                        "pid": handle.as_ref().and_then(|h| h.pid),
                    });
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                } else {
                    print_event(&ev);
                }
                return Ok(());
            }
            StateEvent::ActionRejected { reason } => {
                bail!("rejected: {reason}");
            }
            StateEvent::ActionFailed { message } => {
                failure = Some(message.clone());
            }
            StateEvent::JobChanged {
                kind,
                state: JobState::Reported(message),
            } => {
                if args.json {
                    let summary = serde_json::json!({ "job": kind, "message": message });
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                } else {
                    print_event(&ev);
                }
                return Ok(());
            }
            _ => {}
        }
    }
    bail!("controller ended before the action settled");
}

fn print_event(ev: &StateEvent) {
    match ev {
        StateEvent::ProcessChanged { state, handle } => match (state, handle) {
            (ProcessState::Running, Some(h)) => match h.pid {
                Some(pid) => println!("system: running (PID {pid})"),
                None => println!("system: running"),
            },
            _ => println!("system: {state}"),
        },
        StateEvent::ActionRejected { reason } => println!("rejected: {reason}"),
        StateEvent::ActionFailed { message } => println!("error: {message}"),
        StateEvent::JobChanged { kind, state } => match state {
            JobState::Idle => {}
            JobState::Requested => println!("{kind}: requested"),
            JobState::Reported(message) if message.is_empty() => println!("{kind}: done"),
            JobState::Reported(message) => println!("{kind}: {message}"),
        },
        StateEvent::Info(message) => println!("{message}"),
    }
}
