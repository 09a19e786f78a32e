//! The process-lifecycle supervisor.
//!
//! [`Supervisor`] is a cheap, cloneable handle; all mutable state lives in
//! a single daemon task (see `daemon.rs`) that owns the child process, the
//! state machine and the timers, and is driven by a control channel.
//! Operations arriving from any number of call sites are serialized by
//! construction, and at most one spawn attempt can ever be in flight.

mod daemon;
mod spawn;
mod types;

pub use types::{ProcessState, StatsSnapshot};

use crate::config::WardenConfig;
use crate::error::WardenError;
use crate::events::{EventBus, SupervisorEvent};
use crate::launch::LaunchResolver;
use daemon::Daemon;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{info_span, Instrument};
use types::{Control, Shared};

/// Handle to the engine supervisor.
///
/// Construct one per application (`Supervisor::new` spawns the daemon task,
/// so a tokio runtime must be current) and thread clones through to
/// whoever needs them. When the last handle is dropped the daemon performs
/// a final forced stop of any live engine and exits.
#[derive(Clone)]
pub struct Supervisor {
    control: mpsc::UnboundedSender<Control>,
    bus: EventBus,
    shared: Arc<Mutex<Shared>>,
    wait_ceiling: Duration,
}

impl Supervisor {
    pub fn new(config: WardenConfig, resolver: impl LaunchResolver + 'static) -> Self {
        let bus = EventBus::new(64);
        let shared = Arc::new(Mutex::new(Shared::new()));
        let wait_ceiling = config.activation.wait_ceiling;
        let (control, receiver) = mpsc::unbounded_channel();
        let daemon = Daemon::new(config, Box::new(resolver), bus.clone(), shared.clone());
        tokio::spawn(daemon.run(receiver).instrument(info_span!("warden")));
        Self {
            control,
            bus,
            shared,
            wait_ceiling,
        }
    }

    /// Activation entry point; call before dispatching any unit of work.
    ///
    /// Records activity first, so even a call that finds the engine already
    /// running resets the idle clock. Starts the engine when needed and
    /// waits until it is confirmed healthy, bounded by the activation
    /// ceiling. A call that finds a start already in flight shares that
    /// start's outcome; it never spawns a second attempt.
    pub async fn ensure_running(&self) -> Result<(), WardenError> {
        let seen_starts = self.shared.lock().starts;
        let (reply, result) = oneshot::channel();
        self.control
            .send(Control::EnsureRunning { seen_starts, reply })
            .map_err(|_| WardenError::SupervisorGone)?;
        match tokio::time::timeout(self.wait_ceiling, result).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(WardenError::SupervisorGone),
            Err(_) => Err(WardenError::ActivationTimeout(self.wait_ceiling)),
        }
    }

    /// Explicit start. No-op returning `Ok` when the engine is already
    /// starting or running; otherwise blocks through spawn and warm-up.
    pub async fn start(&self) -> Result<(), WardenError> {
        let (reply, result) = oneshot::channel();
        self.control
            .send(Control::Start { reply })
            .map_err(|_| WardenError::SupervisorGone)?;
        result.await.map_err(|_| WardenError::SupervisorGone)?
    }

    /// Stops the engine. Resolves only once the process has actually
    /// exited (gracefully or after force-kill escalation), never merely
    /// once a signal has been sent. No-op when nothing is running.
    pub async fn stop(&self) {
        let (reply, done) = oneshot::channel();
        if self.control.send(Control::Stop { reply }).is_ok() {
            let _ = done.await;
        }
    }

    /// Idle-policy shutdown; no-op unless the engine is running. Normally
    /// invoked by the hibernate timer, exposed for callers that want the
    /// same "this was policy, not a user stop" classification.
    pub async fn hibernate(&self) {
        let (reply, done) = oneshot::channel();
        if self.control.send(Control::Hibernate { reply }).is_ok() {
            let _ = done.await;
        }
    }

    /// Marks "work just happened": postpones hibernation by a full idle
    /// window. Fire-and-forget; per-caller ordering is preserved by the
    /// control channel.
    pub fn record_activity(&self) {
        let _ = self.control.send(Control::Activity);
    }

    pub fn is_available(&self) -> bool {
        self.shared.lock().state == ProcessState::Running
    }

    pub fn state(&self) -> ProcessState {
        self.shared.lock().state
    }

    /// Read-only snapshot of the supervisor's bookkeeping. No side effects.
    pub fn stats(&self) -> StatsSnapshot {
        let shared = self.shared.lock();
        let now = Instant::now();
        StatsSnapshot {
            state: shared.state,
            pid: shared.pid,
            uptime: shared
                .started_at
                .map(|at| now.saturating_duration_since(at)),
            idle: now.saturating_duration_since(shared.last_activity),
            until_hibernate: match shared.state {
                ProcessState::Running => shared
                    .hibernate_at
                    .map(|at| at.saturating_duration_since(now)),
                _ => None,
            },
            starts: shared.starts,
            errors: shared.errors,
        }
    }

    /// Subscribe to lifecycle events (state changes, log lines, errors,
    /// hibernate warnings).
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.bus.subscribe()
    }
}
