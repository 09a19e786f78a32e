use super::spawn;
use super::types::{Control, DeadlineKind, Deadlines, LoopEvent, ProcessState, Shared};
use crate::config::WardenConfig;
use crate::error::WardenError;
use crate::events::{EventBus, LogStream, SupervisorEvent};
use crate::health::HealthProber;
use crate::launch::LaunchResolver;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// The single task that owns every piece of mutable lifecycle state:
/// the child handle, the state machine, the deadline slots and the
/// shutdown flag. Handles talk to it over the control channel; nothing
/// else may touch the child.
pub(crate) struct Daemon {
    config: WardenConfig,
    resolver: Box<dyn LaunchResolver>,
    bus: EventBus,
    shared: Arc<Mutex<Shared>>,
    prober: HealthProber,
    child: Option<Child>,
    deadlines: Deadlines,
    /// Set across the stop sequence so a reaped exit is not misread as
    /// a crash.
    stopping: bool,
}

impl Daemon {
    pub(crate) fn new(
        config: WardenConfig,
        resolver: Box<dyn LaunchResolver>,
        bus: EventBus,
        shared: Arc<Mutex<Shared>>,
    ) -> Self {
        let prober = HealthProber::new(config.engine.port);
        Self {
            config,
            resolver,
            bus,
            shared,
            prober,
            child: None,
            deadlines: Deadlines::default(),
            stopping: false,
        }
    }

    pub(crate) async fn run(mut self, mut controls: UnboundedReceiver<Control>) {
        loop {
            let event = self.fetch_event(&mut controls).await;
            match event {
                LoopEvent::Control(Control::EnsureRunning { seen_starts, reply }) => {
                    self.record_activity();
                    let result = match self.state() {
                        ProcessState::Running => Ok(()),
                        // The caller queued behind a start that has since
                        // failed; hand it that outcome instead of spawning
                        // again. Only an activation issued with no newer
                        // attempt on record may trigger one.
                        ProcessState::Error if self.shared.lock().starts > seen_starts => {
                            Err(WardenError::StartFailed)
                        }
                        _ => self.start_sequence().await,
                    };
                    let _ = reply.send(result);
                }
                LoopEvent::Control(Control::Start { reply }) => {
                    let result = match self.state() {
                        ProcessState::Running | ProcessState::Starting => Ok(()),
                        _ => self.start_sequence().await,
                    };
                    let _ = reply.send(result);
                }
                LoopEvent::Control(Control::Stop { reply }) => {
                    if self.child.is_some() {
                        info!("Stop requested");
                        self.stop_sequence().await;
                        self.set_state(ProcessState::Stopped);
                    }
                    let _ = reply.send(());
                }
                LoopEvent::Control(Control::Hibernate { reply }) => {
                    self.hibernate_sequence().await;
                    let _ = reply.send(());
                }
                LoopEvent::Control(Control::Activity) => self.record_activity(),
                LoopEvent::ChildExited(status) => self.handle_child_exit(status),
                LoopEvent::Deadline(kind) => self.handle_deadline(kind).await,
                LoopEvent::HandlesDropped => {
                    if self.child.is_some() {
                        info!("Supervisor dropped, tearing engine down");
                        self.stop_sequence().await;
                        self.set_state(ProcessState::Stopped);
                    }
                    break;
                }
            }
        }
        debug!("Daemon finished");
    }

    async fn fetch_event(&mut self, controls: &mut UnboundedReceiver<Control>) -> LoopEvent {
        let deadline = self.deadlines.next();
        let child = self.child.as_mut();
        tokio::select! {
            control = controls.recv() => match control {
                Some(control) => LoopEvent::Control(control),
                None => LoopEvent::HandlesDropped,
            },
            status = wait_child(child) => LoopEvent::ChildExited(status),
            kind = wait_deadline(deadline) => LoopEvent::Deadline(kind),
        }
    }

    fn state(&self) -> ProcessState {
        self.shared.lock().state
    }

    fn set_state(&mut self, to: ProcessState) {
        let from = {
            let mut shared = self.shared.lock();
            std::mem::replace(&mut shared.state, to)
        };
        if from != to {
            info!(%from, %to, "State changed");
            self.bus.publish(SupervisorEvent::StateChanged { from, to });
        }
    }

    /// Spawn and warm up. Returns only once the engine answered healthy or
    /// the attempt failed; either way the state machine has settled.
    #[instrument(skip(self))]
    async fn start_sequence(&mut self) -> Result<(), WardenError> {
        self.shared.lock().starts += 1;
        self.set_state(ProcessState::Starting);

        let Some(launch) = self.resolver.resolve().await else {
            return Err(self.fail_start(WardenError::LaunchNotFound));
        };

        let child = match spawn::spawn_engine(&launch, self.config.engine.port, &self.bus) {
            Ok(child) => child,
            Err(err) => return Err(self.fail_start(WardenError::Spawn(err))),
        };

        let now = Instant::now();
        {
            let mut shared = self.shared.lock();
            shared.pid = child.id();
            shared.started_at = Some(now);
            shared.last_activity = now;
        }
        self.child = Some(child);
        self.bus.publish(SupervisorEvent::Log {
            stream: LogStream::Info,
            line: "engine starting".into(),
        });

        match self.wait_until_healthy().await {
            Ok(()) => {
                self.set_state(ProcessState::Running);
                self.arm_health_tick();
                self.arm_hibernate();
                info!("Engine is up");
                Ok(())
            }
            Err(err) => {
                // A spawned-but-unhealthy process must not be left behind.
                self.kill_now().await;
                Err(self.fail_start(err))
            }
        }
    }

    /// Blocks until the engine answers healthy, it dies, or the startup
    /// ceiling elapses.
    async fn wait_until_healthy(&mut self) -> Result<(), WardenError> {
        let startup_timeout = self.config.health.startup_timeout;
        let poll_interval = self.config.health.poll_interval;
        let deadline = Instant::now() + startup_timeout;
        loop {
            if let Some(child) = self.child.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    warn!(%status, "Engine exited during startup");
                    return Err(WardenError::EarlyExit);
                }
            }
            if self.prober.check(poll_interval).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(WardenError::StartupTimeout(startup_timeout));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Failure bookkeeping shared by every path into the error state.
    fn fail_start(&mut self, err: WardenError) -> WardenError {
        warn!(%err, "Start failed");
        {
            let mut shared = self.shared.lock();
            shared.errors += 1;
            shared.pid = None;
            shared.started_at = None;
        }
        self.bus.publish(SupervisorEvent::Error {
            message: err.to_string(),
        });
        self.set_state(ProcessState::Error);
        err
    }

    /// Graceful termination with escalation. Resolves only once the
    /// process has actually exited, never merely once a signal was sent.
    #[instrument(skip(self))]
    async fn stop_sequence(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        self.stopping = true;
        self.deadlines.clear();
        self.shared.lock().hibernate_at = None;

        if let Some(pid) = child.id() {
            debug!(pid, "Sending SIGTERM");
            if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(?err, "Failed to signal engine");
            }
        }

        let grace = self.config.stop.grace_period;
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => info!(%status, "Engine exited"),
            Ok(Err(err)) => warn!(?err, "Waiting for engine exit failed"),
            Err(_) => {
                warn!(?grace, "Grace period elapsed, killing engine");
                if let Some(pid) = child.id() {
                    if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                        error!(?err, "Failed to kill engine");
                    }
                }
                match child.wait().await {
                    Ok(status) => info!(%status, "Engine killed"),
                    Err(err) => error!(?err, "Reaping killed engine failed"),
                }
            }
        }

        {
            let mut shared = self.shared.lock();
            shared.pid = None;
            shared.started_at = None;
        }
        self.stopping = false;
    }

    /// Immediate forceful termination, used to clean up after a failed
    /// startup. No grace, no events.
    async fn kill_now(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Err(err) = child.start_kill() {
            debug!(?err, "Engine already gone");
        }
        let _ = child.wait().await;
    }

    /// Idle-triggered shutdown. Same mechanics as a requested stop, kept
    /// separate so logs and observers can tell the two apart.
    async fn hibernate_sequence(&mut self) {
        if self.state() != ProcessState::Running {
            return;
        }
        info!(
            idle_window = ?self.config.hibernate.idle_window,
            "Idle window elapsed, hibernating engine"
        );
        self.set_state(ProcessState::Hibernating);
        self.stop_sequence().await;
        self.set_state(ProcessState::Stopped);
    }

    fn record_activity(&mut self) {
        let now = Instant::now();
        let running = {
            let mut shared = self.shared.lock();
            shared.last_activity = now;
            shared.state == ProcessState::Running
        };
        if running {
            self.arm_hibernate();
        }
    }

    /// Arms (or re-arms) the hibernate deadline and its advance warning
    /// from now. Overwriting the slots is the cancellation.
    fn arm_hibernate(&mut self) {
        let window = self.config.hibernate.idle_window;
        let lead = self.config.hibernate.warning_lead;
        let deadline = Instant::now() + window;
        self.deadlines.hibernate = Some(deadline);
        self.deadlines.hibernate_warning = if window > lead {
            Some(deadline - lead)
        } else {
            None
        };
        self.shared.lock().hibernate_at = Some(deadline);
    }

    fn arm_health_tick(&mut self) {
        self.deadlines.health_tick = Some(Instant::now() + self.config.health.check_interval);
    }

    async fn handle_deadline(&mut self, kind: DeadlineKind) {
        match kind {
            DeadlineKind::HibernateWarning => {
                self.deadlines.hibernate_warning = None;
                let seconds_remaining = self.config.hibernate.warning_lead.as_secs();
                info!(seconds_remaining, "Engine will hibernate soon");
                self.bus.publish(SupervisorEvent::HibernateWarning { seconds_remaining });
            }
            DeadlineKind::Hibernate => {
                self.deadlines.hibernate = None;
                self.hibernate_sequence().await;
            }
            DeadlineKind::HealthTick => {
                if self.state() != ProcessState::Running {
                    // Stale tick against a process being torn down.
                    self.deadlines.health_tick = None;
                    return;
                }
                self.arm_health_tick();
                self.spawn_steady_probe();
            }
        }
    }

    /// Fire-and-forget steady-state probe. Failures are logged and counted
    /// but never change state: a transient blip must not tear down a
    /// warmed-up, possibly mid-task engine.
    fn spawn_steady_probe(&self) {
        let prober = self.prober.clone();
        let shared = self.shared.clone();
        let bus = self.bus.clone();
        let timeout = self.config.health.check_timeout;
        tokio::spawn(async move {
            if prober.check(timeout).await {
                return;
            }
            let still_running = {
                let mut shared = shared.lock();
                if shared.state == ProcessState::Running {
                    shared.errors += 1;
                    true
                } else {
                    false
                }
            };
            if still_running {
                warn!("Steady-state health probe failed");
                bus.publish(SupervisorEvent::Log {
                    stream: LogStream::Info,
                    line: "health probe failed".into(),
                });
            }
        });
    }

    /// The child's exit surfaced outside a stop sequence: a crash.
    fn handle_child_exit(&mut self, status: std::io::Result<ExitStatus>) {
        if self.stopping {
            return;
        }
        let message = match &status {
            Ok(status) => format!("engine exited unexpectedly ({status})"),
            Err(err) => format!("engine exit status unavailable ({err})"),
        };
        error!("{message}");

        self.child = None;
        self.deadlines.clear();
        {
            let mut shared = self.shared.lock();
            shared.errors += 1;
            shared.pid = None;
            shared.started_at = None;
            shared.hibernate_at = None;
        }
        self.bus.publish(SupervisorEvent::Error { message });
        self.set_state(ProcessState::Error);
    }
}

async fn wait_child(child: Option<&mut Child>) -> std::io::Result<ExitStatus> {
    match child {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}

async fn wait_deadline(deadline: Option<(Instant, DeadlineKind)>) -> DeadlineKind {
    match deadline {
        Some((at, kind)) => {
            tokio::time::sleep_until(at).await;
            kind
        }
        None => std::future::pending().await,
    }
}
