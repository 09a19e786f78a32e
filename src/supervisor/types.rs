use crate::error::WardenError;
use serde::Serialize;
use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// The authoritative lifecycle state. Exactly one value is active at any
/// instant and every decision in the supervisor is keyed off it; no
/// derived or duplicated flags exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Hibernating,
    Error,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Hibernating => "hibernating",
            ProcessState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Read-only snapshot of the supervisor's bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub state: ProcessState,
    pub pid: Option<u32>,
    /// Time since process start; `None` when no process is live.
    pub uptime: Option<Duration>,
    /// Time since the last recorded activity.
    pub idle: Duration,
    /// Time until automatic hibernation; only meaningful while running.
    pub until_hibernate: Option<Duration>,
    pub starts: u64,
    pub errors: u64,
}

/// Messages from handles to the daemon.
#[derive(Debug)]
pub(crate) enum Control {
    EnsureRunning {
        /// Value of the start counter when the caller issued the request.
        /// Lets the daemon tell a fresh activation apart from one that was
        /// queued behind a start attempt that has since settled.
        seen_starts: u64,
        reply: oneshot::Sender<Result<(), WardenError>>,
    },
    Start {
        reply: oneshot::Sender<Result<(), WardenError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Hibernate {
        reply: oneshot::Sender<()>,
    },
    Activity,
}

/// What woke the daemon loop up.
#[derive(Debug)]
pub(crate) enum LoopEvent {
    Control(Control),
    ChildExited(std::io::Result<ExitStatus>),
    Deadline(DeadlineKind),
    /// Every handle was dropped; tear down and exit.
    HandlesDropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeadlineKind {
    HibernateWarning,
    Hibernate,
    HealthTick,
}

/// The three cancellable timers, rendered as deadline slots. Re-arming
/// overwrites the slot and cancelling clears it, so a stale timer can
/// never fire twice.
#[derive(Debug, Default)]
pub(crate) struct Deadlines {
    pub hibernate_warning: Option<Instant>,
    pub hibernate: Option<Instant>,
    pub health_tick: Option<Instant>,
}

impl Deadlines {
    /// Earliest armed deadline, if any.
    pub fn next(&self) -> Option<(Instant, DeadlineKind)> {
        let mut next: Option<(Instant, DeadlineKind)> = None;
        let slots = [
            (self.hibernate_warning, DeadlineKind::HibernateWarning),
            (self.hibernate, DeadlineKind::Hibernate),
            (self.health_tick, DeadlineKind::HealthTick),
        ];
        for (slot, kind) in slots {
            if let Some(at) = slot {
                if next.map_or(true, |(earliest, _)| at < earliest) {
                    next = Some((at, kind));
                }
            }
        }
        next
    }

    pub fn clear(&mut self) {
        self.hibernate_warning = None;
        self.hibernate = None;
        self.health_tick = None;
    }
}

/// Fields mirrored out of the daemon for the synchronous accessors
/// (`is_available`, `stats`). Only the daemon writes here.
#[derive(Debug)]
pub(crate) struct Shared {
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub started_at: Option<Instant>,
    pub last_activity: Instant,
    pub hibernate_at: Option<Instant>,
    pub starts: u64,
    pub errors: u64,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            state: ProcessState::Stopped,
            pid: None,
            started_at: None,
            last_activity: Instant::now(),
            hibernate_at: None,
            starts: 0,
            errors: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display_is_lowercase() {
        assert_eq!(ProcessState::Hibernating.to_string(), "hibernating");
        assert_eq!(ProcessState::Error.to_string(), "error");
    }

    #[test]
    fn next_deadline_picks_the_earliest() {
        let now = Instant::now();
        let mut deadlines = Deadlines::default();
        assert!(deadlines.next().is_none());

        deadlines.hibernate = Some(now + Duration::from_secs(900));
        deadlines.hibernate_warning = Some(now + Duration::from_secs(840));
        deadlines.health_tick = Some(now + Duration::from_secs(30));
        let (_, kind) = deadlines.next().unwrap();
        assert_eq!(kind, DeadlineKind::HealthTick);

        deadlines.health_tick = None;
        let (_, kind) = deadlines.next().unwrap();
        assert_eq!(kind, DeadlineKind::HibernateWarning);

        deadlines.clear();
        assert!(deadlines.next().is_none());
    }
}
