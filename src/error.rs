use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by supervisor operations.
///
/// Steady-state health-probe misses and unexpected exits are reported
/// through events and counters instead; they never show up as a return
/// value of a public operation.
#[derive(Debug, Error)]
pub enum WardenError {
    /// No launch command could be resolved. Fatal until the deployment
    /// configuration changes; never retried automatically.
    #[error("engine launch command could not be resolved")]
    LaunchNotFound,

    /// The OS refused to create the process.
    #[error("failed to spawn engine: {0}")]
    Spawn(#[source] std::io::Error),

    /// The process came up but never answered the health endpoint in time.
    #[error("engine failed to become healthy within {0:?}")]
    StartupTimeout(Duration),

    /// The process died while the startup probe was still waiting on it.
    #[error("engine exited during startup")]
    EarlyExit,

    /// The start attempt this caller was queued behind failed; the
    /// concrete reason was already surfaced to its initiator and as an
    /// error event.
    #[error("engine failed to start")]
    StartFailed,

    /// `ensure_running` gave up waiting for an in-flight activation.
    #[error("engine did not become available within {0:?}")]
    ActivationTimeout(Duration),

    /// The supervisor daemon is gone (every handle was dropped or the
    /// daemon task aborted).
    #[error("supervisor is no longer running")]
    SupervisorGone,
}
