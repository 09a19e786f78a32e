//! Lifecycle supervisor for a local automation engine.
//!
//! The engine is a heavyweight external process (large resident footprint,
//! multi-second warm-up) that a desktop application only needs while an
//! agent task is running. The supervisor starts it on demand, gates
//! readiness on its `/health` endpoint, hibernates it after an idle window
//! and escalates shutdown from SIGTERM to SIGKILL when it will not leave.
//!
//! ```no_run
//! use warden::{ConfigResolver, Supervisor, WardenConfig};
//!
//! # async fn demo(config: WardenConfig) {
//! let resolver = ConfigResolver::new(config.engine.clone());
//! let supervisor = Supervisor::new(config, resolver);
//!
//! supervisor.ensure_running().await.unwrap();
//! // ... dispatch work to the engine, recording activity alongside it
//! supervisor.record_activity();
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod launch;
pub mod supervisor;

pub use config::{DeployMode, EngineConfig, WardenConfig};
pub use error::WardenError;
pub use events::{LogStream, SupervisorEvent};
pub use launch::{ConfigResolver, LaunchResolver, LaunchSpec};
pub use supervisor::{ProcessState, StatsSnapshot, Supervisor};
