use crate::events::{EventBus, LogStream, SupervisorEvent};
use crate::launch::LaunchSpec;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, info_span, instrument, Instrument};

/// Spawns the engine with captured output streams and returns the child.
///
/// The engine inherits our environment plus an unbuffered-output flag and
/// the port its health/control endpoint must bind.
#[instrument(skip(launch, bus), fields(command = %launch.command))]
pub(crate) fn spawn_engine(
    launch: &LaunchSpec,
    port: u16,
    bus: &EventBus,
) -> std::io::Result<Child> {
    let mut child = Command::new(&launch.command)
        .args(&launch.args)
        .current_dir(&launch.working_directory)
        .env("PYTHONUNBUFFERED", "1")
        .env("AUTOMATION_PORT", port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let pid = child.id();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "missing stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "missing stderr"))?;

    tokio::spawn(
        forward_stream(stdout, LogStream::Stdout, bus.clone())
            .instrument(info_span!("read_stdout", pid)),
    );
    tokio::spawn(
        forward_stream(stderr, LogStream::Stderr, bus.clone())
            .instrument(info_span!("read_stderr", pid)),
    );

    info!(pid, "Engine spawned");
    Ok(child)
}

/// Forwards one output stream to the event bus, line by line, until EOF.
async fn forward_stream(
    stream: impl AsyncRead + Unpin + Send + 'static,
    kind: LogStream,
    bus: EventBus,
) {
    let mut reader = BufReader::new(stream);
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(n) if n < 1 => {
                break;
            }
            Err(err) => {
                error!(?err, "Reading engine output failed");
                continue;
            }
            _ => {}
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        debug!(?kind, "{line}");
        bus.publish(SupervisorEvent::Log { stream: kind, line });
    }
    debug!(?kind, "Stream closed");
}
