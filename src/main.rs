use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use std::fs::File;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use warden::{ConfigResolver, Supervisor, WardenConfig};

/// Runs one engine under supervision until ctrl-c. Meant for smoke-testing
/// an engine deployment outside the desktop application.
#[derive(Parser, Debug)]
struct Args {
    /// Configuration file
    #[arg(
        short,
        long,
        env = "WARDEN_CONFIG",
        value_name = "FILE",
        default_value = "/etc/warden/config.yml"
    )]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let config: WardenConfig =
        serde_yaml::from_reader(File::open(&args.config).wrap_err("Failed to open config")?)
            .wrap_err("Failed to read config!")?;

    if std::env::var("WARDEN_LOG").is_err() {
        std::env::set_var("WARDEN_LOG", &config.log_filter);
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("WARDEN_LOG"))
        .init();

    info!("{:#?}", config);
    let resolver = ConfigResolver::new(config.engine.clone());
    let supervisor = Supervisor::new(config, resolver);

    let mut events = supervisor.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(?event, "Event");
        }
    });

    supervisor
        .ensure_running()
        .await
        .wrap_err("Engine failed to come up")?;
    info!("Engine running: {:?}", supervisor.stats());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    supervisor.stop().await;

    Ok(())
}
