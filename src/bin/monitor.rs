use clap::Parser;
use host_monitor::{
    config::read_config_file,
    service::MonitorService,
    util::get_config_path,
};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Periodic host health checks with notifications")]
struct Args {
    /// Config file, defaults to $MONITOR_CONFIG or config.json
    #[arg(short, long)]
    config: Option<String>,

    /// Maximum level of emitted log lines
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_target("host_monitor", level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let path = args.config.unwrap_or_else(get_config_path);
    let config = read_config_file(&path)?;

    if args.check {
        for (name, _) in config.enabled_collectors() {
            println!("{name}: every {}s", config.collector_interval_secs(name));
        }
        for (name, _) in config.enabled_notifiers() {
            println!("{name}: enabled");
        }
        return Ok(());
    }

    let service = MonitorService::new(config);
    service.start().await?;
    info!("monitoring {:?}", service.scheduled_collectors());

    if let Err(e) = shutdown_signal().await {
        error!("failed to listen for shutdown signal: {e}");
    }

    service.stop().await;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    info!("received termination request");
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("received termination request");
    Ok(())
}
