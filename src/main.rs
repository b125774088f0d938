use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use peer_exchange::config::Config;
use peer_exchange::exchange::{self, ExchangeReport, PeerStats};

#[derive(Parser)]
#[command(
    name = "peer-exchange",
    version,
    about = "Turn-taking message exchange between two peers"
)]
struct Cli {
    /// Number of messages each peer sends and receives
    #[arg(short, long, global = true)]
    stop_condition: Option<u32>,

    /// Log every message sent and received
    #[arg(short, long, global = true)]
    verbose: Option<bool>,

    /// TCP port for the socket transport
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Host the initiator connects to
    #[arg(long, global = true)]
    host: Option<String>,

    /// First message sent by the initiator
    #[arg(short, long, global = true)]
    initial_message: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run both peers as threads in this process
    Threads,
    /// Host the responder: listen on the port and reply to one initiator
    Responder,
    /// Host the initiator: connect to a listening responder and start the exchange
    Initiator,
    /// Run both socket peers in this process over loopback
    SocketPair,
}

impl Commands {
    fn run_name(&self) -> &'static str {
        match self {
            Commands::Threads => "threads",
            Commands::Responder => "responder",
            Commands::Initiator => "initiator",
            Commands::SocketPair => "socket-pair",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;

    if let Some(n) = cli.stop_condition {
        config.stop_condition = n;
    }
    if let Some(v) = cli.verbose {
        config.verbose = v;
    }
    if let Some(p) = cli.port {
        config.port = p;
    }
    if let Some(h) = cli.host {
        config.host = h;
    }
    if let Some(m) = cli.initial_message {
        config.initial_message = m;
    }

    // Set up logging: stderr + log file in log_dir, named after the run
    // mode so two processes on one machine keep separate files.
    let log_dir = &config.log_dir;
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir))?;

    let log_name = format!("{}.log", cli.command.run_name());
    let _ = std::fs::write(format!("{}/{}", log_dir, log_name), b"");

    let file_appender = tracing_appender::rolling::never(log_dir, &log_name);
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("peer_exchange=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    let exchange_config = config.exchange_config().context("Invalid configuration")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = cli.command.run_name(),
        stop_condition = exchange_config.stop_condition,
        verbose = exchange_config.verbose,
        "Starting peer-exchange"
    );

    match cli.command {
        Commands::Threads => {
            let report = exchange::run_threaded(&exchange_config)
                .context("Threaded exchange failed")?;
            print_report(&report);
        }
        Commands::Responder => {
            config.validate_socket_port().context("Invalid configuration")?;
            tracing::info!(
                port = exchange_config.port,
                "Both processes must use the same port and stop condition"
            );
            let stats = exchange::run_socket_responder(&exchange_config)
                .context("Responder failed")?;
            print_stats(&stats);
        }
        Commands::Initiator => {
            config.validate_socket_port().context("Invalid configuration")?;
            let stats = exchange::run_socket_initiator(&exchange_config)
                .context("Initiator failed")?;
            print_stats(&stats);
        }
        Commands::SocketPair => {
            let report = exchange::run_socket_pair(&exchange_config)
                .context("Socket pair exchange failed")?;
            print_report(&report);
        }
    }

    Ok(())
}

fn print_stats(stats: &PeerStats) {
    println!("{}", stats);
}

fn print_report(report: &ExchangeReport) {
    println!("{}", report);
}
