#[macro_use]
extern crate slog;
extern crate slog_async;
extern crate slog_term;

use clap::Parser;
use lan_dhcpd::config::Config;
use lan_dhcpd::server::Server;
use lan_dhcpd::web;
use slog::Drain;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Parser)]
#[command(name = "lan-dhcpd")]
#[command(author, version, about = "DHCP server for a single LAN segment", long_about = None)]
struct Cli {
    /// JSON configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value = "info", value_parser = parse_level)]
    log_level: slog::Level,
}

fn parse_level(level: &str) -> Result<slog::Level, String> {
    slog::Level::from_str(level).map_err(|()| format!("unknown log level '{}'", level))
}

fn build_logger(level: slog::Level) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog::LevelFilter::new(drain, level).fuse();
    slog::Logger::root(drain, o!())
}

async fn run(cli: Cli, logger: slog::Logger) -> bool {
    let config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(err) => {
                crit!(logger, "{}", err; "path" => %path.display());
                return false;
            }
        },
        None => Config::default(),
    };

    let srv = Server::create(&config, logger.clone());
    let shutdown_notify = Arc::new(Notify::new());
    let web_shutdown = Arc::new(Notify::new());

    let admin = match config.admin_address {
        Some(address) => {
            let signal = web_shutdown.clone();
            let shutdown = async move { signal.notified().await };
            match web::serve(address, srv.engine(), shutdown, &logger) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    error!(logger, "Failed starting admin API: {}", err; "address" => %address);
                    None
                }
            }
        }
        None => None,
    };

    let signal_logger = logger.clone();
    let signal_notify = shutdown_notify.clone();
    let signals = tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(signal_logger, "Failed listening for shutdown signal: {}", err);
            return;
        }
        info!(signal_logger, "Received shutdown signal");
        signal_notify.notify_one();
    });

    let result = srv.serve(shutdown_notify).await;
    signals.abort();

    web_shutdown.notify_one();
    if let Some(handle) = admin {
        if let Err(err) = handle.await {
            warn!(logger, "Admin API task failed: {}", err);
        }
    }

    match result {
        Ok(()) => true,
        Err(err) => {
            crit!(logger, "{}", err);
            false
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let logger = build_logger(cli.log_level);

    // The async drain flushes once every logger handle is gone.
    let ok = run(cli, logger).await;
    if !ok {
        std::process::exit(1);
    }
}
