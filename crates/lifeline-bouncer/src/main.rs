mod logging;

use std::time::Duration;

use clap::Parser;

use lifeline_bouncer::{Bouncer, BouncerConfig};

use crate::logging::{init_logging, LogFormat, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "lifeline-bouncer", version, about = "Session-resuming bouncer for lifeline clients")]
struct Cli {
    /// Address to accept lifeline clients on.
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:12345")]
    listen: String,

    /// Upstream host:port each session relays to.
    #[arg(long, value_name = "ADDR", env = "LIFELINE_UPSTREAM")]
    upstream: String,

    /// Replay buffer limit per session, in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = 64 * 1024)]
    buffer_limit: usize,

    /// Seconds of inactivity before a session is discarded.
    #[arg(long, value_name = "SECS", default_value_t = 600)]
    session_timeout: u64,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let config = BouncerConfig {
        listen: cli.listen,
        upstream: cli.upstream,
        buffer_limit: cli.buffer_limit,
        session_timeout: Duration::from_secs(cli.session_timeout),
        ..BouncerConfig::default()
    };

    let bouncer = Bouncer::new(config);
    tokio::select! {
        result = bouncer.run() => {
            if let Err(err) = result {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }
}
