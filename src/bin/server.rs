use anyhow::Result;
use clap::Parser;
use colored::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use udplink::logging::init_logging;
use udplink::{Endpoint, PacketHandler, Port, Server};

#[derive(Parser, Debug, Clone)]
#[command(name = "udplink-server")]
#[command(about = "UDP echo server built on the udplink transport")]
struct Config {
    /// Bind port (0 picks any free port)
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Status line update interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    update_interval: u64,

    /// Disable the status line (useful for Docker/systemd/non-interactive environments)
    #[arg(long)]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (text or json)
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    log_format: String,
}

impl Config {
    fn validate(&self) -> Result<(), String> {
        if self.update_interval == 0 {
            return Err("update_interval must be > 0".into());
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }

    fn is_json_format(&self) -> bool {
        self.log_format.to_lowercase() == "json"
    }
}

/// Echoes every payload back to its sender. The server handle is wired in
/// after startup; anything arriving before that is counted as dropped.
#[derive(Default)]
struct Echo {
    server: OnceLock<Arc<Server>>,
    echoed: AtomicU64,
    errors: AtomicU64,
    dropped: AtomicU64,
}

impl PacketHandler for Echo {
    fn receive(&self, payload: Vec<u8>, from: Endpoint) {
        let Some(server) = self.server.get() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(peer = %from, "packet arrived before the server handle was wired");
            return;
        };
        match server.send(&payload, &from) {
            Ok(_) => {
                self.echoed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, peer = %from, "failed to echo packet");
            }
        }
    }
}

fn main() {
    let config = Config::parse();

    init_logging(&config.log_level, config.is_json_format());

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(config) {
        error!(error = %e, "Server failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<()> {
    let echo = Arc::new(Echo::default());
    let server = Server::start(Port(config.port), Arc::clone(&echo) as Arc<dyn PacketHandler>)?;
    let _ = echo.server.set(Arc::clone(&server));

    info!(port = %server.port(), "udplink echo server listening");

    loop {
        thread::sleep(Duration::from_millis(config.update_interval));
        if !config.quiet {
            let echoed = echo.echoed.load(Ordering::Relaxed);
            let errors = echo.errors.load(Ordering::Relaxed);
            let status = if server.is_running() {
                "RUNNING".green().bold()
            } else {
                "STOPPED".red().bold()
            };
            print!("\r[{}] Echoed: {} | Errors: {}", status, echoed, errors);
            std::io::Write::flush(&mut std::io::stdout()).ok();
        }
    }
}
