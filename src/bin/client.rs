use anyhow::{bail, Result};
use clap::Parser;
use colored::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::error;
use udplink::logging::init_logging;
use udplink::{Endpoint, PacketHandler, Port, Server};

#[derive(Parser, Debug, Clone)]
#[command(name = "udplink-client")]
#[command(about = "Send datagrams to a udplink server and print the replies")]
struct Config {
    /// Destination address (host:port)
    #[arg(long)]
    dest: String,

    /// Message to send
    #[arg(long, default_value = "ping")]
    message: String,

    /// Number of copies to send
    #[arg(long, default_value_t = 1)]
    count: usize,

    /// How long to wait for replies after the last send, in milliseconds
    #[arg(long, default_value_t = 500)]
    wait: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (text or json)
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    log_format: String,
}

impl Config {
    fn validate(&self) -> Result<(), String> {
        if self.count == 0 {
            return Err("count must be > 0".into());
        }
        Ok(())
    }
}

/// Prints each reply with the responder's address.
struct PrintReply;

impl PacketHandler for PrintReply {
    fn receive(&self, payload: Vec<u8>, from: Endpoint) {
        println!(
            "{} {}",
            format!("[{from}]").cyan(),
            String::from_utf8_lossy(&payload)
        );
    }
}

fn main() {
    let config = Config::parse();

    init_logging(&config.log_level, config.log_format.to_lowercase() == "json");

    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(config) {
        error!(error = %e, "Client failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<()> {
    let dest = Endpoint::resolve(&config.dest)?;
    let server = Server::start(Port::ANY, Arc::new(PrintReply))?;

    let packets: Vec<Vec<u8>> = (0..config.count)
        .map(|_| config.message.clone().into_bytes())
        .collect();
    let errors = server.send_all(&packets, &dest);
    for (packet, e) in &errors {
        error!(packet = *packet, error = %e, "send failed");
    }

    thread::sleep(Duration::from_millis(config.wait));
    server.close()?;

    if !errors.is_empty() {
        bail!("{} of {} packets failed to send", errors.len(), config.count);
    }
    Ok(())
}
