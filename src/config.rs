//! Server configuration from command-line arguments.

use crate::commands::Compatibility;
use crate::storage::ExpiryConfig;
use clap::Parser;
use std::time::Duration;

/// EmberKV server
#[derive(Parser, Debug, Clone)]
#[command(name = "emberkv")]
#[command(about = "In-memory key-value cache server")]
#[command(version)]
pub struct Config {
    /// Host to bind to
    #[arg(long, default_value = crate::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// Initial interval of the background expiry sweep, in milliseconds
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval_ms: u64,

    /// Reply to PING with +PONG and return GET values verbatim
    #[arg(long)]
    pub standard_replies: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Returns the bind address as `host:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn compatibility(&self) -> Compatibility {
        if self.standard_replies {
            Compatibility::Standard
        } else {
            Compatibility::Legacy
        }
    }

    pub fn expiry_config(&self) -> ExpiryConfig {
        ExpiryConfig::with_interval(Duration::from_millis(self.sweep_interval_ms))
    }
}
