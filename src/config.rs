//! Command-line configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Per-request resource accounting server.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Config {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Directory served for unmatched paths (dashboard)
    #[arg(long, default_value = "static")]
    pub static_dir: PathBuf,

    /// Internal redirects followed per transaction before giving up
    #[arg(long, default_value_t = 10)]
    pub max_internal_redirects: u32,

    /// Do not expose accounted metrics as response headers
    #[arg(long)]
    pub no_timing_headers: bool,

    /// Log filter, used when RUST_LOG is unset
    #[arg(long, default_value = "rusage_accounting=info,tower_http=info")]
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_from(["rusage-accounting"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.listen.port(), 3000);
        assert_eq!(config.max_internal_redirects, 10);
        assert!(!config.no_timing_headers);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::parse_from([
            "rusage-accounting",
            "--listen",
            "127.0.0.1:8080",
            "--max-internal-redirects",
            "3",
            "--no-timing-headers",
        ]);
        assert_eq!(config.listen, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.max_internal_redirects, 3);
        assert!(config.no_timing_headers);
    }
}
