//! Configuration for Lapidary
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

/// Lapidary - slot-staking and timed-production backend
#[derive(Parser, Debug, Clone)]
#[command(name = "lapidary")]
#[command(about = "Staking, production, and live-view backend for mining/polishing gameplay")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (Mongo/NATS optional, verbose errors)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "lapidary")]
    pub mongodb_db: String,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// Comma-separated redundant ownership-oracle endpoints
    /// e.g. "https://idx-a.example.com,https://idx-b.example.com"
    #[arg(long, env = "ORACLE_ENDPOINTS", default_value = "")]
    pub oracle_endpoints: String,

    /// Per-request timeout for each oracle endpoint, in milliseconds
    #[arg(long, env = "ORACLE_TIMEOUT_MS", default_value = "2500")]
    pub oracle_timeout_ms: u64,

    /// Asset collection name the oracle is filtered to
    #[arg(long, env = "ASSET_COLLECTION", default_value = "lapidary.works")]
    pub asset_collection: String,

    /// Fixed mining job duration in seconds
    #[arg(long, env = "MINING_DURATION_SECS", default_value = "3600")]
    pub mining_duration_secs: u64,

    /// Fixed polishing job duration in seconds
    #[arg(long, env = "POLISHING_DURATION_SECS", default_value = "1800")]
    pub polishing_duration_secs: u64,

    /// Debounce window for live-view rebuilds, in milliseconds
    #[arg(long, env = "REBUILD_DEBOUNCE_MS", default_value = "2000")]
    pub rebuild_debounce_ms: u64,

    /// Lookback window for global-document fanout, in seconds
    #[arg(long, env = "FANOUT_LOOKBACK_SECS", default_value = "900")]
    pub fanout_lookback_secs: u64,

    /// Maximum accounts rebuilt per global-document write
    #[arg(long, env = "FANOUT_MAX_ACCOUNTS", default_value = "200")]
    pub fanout_max_accounts: i64,

    /// Destination account for slot-unlock payment intents
    #[arg(long, env = "PAYMENT_DESTINATION", default_value = "lapidary.bank")]
    pub payment_destination: String,

    /// NATS subject payment intents are published on
    #[arg(long, env = "PAYMENT_SUBJECT", default_value = "lapidary.payments.intent")]
    pub payment_subject: String,

    /// Path for the JSONL audit log (degraded validations, displacements)
    #[arg(long, env = "AUDIT_LOG_PATH")]
    pub audit_log_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,
}

impl Args {
    /// Parsed oracle endpoint list
    pub fn oracle_endpoint_list(&self) -> Vec<String> {
        self.oracle_endpoints
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Per-endpoint oracle request timeout
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    /// Debounce window for rebuilds
    pub fn rebuild_debounce(&self) -> Duration {
        Duration::from_millis(self.rebuild_debounce_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.oracle_endpoint_list().is_empty() {
            return Err("ORACLE_ENDPOINTS is required in production mode".to_string());
        }

        if self.rebuild_debounce_ms == 0 {
            return Err("REBUILD_DEBOUNCE_MS must be greater than zero".to_string());
        }

        if self.fanout_max_accounts <= 0 {
            return Err("FANOUT_MAX_ACCOUNTS must be greater than zero".to_string());
        }

        if self.mining_duration_secs == 0 || self.polishing_duration_secs == 0 {
            return Err("job durations must be greater than zero".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        let mut args = Args::parse_from(["lapidary"]);
        args.dev_mode = true;
        args
    }

    #[test]
    fn oracle_endpoint_list_splits_and_trims() {
        let mut args = base_args();
        args.oracle_endpoints = " https://a.example.com/ , https://b.example.com ,".to_string();
        assert_eq!(
            args.oracle_endpoint_list(),
            vec![
                "https://a.example.com".to_string(),
                "https://b.example.com".to_string()
            ]
        );
    }

    #[test]
    fn production_requires_oracle_endpoints() {
        let mut args = base_args();
        args.dev_mode = false;
        args.oracle_endpoints = String::new();
        assert!(args.validate().is_err());

        args.oracle_endpoints = "https://a.example.com".to_string();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn zero_debounce_rejected() {
        let mut args = base_args();
        args.rebuild_debounce_ms = 0;
        assert!(args.validate().is_err());
    }
}
