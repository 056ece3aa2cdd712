//! Command-line and environment configuration.

use bigdecimal::BigDecimal;
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::auth::DEFAULT_LINK_TTL_SECS;
use crate::money::parse_amount;
use crate::services::TopUpPolicy;

/// Which persistence backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// PostgreSQL through `DATABASE_URL`.
    Postgres,
    /// Process-local tables; state is lost on exit.
    Memory,
}

/// Scan-to-pay API server
#[derive(Debug, Parser)]
#[command(name = "scanpay-server")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "SCANPAY_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// PostgreSQL connection string (required for the postgres store)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Persistence backend
    #[arg(long, env = "SCANPAY_STORE", value_enum, default_value = "postgres")]
    pub store: StoreKind,

    /// Ed25519 seed as 64 hex characters; a random key is used when absent
    #[arg(long, env = "SCANPAY_SIGNING_SEED", hide_env_values = true)]
    pub signing_seed: Option<String>,

    /// Lifetime of pay-link tokens in seconds
    #[arg(long, env = "SCANPAY_LINK_TOKEN_TTL_SECS", default_value_t = DEFAULT_LINK_TTL_SECS)]
    pub link_token_ttl_secs: i64,

    /// Smallest accepted wallet reload
    #[arg(long, env = "SCANPAY_MIN_TOPUP", default_value = "1.00", value_parser = parse_decimal)]
    pub min_topup: BigDecimal,

    /// Largest accepted wallet reload
    #[arg(long, env = "SCANPAY_MAX_TOPUP", default_value = "500.00", value_parser = parse_decimal)]
    pub max_topup: BigDecimal,

    /// Interval of the background expiry sweep in seconds (0 disables it)
    #[arg(long, env = "SCANPAY_EXPIRY_SWEEP_SECS", default_value_t = 0)]
    pub expiry_sweep_secs: u64,

    /// Maximum pooled database connections
    #[arg(long, env = "SCANPAY_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a bearer token for an account and exit
    IssueToken {
        /// Account the token identifies
        #[arg(long)]
        account: Uuid,

        /// Token lifetime in seconds
        #[arg(long, default_value_t = 86_400)]
        ttl_secs: i64,
    },
}

fn parse_decimal(value: &str) -> Result<BigDecimal, String> {
    parse_amount(value).map_err(|e| e.to_string())
}

impl Config {
    /// Reload bounds as a policy.
    pub fn topup_policy(&self) -> anyhow::Result<TopUpPolicy> {
        if self.min_topup > self.max_topup {
            anyhow::bail!(
                "--min-topup ({}) exceeds --max-topup ({})",
                self.min_topup,
                self.max_topup
            );
        }
        Ok(TopUpPolicy {
            min: self.min_topup.clone(),
            max: self.max_topup.clone(),
        })
    }

    /// The sweep period, or `None` when the sweep is disabled.
    pub fn expiry_sweep_period(&self) -> Option<std::time::Duration> {
        (self.expiry_sweep_secs > 0).then(|| std::time::Duration::from_secs(self.expiry_sweep_secs))
    }
}
