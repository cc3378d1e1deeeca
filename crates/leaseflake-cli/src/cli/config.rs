use core::time::Duration;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use leaseflake::LeaseflakeId;
use leaseflake_lease::{DEFAULT_TABLE_NAME, LeaseConfig};

/// Command-line arguments for the `leaseflake` binary.
///
/// Every global option can also come from the environment (or a `.env`
/// file), so the same settings can be shared by several processes leasing
/// from one database.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "leaseflake",
    version,
    about = "Generate 63-bit IDs with slots leased from a shared SQLite table"
)]
pub struct CliArgs {
    /// SQLite database file holding the lease table.
    ///
    /// Environment variable: `LEASEFLAKE_DATABASE`
    #[arg(long, global = true, env = "LEASEFLAKE_DATABASE", default_value = "leaseflake.db")]
    pub database: PathBuf,

    /// Name of the lease table. Must be a plain SQL identifier.
    ///
    /// Environment variable: `LEASEFLAKE_TABLE`
    #[arg(long, global = true, env = "LEASEFLAKE_TABLE", default_value_t = String::from(DEFAULT_TABLE_NAME))]
    pub table: String,

    /// How long a claim keeps a slot, in seconds of database time.
    ///
    /// Environment variable: `LEASEFLAKE_LEASE_SECS`
    #[arg(long, global = true, env = "LEASEFLAKE_LEASE_SECS", default_value_t = 300)]
    pub lease_secs: u64,

    /// Seconds between refresh cycles.
    ///
    /// Environment variable: `LEASEFLAKE_REFRESH_SECS`
    #[arg(long, global = true, env = "LEASEFLAKE_REFRESH_SECS", default_value_t = 60)]
    pub refresh_secs: u64,

    /// Largest tolerated gap between the database clock and ours, in
    /// seconds. The local lease ends this much earlier than the database
    /// lease.
    ///
    /// Environment variable: `LEASEFLAKE_MAX_SKEW_SECS`
    #[arg(long, global = true, env = "LEASEFLAKE_MAX_SKEW_SECS", default_value_t = 100)]
    pub max_skew_secs: u64,

    /// Claim attempts per refresh cycle.
    ///
    /// Environment variable: `LEASEFLAKE_ATTEMPTS`
    #[arg(long, global = true, env = "LEASEFLAKE_ATTEMPTS", default_value_t = 3)]
    pub attempts: usize,

    /// Pause between attempts of one cycle, in milliseconds.
    ///
    /// Environment variable: `LEASEFLAKE_RETRY_BACKOFF_MS`
    #[arg(long, global = true, env = "LEASEFLAKE_RETRY_BACKOFF_MS", default_value_t = 1_000)]
    pub retry_backoff_ms: u64,

    /// How long to wait for the first lease before giving up, in seconds.
    ///
    /// Environment variable: `LEASEFLAKE_ACQUIRE_TIMEOUT_SECS`
    #[arg(long, global = true, env = "LEASEFLAKE_ACQUIRE_TIMEOUT_SECS", default_value_t = 30)]
    pub acquire_timeout_secs: u64,

    /// Log line format. Logs go to stderr; stdout carries only results.
    ///
    /// Environment variable: `LEASEFLAKE_LOG_FORMAT`
    #[arg(long, global = true, env = "LEASEFLAKE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the lease table and unleased rows for slots `0..SLOTS`.
    Provision {
        #[arg(long, default_value_t = 128)]
        slots: usize,
    },
    /// Show every lease row.
    Status {
        /// One JSON object per row.
        #[arg(long)]
        json: bool,
    },
    /// Generate IDs, leasing a slot unless one is given.
    Generate {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        /// Use this slot without touching the database.
        #[arg(long)]
        slot: Option<u8>,
        /// One JSON object per ID, with its decoded fields.
        #[arg(long)]
        json: bool,
    },
    /// Split IDs into timestamp, slot and sequence.
    Decode {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Lease a slot and keep renewing it until Ctrl+C or SIGTERM.
    Hold,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

/// Validated settings the commands run with.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: PathBuf,
    pub table: String,
    pub lease: LeaseConfig,
    pub acquire_timeout: Duration,
    pub log_format: LogFormat,
    pub command: Command,
}

impl TryFrom<CliArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let lease = LeaseConfig {
            lease_duration: Duration::from_secs(args.lease_secs),
            refresh_interval: Duration::from_secs(args.refresh_secs),
            max_clock_skew: Duration::from_secs(args.max_skew_secs),
            attempts: args.attempts,
            retry_backoff: Duration::from_millis(args.retry_backoff_ms),
            ..LeaseConfig::default()
        };
        lease.validate().context("invalid lease timings")?;

        if args.acquire_timeout_secs == 0 {
            bail!("LEASEFLAKE_ACQUIRE_TIMEOUT_SECS must be greater than 0");
        }

        match &args.command {
            Command::Provision { slots } => {
                let capacity = usize::from(LeaseflakeId::MAX_SLOT) + 1;
                if *slots == 0 || *slots > capacity {
                    bail!("--slots must be between 1 and {capacity}, got {slots}");
                }
            }
            Command::Generate { count, slot, .. } => {
                if *count == 0 {
                    bail!("--count must be greater than 0");
                }
                if let Some(slot) = slot.filter(|s| *s > LeaseflakeId::MAX_SLOT) {
                    bail!("--slot must be at most {}, got {slot}", LeaseflakeId::MAX_SLOT);
                }
            }
            Command::Status { .. } | Command::Decode { .. } | Command::Hold => {}
        }

        Ok(Self {
            database: args.database,
            table: args.table,
            lease,
            acquire_timeout: Duration::from_secs(args.acquire_timeout_secs),
            log_format: args.log_format,
            command: args.command,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<AppConfig> {
        let args = CliArgs::try_parse_from(std::iter::once("leaseflake").chain(args.iter().copied()))?;
        AppConfig::try_from(args)
    }

    #[test]
    fn defaults_match_the_lease_protocol() {
        let config = parse(&["hold"]).unwrap();
        assert_eq!(config.lease, LeaseConfig::default());
        assert_eq!(config.table, DEFAULT_TABLE_NAME);
        assert_eq!(config.command, Command::Hold);
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let config = parse(&["generate", "-n", "5", "--table", "ids", "--lease-secs", "600"]).unwrap();
        assert_eq!(config.table, "ids");
        assert_eq!(config.lease.lease_duration, Duration::from_secs(600));
        assert_eq!(
            config.command,
            Command::Generate {
                count: 5,
                slot: None,
                json: false,
            }
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse(&["generate", "--slot", "128"]).is_err());
        assert!(parse(&["generate", "--count", "0"]).is_err());
        assert!(parse(&["provision", "--slots", "129"]).is_err());
        assert!(parse(&["provision", "--slots", "0"]).is_err());
        assert!(parse(&["hold", "--max-skew-secs", "300"]).is_err());
        assert!(parse(&["hold", "--acquire-timeout-secs", "0"]).is_err());
    }

    #[test]
    fn decode_requires_ids() {
        assert!(parse(&["decode"]).is_err());
        assert!(parse(&["decode", "123", "--json"]).is_ok());
    }
}
