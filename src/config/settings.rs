//! Configuration settings for mtcopy
//!
//! Defines the transfer tunables, their defaults, and the CLI arguments
//! of the benchmark binary.

use crate::error::{Result, TransferError};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default upper bound on workers per call
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Hard cap on workers per call, bounding the per-call plan footprint
pub const MAX_COPY_THREADS: usize = 64;

/// mtcopy - NUMA-aware multi-threaded memory transfer
#[derive(Parser, Debug, Clone)]
#[command(name = "mtcopy")]
#[command(author = "mtcopy Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "NUMA-aware multi-threaded bulk memory transfer")]
#[command(long_about = r#"
mtcopy copies lists of memory regions with a bounded pool of CPU-pinned
workers placed on the NUMA node that owns the data.

Examples:
  mtcopy topology                          # Show NUMA topology
  mtcopy bench --size 256M                 # One large region, fine split
  mtcopy bench --size 4K --items 4096      # Many small regions, coarse split
  mtcopy bench --workers 8 --bias src      # Prefer the source node
"#)]
pub struct CliArgs {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a transfer benchmark on freshly allocated buffers
    #[command(name = "bench")]
    Bench(BenchArgs),

    /// Show the detected NUMA topology
    #[command(name = "topology")]
    Topology {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Arguments of the `bench` subcommand
#[derive(Args, Debug, Clone)]
pub struct BenchArgs {
    /// Size of each region (e.g., 4K, 2M, 1G)
    #[arg(short = 's', long, default_value = "48M", value_name = "SIZE")]
    pub size: String,

    /// Number of regions to transfer per call
    #[arg(short = 'i', long, default_value = "1", value_name = "NUM")]
    pub items: usize,

    /// Number of timed transfer calls
    #[arg(short = 'n', long, default_value = "3", value_name = "NUM")]
    pub iterations: usize,

    /// Maximum workers per call
    #[arg(short = 'w', long, env = "MTCOPY_MAX_WORKERS", default_value_t = DEFAULT_MAX_WORKERS, value_name = "NUM")]
    pub workers: usize,

    /// Hard cap applied after all other limits
    #[arg(long, env = "MTCOPY_HARD_CAP", default_value_t = MAX_COPY_THREADS, value_name = "NUM")]
    pub hard_cap: usize,

    /// Node used when neither buffer reports a home node
    #[arg(long, value_name = "NODE")]
    pub node: Option<usize>,

    /// Which buffer's node is tried first
    #[arg(long, value_enum, env = "MTCOPY_BIAS", default_value = "dst")]
    pub bias: DirectionBias,

    /// Copy strategy of the workers
    #[arg(long, value_enum, env = "MTCOPY_STRATEGY", default_value = "best-effort")]
    pub strategy: CopyStrategy,

    /// Do not pin workers to CPUs
    #[arg(long)]
    pub no_pin: bool,

    /// Warn when no worker finishes within this interval (e.g., 2s, 500ms)
    #[arg(long, value_name = "DURATION")]
    pub stall_warning: Option<String>,

    /// Output format for the report
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Which side of the transfer hosts the workers first
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DirectionBias {
    /// Prefer the node owning the destination units
    #[default]
    #[value(name = "dst")]
    #[serde(rename = "dst")]
    Destination,
    /// Prefer the node owning the source units
    #[value(name = "src")]
    #[serde(rename = "src")]
    Source,
}

/// How a worker treats the copy primitive
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CopyStrategy {
    /// Fallible primitive; record failures and finish the plan anyway
    #[default]
    #[value(name = "best-effort")]
    BestEffortRecoverable,
    /// Plain copy that cannot fail
    #[value(name = "reliable")]
    AssumeReliable,
}

impl CopyStrategy {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::BestEffortRecoverable => "best-effort",
            Self::AssumeReliable => "reliable",
        }
    }
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Tunables read by every transfer call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Upper bound on workers per call
    pub max_workers: usize,
    /// Hard cap applied after all other limits (at most `MAX_COPY_THREADS`)
    pub hard_cap: usize,
    /// Node preference order
    pub bias: DirectionBias,
    /// Worker copy strategy
    pub strategy: CopyStrategy,
    /// Pin each worker to its CPU
    pub pin_workers: bool,
    /// Log a warning whenever the join waits this long without progress
    pub stall_warning: Option<Duration>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            hard_cap: MAX_COPY_THREADS,
            bias: DirectionBias::Destination,
            strategy: CopyStrategy::BestEffortRecoverable,
            pin_workers: true,
            stall_warning: None,
        }
    }
}

impl TransferConfig {
    /// Check the tunables are usable
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(TransferError::config("max_workers must be at least 1"));
        }
        if self.hard_cap == 0 || self.hard_cap > MAX_COPY_THREADS {
            return Err(TransferError::config(format!(
                "hard_cap must be between 1 and {}, got {}",
                MAX_COPY_THREADS, self.hard_cap
            )));
        }
        if self.stall_warning == Some(Duration::ZERO) {
            return Err(TransferError::config("stall_warning must be non-zero"));
        }
        Ok(())
    }

    /// Create config from the `bench` arguments
    pub fn from_cli(args: &BenchArgs) -> std::result::Result<Self, String> {
        let stall_warning = args
            .stall_warning
            .as_deref()
            .map(humantime::parse_duration)
            .transpose()
            .map_err(|e| format!("Invalid stall warning: {}", e))?;

        let config = Self {
            max_workers: args.workers,
            hard_cap: args.hard_cap,
            bias: args.bias,
            strategy: args.strategy,
            pin_workers: !args.no_pin,
            stall_warning,
        };

        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(|c| c == 'G' || c == 'B'), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(|c| c == 'M' || c == 'B'), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(|c| c == 'K' || c == 'B'), 1024u64)
    } else {
        (size.trim_end_matches('B'), 1u64)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    num.checked_mul(multiplier)
        .ok_or_else(|| format!("Size too large: {}", size))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench_args(extra: &[&str]) -> BenchArgs {
        let mut argv = vec!["mtcopy", "bench"];
        argv.extend_from_slice(extra);
        match CliArgs::parse_from(argv).command {
            Commands::Bench(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("4K").unwrap(), 4096);
        assert_eq!(parse_size("4kb").unwrap(), 4096);
        assert_eq!(parse_size("2M").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert!(parse_size("").is_err());
        assert!(parse_size("1.5M").is_err());
    }

    #[test]
    fn test_default_config() {
        let config = TransferConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.hard_cap, MAX_COPY_THREADS);
        assert_eq!(config.bias, DirectionBias::Destination);
        assert_eq!(config.strategy, CopyStrategy::BestEffortRecoverable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let zero_workers = TransferConfig { max_workers: 0, ..Default::default() };
        assert!(zero_workers.validate().is_err());

        let huge_cap = TransferConfig { hard_cap: 65, ..Default::default() };
        assert!(huge_cap.validate().is_err());

        let zero_stall = TransferConfig {
            stall_warning: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(zero_stall.validate().is_err());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: TransferConfig =
            serde_json::from_str(r#"{"max_workers": 8, "bias": "src"}"#).unwrap();
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.bias, DirectionBias::Source);
        assert_eq!(config.hard_cap, MAX_COPY_THREADS);
        assert!(config.pin_workers);
    }

    #[test]
    fn test_bias_spelled_like_cli() {
        let json = serde_json::to_string(&DirectionBias::Destination).unwrap();
        assert_eq!(json, r#""dst""#);

        let args = bench_args(&["--bias", "src"]);
        let from_json: DirectionBias = serde_json::from_str(r#""src""#).unwrap();
        assert_eq!(args.bias, from_json);
    }

    #[test]
    fn test_config_from_cli() {
        let args = bench_args(&[
            "--workers", "8", "--bias", "src", "--strategy", "reliable",
            "--no-pin", "--stall-warning", "1500ms",
        ]);
        let config = TransferConfig::from_cli(&args).unwrap();

        assert_eq!(config.max_workers, 8);
        assert_eq!(config.bias, DirectionBias::Source);
        assert_eq!(config.strategy, CopyStrategy::AssumeReliable);
        assert!(!config.pin_workers);
        assert_eq!(config.stall_warning, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_config_from_cli_rejects_garbage() {
        let args = bench_args(&["--stall-warning", "soon"]);
        assert!(TransferConfig::from_cli(&args).is_err());

        let args = bench_args(&["--hard-cap", "0"]);
        assert!(TransferConfig::from_cli(&args).is_err());
    }
}
