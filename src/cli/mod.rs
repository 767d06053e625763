// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod inspect_cmd;

pub use inspect_cmd::InspectCommand;

use std::path::PathBuf;

use anyhow::ensure;
use clap::{Args, Parser};
use serde::{Deserialize, Serialize};

/// CLI structure generated when interacting with the simulator binary.
#[derive(Parser)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = env!("CARGO_PKG_DESCRIPTION"),
    author
)]
pub struct Cli {
    #[command(flatten)]
    pub opts: CliOpts,
    #[command(subcommand)]
    pub cmd: Option<Subcommand>,
}

/// Simulator subcommands. Without one, a full simulation is run.
#[derive(clap::Subcommand)]
pub enum Subcommand {
    /// Summarize the data requests per block of a captured stream
    Inspect(InspectCommand),
}

/// CLI options. Every flag overrides the corresponding configuration-file
/// value.
#[derive(Args, Debug)]
pub struct CliOpts {
    /// A TOML file containing relevant configurations
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Time in epochs collateral stays locked after being used
    #[arg(long)]
    pub collateral_locked: Option<u64>,
    /// Number of identities to create
    #[arg(long)]
    pub identities: Option<usize>,
    /// Balance of each identity in whole wits
    #[arg(long)]
    pub balance: Option<u64>,
    /// Create a randomized population instead of a zero-reputation one
    #[arg(long)]
    pub create_random_ars: bool,
    /// Maximum reputation the top identity of a randomized population can hold
    #[arg(long)]
    pub max_reputation: Option<u64>,
    /// Percentage of a randomized population holding zero reputation
    #[arg(long)]
    pub zero_reputation_ratio: Option<u64>,
    /// Average number of data requests in a synthetic block
    #[arg(long)]
    pub avg_data_requests: Option<f64>,
    /// Standard deviation of the synthetic data-request count
    #[arg(long)]
    pub std_data_requests: Option<f64>,
    /// Number of witnesses per synthetic data request
    #[arg(long)]
    pub witnesses: Option<usize>,
    /// Collateral per synthetic data request in whole wits
    #[arg(long)]
    pub collateral: Option<u64>,
    /// Epoch at which the simulation starts
    #[arg(long)]
    pub offset_epochs: Option<u64>,
    /// Number of warmup epochs before statistics are collected
    #[arg(long)]
    pub warmup_epochs: Option<u64>,
    /// Number of epochs the detailed simulation runs
    #[arg(long)]
    pub simulation_epochs: Option<u64>,
    /// Build the population from a roster file of `name,reputation` lines
    #[arg(long)]
    pub ars_file: Option<PathBuf>,
    /// Replay data requests from a captured CSV stream
    #[arg(long)]
    pub data_requests_file: Option<PathBuf>,
    /// RNG seed; a random one is drawn and logged when absent
    #[arg(long)]
    pub seed: Option<u64>,
    /// Use the one-draw approximation of per-round eligibility
    #[arg(long)]
    pub approximate_eligibility: bool,
    /// Directory the statistics reports are written to
    #[arg(long)]
    pub results_dir: Option<PathBuf>,
    /// Mirror logs into this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Resolved simulation configuration: the defaults, overlaid by an optional
/// TOML file, overlaid by CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub collateral_locked: u64,
    pub identities: usize,
    pub balance: u64,
    pub create_random_ars: bool,
    pub max_reputation: u64,
    pub zero_reputation_ratio: u64,
    pub avg_data_requests: f64,
    pub std_data_requests: f64,
    pub witnesses: usize,
    pub collateral: u64,
    pub offset_epochs: u64,
    pub warmup_epochs: u64,
    pub simulation_epochs: u64,
    pub ars_file: Option<PathBuf>,
    pub data_requests_file: Option<PathBuf>,
    pub seed: Option<u64>,
    pub approximate_eligibility: bool,
    pub results_dir: PathBuf,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collateral_locked: 1000,
            identities: 1000,
            balance: 100,
            create_random_ars: false,
            max_reputation: 10_000,
            zero_reputation_ratio: 50,
            avg_data_requests: 4.0,
            std_data_requests: 2.0,
            witnesses: 10,
            collateral: 5,
            offset_epochs: 0,
            warmup_epochs: 0,
            simulation_epochs: 1000,
            ars_file: None,
            data_requests_file: None,
            seed: None,
            approximate_eligibility: false,
            results_dir: PathBuf::from("results"),
            log_file: None,
        }
    }
}

impl CliOpts {
    pub fn to_config(&self) -> anyhow::Result<Config> {
        let mut cfg: Config = match &self.config {
            Some(config_file) => {
                // Read from config file
                let toml = std::fs::read_to_string(config_file)?;
                // Parse and return the configuration file
                toml::from_str(&toml)?
            }
            None => {
                // Check ENV VAR for config file
                if let Some(config_file) = std::env::var_os("ARS_SIM_CONFIG") {
                    let toml = std::fs::read_to_string(&config_file)?;
                    toml::from_str(&toml)?
                } else {
                    Config::default()
                }
            }
        };

        if let Some(collateral_locked) = self.collateral_locked {
            cfg.collateral_locked = collateral_locked;
        }
        if let Some(identities) = self.identities {
            cfg.identities = identities;
        }
        if let Some(balance) = self.balance {
            cfg.balance = balance;
        }
        if self.create_random_ars {
            cfg.create_random_ars = true;
        }
        if let Some(max_reputation) = self.max_reputation {
            cfg.max_reputation = max_reputation;
        }
        if let Some(zero_reputation_ratio) = self.zero_reputation_ratio {
            cfg.zero_reputation_ratio = zero_reputation_ratio;
        }
        if let Some(avg_data_requests) = self.avg_data_requests {
            cfg.avg_data_requests = avg_data_requests;
        }
        if let Some(std_data_requests) = self.std_data_requests {
            cfg.std_data_requests = std_data_requests;
        }
        if let Some(witnesses) = self.witnesses {
            cfg.witnesses = witnesses;
        }
        if let Some(collateral) = self.collateral {
            cfg.collateral = collateral;
        }
        if let Some(offset_epochs) = self.offset_epochs {
            cfg.offset_epochs = offset_epochs;
        }
        if let Some(warmup_epochs) = self.warmup_epochs {
            cfg.warmup_epochs = warmup_epochs;
        }
        if let Some(simulation_epochs) = self.simulation_epochs {
            cfg.simulation_epochs = simulation_epochs;
        }
        if let Some(ars_file) = &self.ars_file {
            cfg.ars_file = Some(ars_file.clone());
        }
        if let Some(data_requests_file) = &self.data_requests_file {
            cfg.data_requests_file = Some(data_requests_file.clone());
        }
        if let Some(seed) = self.seed {
            cfg.seed = Some(seed);
        }
        if self.approximate_eligibility {
            cfg.approximate_eligibility = true;
        }
        if let Some(results_dir) = &self.results_dir {
            cfg.results_dir = results_dir.clone();
        }
        if let Some(log_file) = &self.log_file {
            cfg.log_file = Some(log_file.clone());
        }

        ensure!(
            !(cfg.create_random_ars && cfg.ars_file.is_some()),
            "--create-random-ars and --ars-file are mutually exclusive"
        );
        ensure!(
            cfg.zero_reputation_ratio <= 100,
            "--zero-reputation-ratio is a percentage"
        );
        ensure!(
            cfg.std_data_requests >= 0.0 && cfg.std_data_requests.is_finite(),
            "--std-data-requests must be a non-negative number"
        );
        ensure!(
            cfg.avg_data_requests.is_finite(),
            "--avg-data-requests must be a finite number"
        );

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_defaults() {
        let cli = Cli::parse_from([
            "ars-sim",
            "--identities",
            "25",
            "--create-random-ars",
            "--seed",
            "7",
        ]);
        let cfg = cli.opts.to_config().unwrap();
        assert_eq!(cfg.identities, 25);
        assert!(cfg.create_random_ars);
        assert_eq!(cfg.seed, Some(7));
        // Untouched values keep their defaults.
        assert_eq!(cfg.collateral_locked, 1000);
        assert_eq!(cfg.balance, 100);
    }

    #[test]
    fn conflicting_population_sources_are_rejected() {
        let cli = Cli::parse_from([
            "ars-sim",
            "--create-random-ars",
            "--ars-file",
            "roster.csv",
        ]);
        assert!(cli.opts.to_config().is_err());
    }

    #[test]
    fn ratio_above_one_hundred_is_rejected() {
        let cli = Cli::parse_from(["ars-sim", "--zero-reputation-ratio", "101"]);
        assert!(cli.opts.to_config().is_err());
    }

    #[test]
    fn config_file_values_sit_under_cli_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.toml");
        std::fs::write(&path, "identities = 10\nbalance = 7\n").unwrap();

        let cli = Cli::parse_from([
            "ars-sim",
            "--config",
            path.to_str().unwrap(),
            "--identities",
            "42",
        ]);
        let cfg = cli.opts.to_config().unwrap();
        assert_eq!(cfg.identities, 42);
        assert_eq!(cfg.balance, 7);
    }
}
