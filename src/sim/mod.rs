// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Block-by-block simulation driver.
//!
//! Each block runs zero or more data requests against a single eligibility
//! snapshot, then settles the reputation accounting in mint → expire →
//! distribute order so reputation minted for the block's acts is immediately
//! distributable while grants that aged out during the block are gone before
//! new ones are appended.

pub mod input;
pub mod stats;

use std::collections::BTreeMap;
use std::ops::Range;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;
use tracing::{debug, info, warn};

use crate::ars::{ActiveReputationSet, NANOWITS_PER_WIT, SelectionResult};
use crate::cli::Config;

/// A single data request: committee size and per-witness collateral in
/// nanowits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRequest {
    pub witnesses: usize,
    pub collateral: u64,
}

/// Where a phase takes its per-block data requests from.
pub enum RequestSchedule {
    /// Draw the block's request count from a normal distribution, with a
    /// fixed committee size and collateral per request.
    Synthetic {
        avg: f64,
        std: f64,
        witnesses: usize,
        collateral: u64,
    },
    /// Replay a captured stream; blocks absent from the map are empty.
    Recorded(BTreeMap<u64, Vec<DataRequest>>),
}

/// The simulation state: the identity population plus the single RNG that
/// every random draw flows through.
pub struct Simulation {
    ars: ActiveReputationSet,
    rng: ChaCha8Rng,
    approximate_eligibility: bool,
}

impl Simulation {
    pub fn new(ars: ActiveReputationSet, rng: ChaCha8Rng, approximate_eligibility: bool) -> Self {
        Self {
            ars,
            rng,
            approximate_eligibility,
        }
    }

    pub fn ars(&self) -> &ActiveReputationSet {
        &self.ars
    }

    pub fn rng(&self) -> &ChaCha8Rng {
        &self.rng
    }

    pub fn clear_stats(&mut self) {
        self.ars.clear_stats();
    }

    /// Runs one block and returns the reputation remainder to carry into the
    /// next one.
    ///
    /// The eligibility snapshot is computed once, before the first request;
    /// committees within the block deliberately share that view. Requests the
    /// selector cannot fill are logged and skipped without minting anything.
    pub fn simulate_block(
        &mut self,
        epoch: u64,
        data_requests: &[DataRequest],
        leftover_reputation: u64,
    ) -> u64 {
        let mut all_witnesses = Vec::new();
        let mut witnessing_acts = 0;

        let eligibilities = self.ars.eligibilities();
        for (index, request) in data_requests.iter().enumerate() {
            debug!(epoch, request = index + 1, "processing data request");
            match self.ars.select_witnesses(
                &mut self.rng,
                &eligibilities,
                self.approximate_eligibility,
                request.witnesses,
                epoch,
                request.collateral,
            ) {
                SelectionResult::Committee { witnesses, .. } => {
                    witnessing_acts += witnesses.len() as u64;
                    all_witnesses.extend(witnesses);
                }
                SelectionResult::Failed {
                    eligible,
                    insufficient_collateral,
                } => {
                    warn!(
                        epoch,
                        found = eligible.len(),
                        no_collateral = insufficient_collateral.len(),
                        "could not solve data request"
                    );
                }
            }
        }

        if witnessing_acts == 0 {
            return leftover_reputation;
        }
        let created = self.ars.created_reputation(witnessing_acts);
        let expired = self.ars.expired_reputation(witnessing_acts, epoch);
        self.ars.update_reputation(
            &all_witnesses,
            created + leftover_reputation + expired,
            epoch,
        )
    }

    /// Runs a contiguous range of blocks against a schedule. The reputation
    /// remainder carries across blocks but not across phases. Returns the
    /// number of data requests presented.
    pub fn run_phase(&mut self, phase: &str, epochs: Range<u64>, schedule: &RequestSchedule) -> u64 {
        let mut leftover_reputation = 0;
        let mut total_requests = 0;

        for epoch in epochs {
            let data_requests = match schedule {
                RequestSchedule::Synthetic {
                    avg,
                    std,
                    witnesses,
                    collateral,
                } => {
                    let count = self.synthesize_block_size(*avg, *std);
                    vec![
                        DataRequest {
                            witnesses: *witnesses,
                            collateral: *collateral,
                        };
                        count
                    ]
                }
                RequestSchedule::Recorded(per_epoch) => match per_epoch.get(&epoch) {
                    Some(requests) => requests.clone(),
                    None => {
                        debug!(phase, epoch, "no data requests in block");
                        continue;
                    }
                },
            };

            debug!(phase, epoch, requests = data_requests.len(), "simulating block");
            total_requests += data_requests.len() as u64;
            leftover_reputation = self.simulate_block(epoch, &data_requests, leftover_reputation);
        }

        self.ars.assert_reputation_integrity();
        total_requests
    }

    /// Number of data requests in a synthetic block: a normal draw, rounded
    /// and clamped at zero.
    fn synthesize_block_size(&mut self, avg: f64, std: f64) -> usize {
        let distribution =
            Normal::new(avg, std).expect("block-count distribution parameters are validated");
        let drawn: f64 = self.rng.sample(distribution);
        drawn.round().max(0.0) as usize
    }
}

/// Runs a full simulation from the resolved configuration: initialize the
/// population, play the warmup and detailed phases, then write the statistics
/// report.
pub fn run(config: &Config) -> anyhow::Result<()> {
    let start = Instant::now();

    let seed = config.seed.unwrap_or_else(rand::random);
    info!(seed, "simulation RNG seed");
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let balance = config.balance * NANOWITS_PER_WIT;
    let collateral = config.collateral * NANOWITS_PER_WIT;

    let ars = if config.create_random_ars {
        ActiveReputationSet::random(
            &mut rng,
            config.identities,
            config.max_reputation,
            config.zero_reputation_ratio,
            balance,
            config.collateral_locked,
        )
    } else if let Some(path) = &config.ars_file {
        if config.warmup_epochs < config.collateral_locked {
            warn!(
                warmup_epochs = config.warmup_epochs,
                collateral_locked = config.collateral_locked,
                "warmup is shorter than the collateral lock; the collateral and \
                 reputation distributions will not have stabilized"
            );
        }
        let roster = input::read_roster(path)
            .with_context(|| format!("reading roster {}", path.display()))?;
        ActiveReputationSet::from_roster(&mut rng, roster, balance, config.collateral_locked)
    } else {
        ActiveReputationSet::with_zero_reputation(
            &mut rng,
            config.identities,
            balance,
            config.collateral_locked,
        )
    };
    info!(
        identities = ars.len(),
        reputation = ars.current_reputation(),
        "initialized active reputation set"
    );

    let schedule = match &config.data_requests_file {
        Some(path) => RequestSchedule::Recorded(
            input::read_data_requests(path)
                .with_context(|| format!("reading data requests {}", path.display()))?,
        ),
        None => RequestSchedule::Synthetic {
            avg: config.avg_data_requests,
            std: config.std_data_requests,
            witnesses: config.witnesses,
            collateral,
        },
    };

    let mut simulation = Simulation::new(ars, rng, config.approximate_eligibility);

    let warmup_range = config.offset_epochs..config.offset_epochs + config.warmup_epochs;
    let warmup_requests = simulation.run_phase("warmup", warmup_range, &schedule);
    if config.warmup_epochs > 0 {
        for line in simulation.ars().roster_report().lines() {
            info!("{line}");
        }
        info!(
            requests = warmup_requests,
            per_epoch = warmup_requests as f64 / config.warmup_epochs as f64,
            "warmup phase complete"
        );
    }

    if config.simulation_epochs > 0 {
        simulation.clear_stats();
        let detailed_start = config.offset_epochs + config.warmup_epochs;
        let detailed_range = detailed_start..detailed_start + config.simulation_epochs;
        let detailed_requests = simulation.run_phase("detailed", detailed_range, &schedule);
        for line in simulation.ars().roster_report().lines() {
            info!("{line}");
        }
        info!(
            requests = detailed_requests,
            per_epoch = detailed_requests as f64 / config.simulation_epochs as f64,
            "detailed phase complete"
        );
    }

    let (mut stats_file, stats_path) =
        stats::create_stats_file(&config.results_dir).context("creating statistics file")?;
    stats::write_stats(simulation.ars(), &mut stats_file).context("writing statistics")?;
    info!(path = %stats_path.display(), "wrote simulation statistics");

    let elapsed = Duration::from_millis(start.elapsed().as_millis() as u64);
    info!(elapsed = %humantime::format_duration(elapsed), "simulation finished");
    Ok(())
}
