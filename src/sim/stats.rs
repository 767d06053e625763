// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Population statistics over the per-identity counters.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use statrs::statistics::{Data, OrderStatistics, Statistics};

use crate::ars::ActiveReputationSet;

const STATS_FILE_PREFIX: &str = "sim.stats.";
const PERCENTILES: [usize; 9] = [10, 20, 30, 40, 50, 60, 70, 80, 90];

/// Creates the next `sim.stats.N` file under `results_dir`, one past the
/// highest counter already present.
pub fn create_stats_file(results_dir: &Path) -> io::Result<(File, PathBuf)> {
    fs::create_dir_all(results_dir)?;
    let next = fs::read_dir(results_dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix(STATS_FILE_PREFIX))
                .and_then(|counter| counter.parse::<u64>().ok())
        })
        .max()
        .map_or(0, |highest| highest + 1);
    let path = results_dir.join(format!("{STATS_FILE_PREFIX}{next}"));
    Ok((File::create(&path)?, path))
}

/// Writes the per-identity solved/unsolvable percentile report.
///
/// Identities that never solved a request are excluded from the solved
/// percentiles; the no-collateral percentiles only consider identities that
/// were chosen at least once.
pub fn write_stats(ars: &ActiveReputationSet, out: &mut impl Write) -> io::Result<()> {
    let solved: Vec<u64> = ars
        .identities()
        .map(|identity| identity.solved_data_requests())
        .collect();
    let no_collateral: Vec<u64> = ars
        .identities()
        .map(|identity| identity.eligible_no_collateral())
        .collect();

    writeln!(
        out,
        "Maximum data requests solved by one identity: {}",
        solved.iter().max().copied().unwrap_or(0)
    )?;
    writeln!(
        out,
        "Maximum data requests eligible but not solved: {}\n",
        no_collateral.iter().max().copied().unwrap_or(0)
    )?;

    let solved_nonzero: Vec<f64> = solved
        .iter()
        .filter(|&&count| count != 0)
        .map(|&count| count as f64)
        .collect();
    write_percentile_report(out, "Data requests solved per identity", &solved_nonzero)?;

    let chosen_no_collateral: Vec<f64> = solved
        .iter()
        .zip(&no_collateral)
        .filter(|&(&solved, &eligible)| solved > 0 || eligible > 0)
        .map(|(_, &eligible)| eligible as f64)
        .collect();
    write_percentile_report(
        out,
        "Data requests eligible but not solved per identity",
        &chosen_no_collateral,
    )?;

    Ok(())
}

fn write_percentile_report(out: &mut impl Write, label: &str, values: &[f64]) -> io::Result<()> {
    if values.is_empty() {
        writeln!(out, "{label}: no identities in the population\n")?;
        return Ok(());
    }
    let mut data = Data::new(values.to_vec());
    for percentile in PERCENTILES {
        writeln!(
            out,
            "{label} ({}%): {:.2}",
            100 - percentile,
            data.percentile(percentile)
        )?;
    }
    writeln!(out, "Average {}: {:.2}\n", lowercase_first(label), values.mean())?;
    Ok(())
}

fn lowercase_first(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
