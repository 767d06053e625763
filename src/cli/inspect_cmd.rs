// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use clap::Args;

use crate::sim::input;

/// Print the per-block data-request distribution of a captured stream.
#[derive(Debug, Args)]
pub struct InspectCommand {
    /// Data-request capture (plain, BZ2 or gzip CSV)
    pub data_requests_file: PathBuf,
}

impl InspectCommand {
    pub fn run(&self) -> anyhow::Result<()> {
        let requests = input::read_data_requests(&self.data_requests_file)
            .with_context(|| format!("reading {}", self.data_requests_file.display()))?;
        let Some(histogram) = input::request_histogram(&requests) else {
            bail!(
                "no data requests found in {}",
                self.data_requests_file.display()
            );
        };

        println!("{}", self.data_requests_file.display());
        for (count, blocks) in &histogram.blocks_per_count {
            println!(
                "\tBlocks with {count} data requests: {:.2}%",
                *blocks as f64 / histogram.total_blocks as f64 * 100.0
            );
        }
        println!(
            "Average number of data requests per block: {:.2}",
            histogram.average_per_block
        );
        Ok(())
    }
}
