// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use ars_sim::cli::{Cli, Subcommand};
use ars_sim::{logger, sim};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    // Capture Cli inputs
    let Cli { opts, cmd } = Cli::parse();
    let cfg = opts.to_config()?;

    let _guard = logger::setup_logger(cfg.log_file.as_deref())?;

    // Run a full simulation if no subcommand is used. Otherwise, run the
    // subcommand.
    match cmd {
        Some(Subcommand::Inspect(inspect)) => inspect.run(),
        None => sim::run(&cfg),
    }
}
