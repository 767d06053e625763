// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Discrete-event simulator for a reputation-weighted witness-selection
//! mechanism as used by decentralized oracle networks.
//!
//! Participants accumulate and lose reputation based on their witnessing
//! history and must pledge temporarily-locked collateral to be selected for a
//! data-request committee. The [`ars`] module holds the engine: the identity
//! ledgers, the trapezoidal eligibility distribution, the multi-round
//! committee selector and the reputation accounting. The [`sim`] module drives
//! the engine block by block, either replaying a captured data-request stream
//! or synthesizing one.
//!
//! All randomness flows through a single seedable RNG, so a simulation is
//! fully reproducible from its seed and inputs.

pub mod ars;
pub mod cli;
pub mod logger;
pub mod sim;
