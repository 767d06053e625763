// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::VecDeque;

use rand::Rng;
use tracing::{debug, trace};

const NAME_PREFIX: &str = "wit1";
const NAME_SUFFIX_LEN: usize = 38;
const NAME_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// A single reputation grant, recorded at the value of the global
/// witnessing-act counter when it was awarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReputationGain {
    pub witness_act_time: u64,
    pub amount: u64,
}

/// An unspent collateral output, spendable from `unlock_epoch` onwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollateralUtxo {
    pub unlock_epoch: u64,
    pub amount: u64,
}

/// Per-participant state: the reputation-grant ledger, the collateral UTXO
/// ledger and two statistics counters.
///
/// Both ledgers are kept sorted ascending by their timestamp so that expiry
/// and collateral consumption only ever touch the head of the queue.
#[derive(Debug, Clone)]
pub struct Identity {
    name: String,
    total_reputation: u64,
    reputation_gains: VecDeque<ReputationGain>,
    available_collateral: VecDeque<CollateralUtxo>,
    solved_data_requests: u64,
    eligible_no_collateral: u64,
}

impl Identity {
    /// Creates an identity from pre-built ledgers. `reputation_gains` must be
    /// sorted ascending by `witness_act_time` and `available_collateral` by
    /// `unlock_epoch`; all amounts must be strictly positive.
    pub fn new(
        name: String,
        reputation_gains: Vec<ReputationGain>,
        available_collateral: Vec<CollateralUtxo>,
    ) -> Self {
        debug_assert!(
            reputation_gains
                .windows(2)
                .all(|pair| pair[0].witness_act_time <= pair[1].witness_act_time),
            "reputation grants must be sorted by witnessing act"
        );
        let total_reputation = reputation_gains.iter().map(|gain| gain.amount).sum();
        Self {
            name,
            total_reputation,
            reputation_gains: reputation_gains.into(),
            available_collateral: available_collateral.into(),
            solved_data_requests: 0,
            eligible_no_collateral: 0,
        }
    }

    /// Draws a fresh random name: a fixed marker followed by 38 lowercase
    /// alphanumeric characters.
    pub fn generate_name(rng: &mut impl Rng) -> String {
        let suffix: String = (0..NAME_SUFFIX_LEN)
            .map(|_| char::from(NAME_CHARSET[rng.gen_range(0..NAME_CHARSET.len())]))
            .collect();
        format!("{NAME_PREFIX}{suffix}")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_reputation(&self) -> u64 {
        self.total_reputation
    }

    pub fn reputation_gains(&self) -> &VecDeque<ReputationGain> {
        &self.reputation_gains
    }

    pub fn available_collateral(&self) -> &VecDeque<CollateralUtxo> {
        &self.available_collateral
    }

    pub fn solved_data_requests(&self) -> u64 {
        self.solved_data_requests
    }

    pub fn eligible_no_collateral(&self) -> u64 {
        self.eligible_no_collateral
    }

    /// Whether the spendable balance at `epoch` covers `required_collateral`.
    /// A negative answer is counted against the identity: it was picked by the
    /// selector but cannot serve.
    pub fn can_witness(&mut self, epoch: u64, required_collateral: u64) -> bool {
        let spendable: u64 = self
            .available_collateral
            .iter()
            .filter(|utxo| utxo.unlock_epoch <= epoch)
            .map(|utxo| utxo.amount)
            .sum();
        if spendable >= required_collateral {
            trace!(identity = %self.name, epoch, "can witness");
            return true;
        }
        trace!(
            identity = %self.name,
            epoch,
            spendable,
            required_collateral,
            "insufficient spendable collateral"
        );
        self.eligible_no_collateral += 1;
        false
    }

    /// Locks `required_collateral` until `used_until`. Consumes UTXOs from the
    /// head of the queue (oldest unlock first); any excess from the last
    /// consumed output is pushed back at the head with its original unlock
    /// epoch, and the locked amount is appended at the tail.
    ///
    /// The caller must have verified `can_witness` for the same epoch.
    pub fn mark_collateral(&mut self, epoch: u64, required_collateral: u64, used_until: u64) {
        assert!(
            self.can_witness(epoch, required_collateral),
            "{} cannot pledge {} collateral at epoch {}",
            self.name,
            required_collateral,
            epoch
        );

        if required_collateral > 0 {
            let mut gathered = 0;
            let mut last_unlock = 0;
            while gathered < required_collateral {
                let utxo = self
                    .available_collateral
                    .pop_front()
                    .expect("spendable balance covers the requirement");
                gathered += utxo.amount;
                last_unlock = utxo.unlock_epoch;
            }
            if gathered > required_collateral {
                self.available_collateral.push_front(CollateralUtxo {
                    unlock_epoch: last_unlock,
                    amount: gathered - required_collateral,
                });
            }
            self.available_collateral.push_back(CollateralUtxo {
                unlock_epoch: used_until,
                amount: required_collateral,
            });
            debug!(
                identity = %self.name,
                epoch,
                utxos = ?self.available_collateral,
                "collateral locked"
            );
        }

        self.solved_data_requests += 1;
    }

    /// Appends a reputation grant recorded at `witnessing_acts` and updates
    /// the total. A head entry older than the expiry window means a stale
    /// grant slipped past the expiry pass, which is a logic bug.
    pub fn update_reputation(
        &mut self,
        expire_window: u64,
        witnessing_acts: u64,
        reputation: u64,
        epoch: u64,
    ) {
        if let Some(head) = self.reputation_gains.front() {
            assert!(
                head.witness_act_time >= witnessing_acts.saturating_sub(expire_window),
                "{} holds a stale reputation grant from act {}",
                self.name,
                head.witness_act_time
            );
        }
        self.reputation_gains.push_back(ReputationGain {
            witness_act_time: witnessing_acts,
            amount: reputation,
        });
        self.total_reputation = self.reputation_gains.iter().map(|gain| gain.amount).sum();
        debug!(
            identity = %self.name,
            epoch,
            witnessing_acts,
            total_reputation = self.total_reputation,
            "reputation granted"
        );
    }

    /// Drops every grant recorded before `witness_acts_expired` and returns
    /// the expired amount. Grants are sorted ascending, so the walk stops at
    /// the first entry still inside the window.
    pub fn get_expired_reputation(
        &mut self,
        witness_acts_expired: u64,
        epoch: u64,
        total_witness_acts: u64,
    ) -> u64 {
        let mut expired = 0;
        while let Some(gain) = self.reputation_gains.front() {
            if gain.witness_act_time >= witness_acts_expired {
                break;
            }
            trace!(
                identity = %self.name,
                epoch,
                total_witness_acts,
                gain = ?gain,
                "reputation expired"
            );
            expired += gain.amount;
            self.reputation_gains.pop_front();
        }
        self.total_reputation = self.reputation_gains.iter().map(|gain| gain.amount).sum();
        expired
    }

    pub fn clear_stats(&mut self) {
        self.solved_data_requests = 0;
        self.eligible_no_collateral = 0;
    }
}
