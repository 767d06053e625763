// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use indexmap::IndexMap;
use rand::{Rng, seq::SliceRandom};
use tracing::debug;

use super::{ActiveReputationSet, COMMIT_ROUNDS};

/// Outcome of a committee draw for a single data request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionResult {
    /// A full committee was gathered and its collateral locked.
    Committee {
        witnesses: Vec<String>,
        insufficient_collateral: Vec<String>,
    },
    /// All commit rounds were exhausted; carries the partial eligible set and
    /// the collateral rejects of the final round.
    Failed {
        eligible: Vec<String>,
        insufficient_collateral: Vec<String>,
    },
}

impl ActiveReputationSet {
    /// Draws a committee of `num_witnesses` from the eligibility snapshot.
    ///
    /// Runs up to [`COMMIT_ROUNDS`] rounds, doubling the sampling intensity
    /// each time. Per round, an identity is eligible either with probability
    /// `eligibility * num_witnesses * 2^round` (`approximate`), or when the
    /// minimum of that many uniform draws falls below its eligibility (the
    /// order-statistic form of "selected at least once"). Note the
    /// approximate probability may exceed one, in which case the round is
    /// dense: every identity is drawn.
    ///
    /// Eligible identities that cannot cover `collateral` at `epoch` are set
    /// aside; once enough remain, `num_witnesses` of them are picked uniformly
    /// without replacement and their collateral is locked for the configured
    /// number of epochs.
    pub fn select_witnesses(
        &mut self,
        rng: &mut impl Rng,
        eligibilities: &IndexMap<String, f64>,
        approximate: bool,
        num_witnesses: usize,
        epoch: u64,
        collateral: u64,
    ) -> SelectionResult {
        let mut eligible = Vec::new();
        let mut insufficient_collateral = Vec::new();

        for commit_round in 0..COMMIT_ROUNDS {
            eligible.clear();
            insufficient_collateral.clear();
            let intensity = num_witnesses * (1_usize << commit_round);

            for (name, &eligibility) in eligibilities {
                let is_eligible = if approximate {
                    rng.gen_range(0.0..1.0) < eligibility * intensity as f64
                } else {
                    let smallest_draw = (0..intensity)
                        .map(|_| rng.gen_range(0.0..1.0))
                        .fold(f64::INFINITY, f64::min);
                    smallest_draw < eligibility
                };
                if !is_eligible {
                    continue;
                }
                let identity = self
                    .identities
                    .get_mut(name)
                    .expect("eligibility snapshot covers the identity set");
                if identity.can_witness(epoch, collateral) {
                    eligible.push(name.clone());
                } else {
                    insufficient_collateral.push(name.clone());
                }
            }

            if eligible.len() >= num_witnesses {
                let witnesses: Vec<String> = eligible
                    .choose_multiple(rng, num_witnesses)
                    .cloned()
                    .collect();
                debug!(
                    epoch,
                    commit_round,
                    committee = ?witnesses,
                    surplus = eligible.len() - num_witnesses,
                    "committee chosen"
                );
                let used_until = epoch + self.collateral_locked;
                for name in &witnesses {
                    self.identities
                        .get_mut(name)
                        .expect("committee members are in the identity set")
                        .mark_collateral(epoch, collateral, used_until);
                }
                return SelectionResult::Committee {
                    witnesses,
                    insufficient_collateral,
                };
            }
        }

        SelectionResult::Failed {
            eligible,
            insufficient_collateral,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use crate::ars::{CollateralUtxo, Identity};

    fn zero_reputation_set(count: usize, balance: u64) -> ActiveReputationSet {
        let identities = (0..count)
            .map(|index| {
                Identity::new(
                    format!("wit1{index:038}"),
                    vec![],
                    vec![CollateralUtxo {
                        unlock_epoch: 0,
                        amount: balance,
                    }],
                )
            })
            .collect();
        ActiveReputationSet::from_identities(identities, 1000)
    }

    #[test]
    fn uniform_set_yields_a_full_committee() {
        let mut ars = zero_reputation_set(4, 100);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let eligibilities = ars.eligibilities();

        // Intensity reaches 4 * 0.25 = 1.0 by the second round, so a
        // committee is guaranteed regardless of the seed.
        let result = ars.select_witnesses(&mut rng, &eligibilities, true, 2, 0, 5);
        let SelectionResult::Committee { witnesses, .. } = result else {
            panic!("expected a committee, got {result:?}");
        };
        assert_eq!(witnesses.len(), 2);
        let mut distinct = witnesses.clone();
        distinct.dedup();
        assert_eq!(distinct.len(), 2);

        for name in &witnesses {
            let identity = ars.identity(name).unwrap();
            assert_eq!(identity.solved_data_requests(), 1);
            assert_eq!(
                identity.available_collateral(),
                &[
                    CollateralUtxo {
                        unlock_epoch: 0,
                        amount: 95
                    },
                    CollateralUtxo {
                        unlock_epoch: 1000,
                        amount: 5
                    }
                ]
            );
        }
    }

    #[test]
    fn locked_collateral_fails_the_followup_request() {
        let mut ars = zero_reputation_set(2, 5);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let eligibilities = ars.eligibilities();

        let first = ars.select_witnesses(&mut rng, &eligibilities, true, 2, 0, 5);
        assert!(matches!(first, SelectionResult::Committee { .. }));

        // The only UTXO of both identities is now locked until epoch 1000, so
        // every round of the second draw rejects both of them.
        let second = ars.select_witnesses(&mut rng, &eligibilities, true, 2, 0, 5);
        let SelectionResult::Failed {
            eligible,
            insufficient_collateral,
        } = second
        else {
            panic!("expected failure, got {second:?}");
        };
        assert!(eligible.is_empty());
        assert_eq!(insufficient_collateral.len(), 2);
        for identity in ars.identities() {
            assert_eq!(
                identity.eligible_no_collateral(),
                u64::from(COMMIT_ROUNDS)
            );
        }
    }

    #[test]
    fn oversized_requests_fail() {
        let mut ars = zero_reputation_set(2, 100);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let eligibilities = ars.eligibilities();
        let result = ars.select_witnesses(&mut rng, &eligibilities, true, 5, 0, 5);
        assert!(matches!(result, SelectionResult::Failed { .. }));
    }

    #[test]
    fn approximate_probability_above_one_is_a_dense_round() {
        let mut ars = zero_reputation_set(3, 100);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let eligibilities = ars.eligibilities();

        // eligibility 1/3 with 4 witnesses puts every identity at probability
        // 4/3, so each round deterministically drafts the whole set. The
        // population is still one short of the committee, so the request
        // fails with everyone in the eligible pool.
        let result = ars.select_witnesses(&mut rng, &eligibilities, true, 4, 0, 5);
        let SelectionResult::Failed {
            eligible,
            insufficient_collateral,
        } = result
        else {
            panic!("expected failure, got {result:?}");
        };
        assert_eq!(eligible.len(), 3);
        assert!(insufficient_collateral.is_empty());
    }

    #[test]
    fn exact_mode_is_reproducible_under_a_fixed_seed() {
        let mut first_set = zero_reputation_set(6, 100);
        let mut second_set = zero_reputation_set(6, 100);
        let eligibilities = first_set.eligibilities();

        let mut first_rng = ChaCha8Rng::seed_from_u64(42);
        let mut second_rng = ChaCha8Rng::seed_from_u64(42);
        let first = first_set.select_witnesses(&mut first_rng, &eligibilities, false, 2, 0, 5);
        let second = second_set.select_witnesses(&mut second_rng, &eligibilities, false, 2, 0, 5);
        assert_eq!(first, second);
    }
}
