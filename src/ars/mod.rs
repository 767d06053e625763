// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The active reputation set: every identity eligible to witness, the global
//! reputation pool and the global witnessing-act counter.

mod eligibility;
mod identity;
mod partition;
mod selection;

pub use identity::{CollateralUtxo, Identity, ReputationGain};
pub use partition::random_partition;
pub use selection::SelectionResult;

use indexmap::IndexMap;
use itertools::Itertools;
use rand::Rng;
use tracing::debug;

/// Hard cap on the reputation in circulation.
pub const TOTAL_REPUTATION: u64 = 1 << 20;
/// Window, in witnessing acts, after which a reputation grant expires.
pub const REPUTATION_EXPIRE: u64 = 20_000;
/// Rounds the committee selector attempts before giving up on a request.
pub const COMMIT_ROUNDS: u32 = 4;
/// Nanowits per wit.
pub const NANOWITS_PER_WIT: u64 = 1_000_000_000;

/// The population of identities together with the global reputation state.
///
/// The identity map keeps insertion order, so every walk over the set is
/// deterministic and a seeded simulation replays exactly.
pub struct ActiveReputationSet {
    identities: IndexMap<String, Identity>,
    current_reputation: u64,
    current_witnessing_acts: u64,
    collateral_locked: u64,
}

impl ActiveReputationSet {
    /// Builds the set from pre-built identities. The global reputation pool
    /// starts at the sum of the identities' totals and the witnessing-act
    /// counter at zero.
    pub fn from_identities(identities: Vec<Identity>, collateral_locked: u64) -> Self {
        let mut map = IndexMap::with_capacity(identities.len());
        let mut current_reputation = 0;
        for identity in identities {
            current_reputation += identity.total_reputation();
            let previous = map.insert(identity.name().to_owned(), identity);
            assert!(previous.is_none(), "identity names must be unique");
        }
        assert!(
            current_reputation <= TOTAL_REPUTATION,
            "seeded reputation exceeds the global cap"
        );
        Self {
            identities: map,
            current_reputation,
            current_witnessing_acts: 0,
            collateral_locked,
        }
    }

    /// `identity_count` fresh identities with no reputation and a single
    /// immediately spendable collateral output of `balance` each.
    pub fn with_zero_reputation(
        rng: &mut impl Rng,
        identity_count: usize,
        balance: u64,
        collateral_locked: u64,
    ) -> Self {
        let identities = (0..identity_count)
            .map(|_| {
                Identity::new(
                    Identity::generate_name(rng),
                    vec![],
                    vec![CollateralUtxo {
                        unlock_epoch: 0,
                        amount: balance,
                    }],
                )
            })
            .collect();
        Self::from_identities(identities, collateral_locked)
    }

    /// Builds the set from `(name, reputation)` roster entries. Each
    /// identity's reputation is split into roughly `reputation / 10 + 1`
    /// grants recorded at uniformly random witnessing acts inside the expiry
    /// window, plus a single spendable collateral output of `balance`.
    pub fn from_roster(
        rng: &mut impl Rng,
        roster: impl IntoIterator<Item = (String, u64)>,
        balance: u64,
        collateral_locked: u64,
    ) -> Self {
        let identities = roster
            .into_iter()
            .map(|(name, reputation)| {
                let gains = synthesize_gains(rng, reputation, reputation / 10 + 1);
                Identity::new(
                    name,
                    gains,
                    vec![CollateralUtxo {
                        unlock_epoch: 0,
                        amount: balance,
                    }],
                )
            })
            .collect();
        Self::from_identities(identities, collateral_locked)
    }

    /// Builds a randomized population: `zero_reputation_ratio` percent of the
    /// identities hold nothing, the rest draw distinct reputations from
    /// `[1, max_reputation)` rescaled so the whole set holds exactly
    /// [`TOTAL_REPUTATION`]. Grants and collateral outputs are partitioned
    /// randomly across the expiry and lock windows, and the witnessing-act
    /// counter starts past the expiry window so stale grants age out from the
    /// first block on.
    pub fn random(
        rng: &mut impl Rng,
        identity_count: usize,
        max_reputation: u64,
        zero_reputation_ratio: u64,
        balance: u64,
        collateral_locked: u64,
    ) -> Self {
        let reputed_count = identity_count * (100 - zero_reputation_ratio as usize) / 100;
        let pool = max_reputation.saturating_sub(1) as usize;
        assert!(
            reputed_count <= pool,
            "cannot draw {reputed_count} distinct reputations below {max_reputation}"
        );

        let mut all_reputation: Vec<u64> = rand::seq::index::sample(rng, pool, reputed_count)
            .into_iter()
            .map(|index| index as u64 + 1)
            .collect();
        all_reputation.resize(identity_count, 0);

        // Rescale so the population holds exactly the reputation cap, handing
        // the rounding remainder out one unit at a time from the head.
        let drawn_total: u64 = all_reputation.iter().sum();
        if drawn_total > 0 {
            for reputation in &mut all_reputation {
                *reputation = (u128::from(*reputation) * u128::from(TOTAL_REPUTATION)
                    / u128::from(drawn_total)) as u64;
            }
            let assigned: u64 = all_reputation.iter().sum();
            let remainder = TOTAL_REPUTATION - assigned;
            for reputation in all_reputation.iter_mut().take(remainder as usize) {
                *reputation += 1;
            }
        }

        let identities = all_reputation
            .into_iter()
            .map(|reputation| {
                let parts = reputation / 16 + 1;
                let gains = synthesize_gains(rng, reputation, parts);
                let mut collateral: Vec<CollateralUtxo> =
                    random_partition(rng, parts as usize, balance)
                        .into_iter()
                        .map(|amount| CollateralUtxo {
                            unlock_epoch: rng.gen_range(0..=collateral_locked),
                            amount,
                        })
                        .collect();
                collateral.sort_by_key(|utxo| utxo.unlock_epoch);
                let identity =
                    Identity::new(Identity::generate_name(rng), gains, collateral);
                debug!(identity = ?identity, "created identity");
                identity
            })
            .collect();

        let mut ars = Self::from_identities(identities, collateral_locked);
        // Start far enough into the act counter that grants from the far end
        // of the window can expire on the very first data request.
        ars.current_witnessing_acts = REPUTATION_EXPIRE * 11 / 10;
        ars
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn identity(&self, name: &str) -> Option<&Identity> {
        self.identities.get(name)
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    pub fn current_reputation(&self) -> u64 {
        self.current_reputation
    }

    pub fn current_witnessing_acts(&self) -> u64 {
        self.current_witnessing_acts
    }

    pub fn collateral_locked(&self) -> u64 {
        self.collateral_locked
    }

    /// Normalized selection weight per identity under the trapezoidal
    /// distribution. Computed once per block and shared by every data request
    /// in it, so all committees of a block are drawn from one consistent view.
    pub fn eligibilities(&self) -> IndexMap<String, f64> {
        eligibility::calculate(&self.identities)
    }

    /// Mints reputation for `new_witnessing_acts`, bounded by the headroom
    /// left under [`TOTAL_REPUTATION`]. Expired reputation re-enters
    /// circulation through the distribution pool, so it is never deducted
    /// here; the pool counter tracks everything minted so far.
    pub fn created_reputation(&mut self, new_witnessing_acts: u64) -> u64 {
        let created = new_witnessing_acts.min(TOTAL_REPUTATION - self.current_reputation);
        self.current_reputation += created;
        debug!(
            created,
            new_witnessing_acts, "minted reputation for witnessing acts"
        );
        created
    }

    /// Advances the global act counter by `new_witnessing_acts` and expires
    /// every grant that fell out of the window, returning the total amount
    /// removed from the identity ledgers.
    pub fn expired_reputation(&mut self, new_witnessing_acts: u64, epoch: u64) -> u64 {
        self.current_witnessing_acts += new_witnessing_acts;
        let threshold = self.current_witnessing_acts.saturating_sub(REPUTATION_EXPIRE);

        let mut total_expired = 0;
        for identity in self.identities.values_mut() {
            total_expired +=
                identity.get_expired_reputation(threshold, epoch, self.current_witnessing_acts);
        }
        debug!(epoch, total_expired, "expired reputation");
        total_expired
    }

    /// Splits `distribute_reputation` evenly across `witnesses` (one share
    /// per witnessing act, so a name appearing twice is paid twice) and
    /// returns the indivisible remainder for the caller to carry into the
    /// next block. Zero shares are not recorded.
    pub fn update_reputation(
        &mut self,
        witnesses: &[String],
        distribute_reputation: u64,
        epoch: u64,
    ) -> u64 {
        if witnesses.is_empty() {
            return distribute_reputation;
        }
        let share = distribute_reputation / witnesses.len() as u64;
        if share == 0 {
            return distribute_reputation;
        }
        for name in witnesses {
            self.identities
                .get_mut(name)
                .expect("witnesses are members of the identity set")
                .update_reputation(REPUTATION_EXPIRE, self.current_witnessing_acts, share, epoch);
        }
        let distributed = share * witnesses.len() as u64;
        debug!(epoch, distributed, "distributed reputation");
        distribute_reputation - distributed
    }

    /// Zeroes the per-identity statistics counters.
    pub fn clear_stats(&mut self) {
        for identity in self.identities.values_mut() {
            identity.clear_stats();
        }
    }

    /// Asserts that every identity's reputation total matches its grant
    /// ledger. Cheap enough to run after every simulation phase.
    pub fn assert_reputation_integrity(&self) {
        for identity in self.identities.values() {
            assert_eq!(
                identity.total_reputation(),
                identity
                    .reputation_gains()
                    .iter()
                    .map(|gain| gain.amount)
                    .sum::<u64>(),
                "reputation ledger of {} is out of sync",
                identity.name()
            );
        }
    }

    /// Fixed-width roster table, highest reputation first.
    pub fn roster_report(&self) -> String {
        let mut report = format!(
            "{:<44}{:>12}{:>16}{:>16}\n",
            "Identity", "Reputation", "No collateral", "Data requests"
        );
        for identity in self
            .identities
            .values()
            .sorted_by(|a, b| b.total_reputation().cmp(&a.total_reputation()))
        {
            report.push_str(&format!(
                "{:<44}{:>12}{:>16}{:>16}\n",
                identity.name(),
                identity.total_reputation(),
                identity.eligible_no_collateral(),
                identity.solved_data_requests()
            ));
        }
        report
    }
}

/// Splits `reputation` into `parts` random grants tagged with uniform random
/// witnessing acts inside the expiry window, sorted by act.
fn synthesize_gains(rng: &mut impl Rng, reputation: u64, parts: u64) -> Vec<ReputationGain> {
    let mut gains: Vec<ReputationGain> = random_partition(rng, parts as usize, reputation)
        .into_iter()
        .map(|amount| ReputationGain {
            witness_act_time: rng.gen_range(0..=REPUTATION_EXPIRE),
            amount,
        })
        .collect();
    gains.sort_by_key(|gain| gain.witness_act_time);
    gains
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn named(index: usize) -> String {
        format!("wit1{index:038}")
    }

    fn set_with_gains(gains_per_identity: Vec<Vec<ReputationGain>>) -> ActiveReputationSet {
        let identities = gains_per_identity
            .into_iter()
            .enumerate()
            .map(|(index, gains)| Identity::new(named(index), gains, vec![]))
            .collect();
        ActiveReputationSet::from_identities(identities, 1000)
    }

    #[test]
    fn minting_respects_the_global_cap() {
        let mut ars = set_with_gains(vec![vec![ReputationGain {
            witness_act_time: 0,
            amount: TOTAL_REPUTATION - 5,
        }]]);
        assert_eq!(ars.created_reputation(10), 5);
        assert_eq!(ars.current_reputation(), TOTAL_REPUTATION);
        assert_eq!(ars.created_reputation(10), 0);
        assert_eq!(ars.current_reputation(), TOTAL_REPUTATION);
    }

    #[test]
    fn distribution_carries_the_indivisible_remainder() {
        let mut ars = set_with_gains(vec![vec![], vec![], vec![]]);
        let witnesses: Vec<String> = (0..3).map(named).collect();

        let leftover = ars.update_reputation(&witnesses, 7, 0);
        assert_eq!(leftover, 1);
        for name in &witnesses {
            assert_eq!(ars.identity(name).unwrap().total_reputation(), 2);
        }

        let leftover = ars.update_reputation(&witnesses, 5 + leftover, 1);
        assert_eq!(leftover, 0);
        for name in &witnesses {
            assert_eq!(ars.identity(name).unwrap().total_reputation(), 4);
        }
    }

    #[test]
    fn zero_shares_are_not_recorded() {
        let mut ars = set_with_gains(vec![vec![], vec![], vec![]]);
        let witnesses: Vec<String> = (0..3).map(named).collect();
        assert_eq!(ars.update_reputation(&witnesses, 2, 0), 2);
        for name in &witnesses {
            let identity = ars.identity(name).unwrap();
            assert_eq!(identity.total_reputation(), 0);
            assert!(identity.reputation_gains().is_empty());
        }
    }

    #[test]
    fn a_witness_selected_twice_in_a_block_is_paid_twice() {
        let mut ars = set_with_gains(vec![vec![], vec![]]);
        let witnesses = vec![named(0), named(1), named(0)];
        let leftover = ars.update_reputation(&witnesses, 9, 0);
        assert_eq!(leftover, 0);
        assert_eq!(ars.identity(&named(0)).unwrap().total_reputation(), 6);
        assert_eq!(ars.identity(&named(1)).unwrap().total_reputation(), 3);
    }

    #[test]
    fn expiry_crosses_the_window_threshold() {
        let mut ars = set_with_gains(vec![
            vec![ReputationGain {
                witness_act_time: 5,
                amount: 100,
            }],
            vec![],
        ]);
        // 20_005 acts put the threshold at 5, one short of expiring the grant.
        assert_eq!(ars.expired_reputation(20_005, 0), 0);
        assert_eq!(ars.expired_reputation(1, 1), 100);
        let identity = ars.identity(&named(0)).unwrap();
        assert_eq!(identity.total_reputation(), 0);
        assert!(identity.reputation_gains().is_empty());
        assert_eq!(ars.current_witnessing_acts(), 20_006);
    }

    #[test]
    fn zero_reputation_population_starts_clean() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let ars = ActiveReputationSet::with_zero_reputation(&mut rng, 10, 100, 1000);
        assert_eq!(ars.len(), 10);
        assert_eq!(ars.current_reputation(), 0);
        assert_eq!(ars.current_witnessing_acts(), 0);
        for identity in ars.identities() {
            assert_eq!(identity.total_reputation(), 0);
            assert_eq!(
                identity.available_collateral(),
                &[CollateralUtxo {
                    unlock_epoch: 0,
                    amount: 100
                }]
            );
        }
    }

    #[test]
    fn roster_population_synthesizes_matching_grant_ledgers() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let roster = vec![("alice".to_owned(), 95), ("bob".to_owned(), 0)];
        let ars = ActiveReputationSet::from_roster(&mut rng, roster, 100, 1000);

        assert_eq!(ars.current_reputation(), 95);
        let alice = ars.identity("alice").unwrap();
        assert_eq!(alice.total_reputation(), 95);
        assert!(!alice.reputation_gains().is_empty());
        assert!(
            alice
                .reputation_gains()
                .iter()
                .all(|gain| gain.amount > 0 && gain.witness_act_time <= REPUTATION_EXPIRE)
        );
        let bob = ars.identity("bob").unwrap();
        assert_eq!(bob.total_reputation(), 0);
        assert!(bob.reputation_gains().is_empty());
        ars.assert_reputation_integrity();
    }

    #[test]
    fn random_population_holds_exactly_the_reputation_cap() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let ars = ActiveReputationSet::random(&mut rng, 100, 10_000, 50, 1_000, 1000);

        assert_eq!(ars.len(), 100);
        assert_eq!(ars.current_reputation(), TOTAL_REPUTATION);
        let total: u64 = ars.identities().map(Identity::total_reputation).sum();
        assert_eq!(total, TOTAL_REPUTATION);
        assert_eq!(ars.current_witnessing_acts(), REPUTATION_EXPIRE * 11 / 10);

        let zero_count = ars
            .identities()
            .filter(|identity| identity.total_reputation() == 0)
            .count();
        assert_eq!(zero_count, 50);

        for identity in ars.identities() {
            let collateral: u64 = identity
                .available_collateral()
                .iter()
                .map(|utxo| utxo.amount)
                .sum();
            assert_eq!(collateral, 1_000);
            assert!(
                identity
                    .available_collateral()
                    .iter()
                    .tuple_windows()
                    .all(|(a, b)| a.unlock_epoch <= b.unlock_epoch)
            );
        }
        ars.assert_reputation_integrity();
    }
}
