// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use rand::Rng;

/// Splits `total` into at most `parts` strictly positive integers that sum to
/// exactly `total`.
///
/// Draws `parts` uniforms, normalizes them to `total`, hands the rounding
/// remainder out one unit at a time starting at the head and drops any zero
/// shares. The result may therefore be shorter than `parts`, and is empty when
/// `total` is zero.
pub fn random_partition(rng: &mut impl Rng, parts: usize, total: u64) -> Vec<u64> {
    assert!(parts > 0, "cannot partition into zero parts");

    let draws: Vec<f64> = (0..parts).map(|_| rng.gen_range(0.0..1.0)).collect();
    let draw_sum: f64 = draws.iter().sum();

    let mut shares: Vec<u64> = draws
        .iter()
        .map(|draw| (draw / draw_sum * total as f64) as u64)
        .collect();
    let assigned: u64 = shares.iter().sum();
    let remainder = total.saturating_sub(assigned);
    for share in shares.iter_mut().take(remainder as usize) {
        *share += 1;
    }

    shares.retain(|&share| share != 0);
    assert_eq!(
        shares.iter().sum::<u64>(),
        total,
        "partition must preserve the total"
    );
    shares
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn partitioning_zero_yields_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(random_partition(&mut rng, 5, 0).is_empty());
    }

    #[test]
    fn a_single_part_takes_the_whole_total() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(random_partition(&mut rng, 1, 42), vec![42]);
    }

    #[quickcheck]
    fn partition_preserves_the_total_with_positive_shares(
        seed: u64,
        parts: u8,
        total: u32,
    ) -> bool {
        let parts = usize::from(parts % 64) + 1;
        let total = u64::from(total % 1_000_000);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let shares = random_partition(&mut rng, parts, total);
        shares.iter().sum::<u64>() == total
            && shares.iter().all(|&share| share >= 1)
            && shares.len() <= parts
    }

    #[quickcheck]
    fn partition_is_deterministic_under_a_fixed_seed(seed: u64) -> bool {
        let mut first = ChaCha8Rng::seed_from_u64(seed);
        let mut second = ChaCha8Rng::seed_from_u64(seed);
        random_partition(&mut first, 16, 10_000) == random_partition(&mut second, 16, 10_000)
    }
}
