// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Trapezoidal eligibility distribution.
//!
//! Identities are ranked by reputation and assigned a weight that decreases
//! linearly with rank (the triangle); a uniform offset (the rectangle) tops
//! the trapezoid up so its mass equals the total active reputation. A final
//! `+1` smoothing gives every identity, reputed or not, a nonzero draw
//! probability.

use indexmap::IndexMap;
use itertools::Itertools;

use super::Identity;

/// Evaluates `y = m*x + k`, saturated at zero and rounded half away from
/// zero.
fn line_weight(x: f64, m: f64, k: f64) -> u64 {
    let y = m * x + k;
    if y < 0.0 { 0 } else { y.round() as u64 }
}

/// Triangle weights for `reputed_len` ranked identities, steepest first.
///
/// The peak is 1.5 times the average reputation above the minimum; the slope
/// brings the line to zero at the last rank. A single reputed identity gets
/// the whole peak with no slope.
fn triangle_weights(total_active: u64, reputed_len: usize, minimum: u64) -> (Vec<u64>, u64) {
    let count = reputed_len as f64;
    let average = total_active as f64 / count;
    let k = 1.5 * (average - minimum as f64);
    let m = if reputed_len > 1 { -k / (count - 1.0) } else { 0.0 };

    let mut weights = Vec::with_capacity(reputed_len);
    let mut total = 0;
    for rank in 0..reputed_len {
        let weight = line_weight(rank as f64, m, k);
        total += weight;
        weights.push(weight);
    }
    (weights, total)
}

/// Raw trapezoid weights per reputed identity, plus the total active
/// reputation. Identities without reputation are absent from the map.
pub(crate) fn trapezoid_weights(
    identities: &IndexMap<String, Identity>,
) -> (IndexMap<String, u64>, u64) {
    let total_active: u64 = identities
        .values()
        .map(|identity| identity.total_reputation())
        .sum();
    let reputed: Vec<&Identity> = identities
        .values()
        .filter(|identity| identity.total_reputation() > 0)
        .sorted_by(|a, b| b.total_reputation().cmp(&a.total_reputation()))
        .collect();
    if reputed.is_empty() {
        return (IndexMap::new(), 0);
    }

    let minimum = reputed
        .last()
        .expect("reputed set is non-empty")
        .total_reputation();
    let (triangle, triangle_total) = triangle_weights(total_active, reputed.len(), minimum);

    // The rectangle at the base: whatever the triangle leaves uncovered,
    // spread evenly with the indivisible remainder going to the top ranks.
    // Euclidean division keeps the weights exact when the rounded triangle
    // overshoots the total.
    let remaining = total_active as i64 - triangle_total as i64;
    let count = reputed.len() as i64;
    let offset = remaining.div_euclid(count);
    let extra = remaining.rem_euclid(count);

    let mut weights = IndexMap::with_capacity(reputed.len());
    for (rank, (identity, triangle_weight)) in reputed.iter().zip(triangle).enumerate() {
        let mut weight = triangle_weight as i64 + offset;
        if (rank as i64) < extra {
            weight += 1;
        }
        weights.insert(
            identity.name().to_owned(),
            u64::try_from(weight).expect("trapezoid weights are non-negative"),
        );
    }
    (weights, total_active)
}

/// Normalized eligibility per identity. Every identity appears in the output
/// and the values sum to one.
pub(crate) fn calculate(identities: &IndexMap<String, Identity>) -> IndexMap<String, f64> {
    if identities.is_empty() {
        return IndexMap::new();
    }
    let (trapezoid, total_active) = trapezoid_weights(identities);
    let denominator = (total_active + identities.len() as u64) as f64;
    identities
        .keys()
        .map(|name| {
            let raw = trapezoid.get(name).copied().unwrap_or(0);
            (name.clone(), (raw + 1) as f64 / denominator)
        })
        .collect()
}
