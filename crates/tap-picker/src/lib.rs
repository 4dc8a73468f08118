#![deny(warnings)]

//! Weighted random selection for cosmetic rewards.
//!
//! Draws walk the cumulative distribution of the table: a uniform `r` in
//! `[0, total)` selects the first entry whose running sum strictly exceeds `r`.
//! Non-positive (and non-finite) weights never win. A table without positive
//! weight always yields its first entry.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tap_core::{RewardId, WeightEntry, WeightTable};
use thiserror::Error;
use tracing::trace;

/// Errors produced by the picker.
#[derive(Debug, Error, PartialEq)]
pub enum PickError {
    /// Tables built through `WeightTable::new` are never empty; deserialized
    /// ones can be.
    #[error("cannot draw from an empty weight table")]
    EmptyTable,
}

fn usable(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

/// Draw an index from `weights` with probability proportional to each weight.
///
/// Returns `None` only for an empty slice. If the usable total is zero (or
/// overflows), index 0 is returned without consuming randomness.
pub fn pick_index<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    let total: f64 = weights.iter().map(|&w| usable(w)).sum();
    if !(total.is_finite() && total > 0.0) {
        return Some(0);
    }
    let r = rng.gen_range(0.0..total);
    let mut acc = 0.0;
    let mut last_positive = 0;
    for (i, &w) in weights.iter().enumerate() {
        let w = usable(w);
        if w == 0.0 {
            continue;
        }
        last_positive = i;
        acc += w;
        if acc > r {
            trace!(index = i, r, total, "weighted draw");
            return Some(i);
        }
    }
    // Rounding in the running sum can leave r just above acc.
    Some(last_positive)
}

/// Draw an identifier from raw entries. `None` for an empty slice.
pub fn pick_entry<R: Rng + ?Sized>(entries: &[WeightEntry], rng: &mut R) -> Option<RewardId> {
    let weights: Vec<f64> = entries.iter().map(|e| e.weight).collect();
    pick_index(&weights, rng).map(|i| entries[i].id)
}

/// Draw an identifier from a table.
pub fn pick<R: Rng + ?Sized>(table: &WeightTable, rng: &mut R) -> Result<RewardId, PickError> {
    pick_entry(table.entries(), rng).ok_or(PickError::EmptyTable)
}

/// Normalized probability of each entry, in table order. All zero when the
/// table has no positive weight except the first entry, which then gets 1.
pub fn probabilities(table: &WeightTable) -> Vec<(RewardId, f64)> {
    let total: f64 = table.entries().iter().map(|e| usable(e.weight)).sum();
    table
        .entries()
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let p = if total.is_finite() && total > 0.0 {
                usable(e.weight) / total
            } else if i == 0 {
                1.0
            } else {
                0.0
            };
            (e.id, p)
        })
        .collect()
}

/// Picker owning its random source.
#[derive(Clone, Debug)]
pub struct WeightedPicker<R> {
    rng: R,
}

impl<R: Rng> WeightedPicker<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn pick(&mut self, table: &WeightTable) -> Result<RewardId, PickError> {
        pick(table, &mut self.rng)
    }
}

impl WeightedPicker<ChaCha8Rng> {
    /// Deterministic picker for replays and tests.
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }

    /// Picker seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self::new(ChaCha8Rng::from_entropy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table(weights: &[f64]) -> Vec<WeightEntry> {
        weights
            .iter()
            .enumerate()
            .map(|(i, &weight)| WeightEntry {
                id: RewardId(i as u32 + 1),
                weight,
            })
            .collect()
    }

    #[test]
    fn empty_table_is_an_error() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(pick_entry(&[], &mut rng), None);
        let t: WeightTable = serde_json::from_str("[]").unwrap();
        assert_eq!(pick(&t, &mut rng), Err(PickError::EmptyTable));
    }

    #[test]
    fn degenerate_tables_return_first_entry() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let zeros = table(&[0.0, 0.0, 0.0]);
        let negatives = table(&[-1.0, -3.0]);
        let nan = table(&[f64::NAN, 0.0]);
        for _ in 0..100 {
            assert_eq!(pick_entry(&zeros, &mut rng), Some(RewardId(1)));
            assert_eq!(pick_entry(&negatives, &mut rng), Some(RewardId(1)));
            assert_eq!(pick_entry(&nan, &mut rng), Some(RewardId(1)));
        }
    }

    #[test]
    fn overflowing_total_falls_back_to_first() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let huge = table(&[f64::MAX, f64::MAX]);
        assert_eq!(pick_entry(&huge, &mut rng), Some(RewardId(1)));
    }

    #[test]
    fn zero_weight_entries_never_win() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let t = table(&[0.0, 1.0, 0.0]);
        for _ in 0..1_000 {
            assert_eq!(pick_entry(&t, &mut rng), Some(RewardId(2)));
        }
    }

    #[test]
    fn frequencies_follow_weights() {
        let t = WeightTable::new(table(&[0.75, 0.15, 0.035, 0.0132, 0.0018])).unwrap();
        let mut picker = WeightedPicker::seeded(42);
        let n = 100_000;
        let mut counts = [0u32; 5];
        for _ in 0..n {
            let id = picker.pick(&t).unwrap();
            counts[(id.0 - 1) as usize] += 1;
        }
        let freq_a = counts[0] as f64 / n as f64;
        let freq_b = counts[1] as f64 / n as f64;
        assert!((freq_a - 0.75).abs() < 0.02, "A drawn {freq_a}");
        assert!((freq_b - 0.15).abs() < 0.02, "B drawn {freq_b}");
        assert!(counts[4] > 0 && counts[4] < counts[3]);
    }

    #[test]
    fn seeded_pickers_repeat() {
        let t = WeightTable::new(table(&[1.0, 2.0, 3.0])).unwrap();
        let mut a = WeightedPicker::seeded(9);
        let mut b = WeightedPicker::seeded(9);
        for _ in 0..50 {
            assert_eq!(a.pick(&t), b.pick(&t));
        }
    }

    #[test]
    fn probabilities_normalize() {
        let t = WeightTable::new(table(&[3.0, 1.0])).unwrap();
        let p = probabilities(&t);
        assert_eq!(p, vec![(RewardId(1), 0.75), (RewardId(2), 0.25)]);
        let z = WeightTable::new(table(&[0.0, 0.0])).unwrap();
        assert_eq!(probabilities(&z), vec![(RewardId(1), 1.0), (RewardId(2), 0.0)]);
    }

    proptest! {
        #[test]
        fn draw_is_always_a_table_member(weights in proptest::collection::vec(-1.0f64..10.0, 1..12),
                                         seed in any::<u64>()) {
            let t = table(&weights);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            for _ in 0..20 {
                let id = pick_entry(&t, &mut rng).unwrap();
                prop_assert!(t.iter().any(|e| e.id == id));
                let w = t.iter().find(|e| e.id == id).unwrap().weight;
                let any_positive = weights.iter().any(|&w| w > 0.0);
                if any_positive {
                    prop_assert!(w > 0.0);
                }
            }
        }

        #[test]
        fn all_zero_is_deterministic(len in 1usize..10, seed in any::<u64>()) {
            let t = table(&vec![0.0; len]);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            for _ in 0..10 {
                prop_assert_eq!(pick_entry(&t, &mut rng), Some(RewardId(1)));
            }
        }
    }
}
