use rand::Rng;

use super::SwapMessage;
use crate::replica::acceptance::MAX_EXPONENT;

/// The probability of exchanging the states of two temperature adjacent replicas,
/// `min(1, 0.5 * exp(upper - lower))` with the exponent clamped against overflow.
/// A difference that is not a number, such as two `-inf` likelihoods, never swaps.
pub fn swap_probability(lower: f64, upper: f64) -> f64 {
    let difference = upper - lower;
    if difference.is_nan() {
        return 0.0;
    }

    (0.5 * difference.min(MAX_EXPONENT).exp()).min(1.0)
}

/// Draws whether the states of two adjacent replicas are exchanged.
pub fn decide<R: Rng>(lower: &SwapMessage, upper: &SwapMessage, rng: &mut R) -> bool {
    let p = swap_probability(lower.scaled_log_likelihood, upper.scaled_log_likelihood);
    rng.random::<f64>() < p
}

/// The outcome of the swap phase of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRound {
    pub proposals: usize,
    pub accepted: usize,
    /// For each slot, the slot its message came from.
    pub origins: Vec<usize>,
}

/// Proposes a swap between every pair of adjacent slots holding a message.
///
/// Every decision is drawn against the messages as posted, in ascending order. A pair sharing a
/// slot with a pair already swapped this round is still proposed but never applied, so a
/// message moves at most one rung and only ever into the slot of the message it was compared
/// with. Empty slots belong to terminated replicas and their pairs are skipped.
pub fn exchange_adjacent<R: Rng>(slots: &mut [Option<SwapMessage>], rng: &mut R) -> SwapRound {
    let mut proposals = 0;
    let decisions: Vec<bool> = slots
        .windows(2)
        .map(|pair| match pair {
            [Some(lower), Some(upper)] => {
                proposals += 1;
                decide(lower, upper, rng)
            }
            _ => false,
        })
        .collect();

    let mut origins: Vec<usize> = (0..slots.len()).collect();
    let mut accepted = 0;

    for (i, _) in decisions.iter().enumerate().filter(|(_, swap)| **swap) {
        if origins[i] != i {
            continue;
        }
        slots.swap(i, i + 1);
        origins.swap(i, i + 1);
        accepted += 1;
    }

    SwapRound {
        proposals,
        accepted,
        origins,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn message(id: usize, scaled_log_likelihood: f64) -> SwapMessage {
        SwapMessage {
            params: vec![id as f32; 3],
            auxiliary: -(id as f64),
            scaled_log_likelihood,
            temperature: 1.0 + id as f64,
            iteration: 50,
        }
    }

    #[test]
    fn probability_is_half_at_equal_likelihoods() {
        assert_eq!(swap_probability(-10.0, -10.0), 0.5);
        assert_eq!(swap_probability(-10.0, 0.0), 1.0);
        assert_eq!(swap_probability(f64::NEG_INFINITY, 0.0), 1.0);
        assert_eq!(swap_probability(0.0, f64::NEG_INFINITY), 0.0);
        assert_eq!(swap_probability(f64::NAN, 0.0), 0.0);
        assert_eq!(swap_probability(f64::NEG_INFINITY, f64::NEG_INFINITY), 0.0);
    }

    #[test]
    fn a_message_moves_one_rung_per_round() {
        // both pairs are certain to accept, only the lower one is applied
        let mut slots = vec![
            Some(message(0, -300.0)),
            Some(message(1, -200.0)),
            Some(message(2, 0.0)),
        ];
        let round = exchange_adjacent(&mut slots, &mut StdRng::seed_from_u64(42));

        assert_eq!(round.proposals, 2);
        assert_eq!(round.accepted, 1);
        assert_eq!(round.origins, [1, 0, 2]);
        assert_eq!(slots[0].as_ref().unwrap(), &message(1, -200.0));
        assert_eq!(slots[1].as_ref().unwrap(), &message(0, -300.0));
        assert_eq!(slots[2].as_ref().unwrap(), &message(2, 0.0));
    }

    #[test]
    fn disjoint_pairs_both_swap() {
        let mut slots: Vec<_> = [-300.0, 0.0, -300.0, 0.0]
            .into_iter()
            .enumerate()
            .map(|(i, l)| Some(message(i, l)))
            .collect();
        let round = exchange_adjacent(&mut slots, &mut StdRng::seed_from_u64(7));

        // the middle pair practically never swaps, the outer two always do
        assert_eq!(round.proposals, 3);
        assert_eq!(round.accepted, 2);
        assert_eq!(round.origins, [1, 0, 3, 2]);
    }

    #[test]
    fn dead_replicas_are_skipped() {
        let mut slots = vec![Some(message(0, -1.0)), None, Some(message(2, -1.0))];
        let round = exchange_adjacent(&mut slots, &mut StdRng::seed_from_u64(42));

        assert_eq!(round.proposals, 0);
        assert_eq!(round.origins, [0, 1, 2]);
        assert!(slots[1].is_none());
    }

    #[test]
    fn certain_swaps_are_applied() {
        // each upper neighbour is far more likely, so every pair swaps
        let mut slots = vec![Some(message(0, -300.0)), Some(message(1, 0.0))];
        let round = exchange_adjacent(&mut slots, &mut StdRng::seed_from_u64(42));

        assert_eq!(round.proposals, 1);
        assert_eq!(round.accepted, 1);
        assert_eq!(round.origins, [1, 0]);
        assert_eq!(slots[0].as_ref().unwrap(), &message(1, 0.0));
        assert_eq!(slots[1].as_ref().unwrap(), &message(0, -300.0));
    }

    proptest! {
        #[test]
        fn probability_is_bounded(lower in proptest::num::f64::ANY, upper in proptest::num::f64::ANY) {
            let p = swap_probability(lower, upper);
            prop_assert!((0.0..=1.0).contains(&p));
        }

        #[test]
        fn swaps_permute_the_population(
            likelihoods in prop::collection::vec(-1e4f64..0.0, 1..8),
            alive in prop::collection::vec(any::<bool>(), 8),
            seed in any::<u64>(),
        ) {
            let mut slots: Vec<_> = likelihoods
                .iter()
                .enumerate()
                .map(|(i, &l)| alive[i].then(|| message(i, l)))
                .collect();
            let before = slots.clone();

            let round = exchange_adjacent(&mut slots, &mut StdRng::seed_from_u64(seed));

            prop_assert!(round.accepted <= round.proposals);
            prop_assert!(round.proposals < likelihoods.len().max(1));

            // each slot holds exactly the message of its origin, untouched
            let mut origins = round.origins.clone();
            for (slot, &origin) in slots.iter().zip(&round.origins) {
                prop_assert_eq!(slot, &before[origin]);
            }
            for (slot, &origin) in round.origins.iter().enumerate() {
                prop_assert!(slot.abs_diff(origin) <= 1);
                // a moved message took the place of the one it was compared with
                prop_assert!(origin == slot || round.origins[origin] == slot);
            }
            origins.sort_unstable();
            prop_assert_eq!(origins, (0..slots.len()).collect::<Vec<_>>());
        }

        #[test]
        fn pair_swap_exchanges_exactly_two_payloads(
            lower in -1e3f64..0.0,
            upper in -1e3f64..0.0,
            seed in any::<u64>(),
        ) {
            let a = message(0, lower);
            let b = message(1, upper);
            let mut slots = vec![Some(a.clone()), Some(b.clone())];

            let round = exchange_adjacent(&mut slots, &mut StdRng::seed_from_u64(seed));

            if round.accepted == 1 {
                prop_assert_eq!(slots, vec![Some(b), Some(a)]);
            } else {
                prop_assert_eq!(slots, vec![Some(a), Some(b)]);
            }
        }
    }
}
