use rand::Rng;

/// Decides per iteration whether a replica trusts the surrogate instead of the true likelihood.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurrogateGate {
    warmup: usize,
    probability: f64,
}

impl SurrogateGate {
    pub fn new(warmup: usize, probability: f64) -> Self {
        Self {
            warmup,
            probability,
        }
    }

    pub fn enabled(&self) -> bool {
        self.probability > 0.0
    }

    /// Returns `iteration > warmup && random() < probability`.
    ///
    /// No number is drawn unless the surrogate is enabled, past its warm-up and has a full trailing
    /// window to blend with, so a disabled gate leaves the random stream untouched.
    pub fn use_surrogate<R: Rng>(&self, iteration: usize, window_full: bool, rng: &mut R) -> bool {
        if !self.enabled() || iteration <= self.warmup || !window_full {
            return false;
        }

        rng.random::<f64>() < self.probability
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn seeded_rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn disabled_gate_never_draws() {
        let gate = SurrogateGate::new(0, 0.0);
        let mut rng = seeded_rng();

        for iteration in 0..100 {
            assert!(!gate.use_surrogate(iteration, true, &mut rng));
        }
        assert_eq!(rng.random::<u64>(), seeded_rng().random::<u64>());
    }

    #[test]
    fn closed_during_warmup() {
        let gate = SurrogateGate::new(50, 1.0);
        let mut rng = seeded_rng();

        assert!(!gate.use_surrogate(50, true, &mut rng));
        assert!(gate.use_surrogate(51, true, &mut rng));
    }

    #[test]
    fn closed_until_window_is_full() {
        let gate = SurrogateGate::new(0, 1.0);
        assert!(!gate.use_surrogate(10, false, &mut seeded_rng()));
    }

    #[test]
    fn opens_at_about_the_configured_rate() {
        let gate = SurrogateGate::new(0, 0.3);
        let mut rng = seeded_rng();

        let opened = (1..=10_000)
            .filter(|&i| gate.use_surrogate(i, true, &mut rng))
            .count();
        assert!((2700..3300).contains(&opened), "{opened}");
    }
}
