use crate::error::ConfigErr;

/// Ratio between consecutive temperatures of a ladder topped by an infinite temperature.
const INFINITE_LADDER_STEP: f64 = 7.0;

/// Builds a geometric temperature ladder starting at 1.
///
/// With a finite `max_temperature` the `i`-th entry is `max^(i / (n - 1))`, so the last replica
/// samples at exactly `max_temperature`. With an infinite one, consecutive finite entries grow by a
/// fixed ratio and the last replica samples the prior alone.
///
/// # Errors
/// If `max_temperature` is not above 1 while more than one replica is requested.
pub fn geometric(replicas: usize, max_temperature: f64) -> Result<Vec<f64>, ConfigErr> {
    if replicas <= 1 {
        return Ok(vec![1.0; replicas]);
    }

    if !(max_temperature > 1.0) {
        return Err(ConfigErr::NotPositive {
            name: "max_temperature - 1",
            value: max_temperature - 1.0,
        });
    }

    if max_temperature.is_infinite() {
        let mut ladder: Vec<f64> = (0..replicas - 1)
            .map(|i| INFINITE_LADDER_STEP.powi(i as i32))
            .collect();
        ladder.push(f64::INFINITY);
        return Ok(ladder);
    }

    let last = (replicas - 1) as f64;
    Ok((0..replicas)
        .map(|i| max_temperature.powf(i as f64 / last))
        .collect())
}

/// Checks that `ladder` starts at 1 and is strictly increasing.
pub fn check(ladder: &[f64]) -> Result<(), ConfigErr> {
    match ladder.first() {
        Some(&first) if first == 1.0 => {}
        first => {
            return Err(ConfigErr::InvalidLadder(format!(
                "must start at 1, starts at {first:?}"
            )));
        }
    }

    if let Some(pair) = ladder.windows(2).find(|pair| !(pair[0] < pair[1])) {
        return Err(ConfigErr::InvalidLadder(format!(
            "{} is not followed by a higher temperature ({})",
            pair[0], pair[1]
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(got: &[f64], expected: &[f64]) {
        assert_eq!(got.len(), expected.len());
        for (g, e) in got.iter().zip(expected) {
            assert!((g - e).abs() < 1e-3, "{got:?} != {expected:?}");
        }
    }

    #[test]
    fn finite_ladder_ends_at_max() {
        let ladder = geometric(4, 4.0).unwrap();

        assert_close(&ladder, &[1.0, 1.587, 2.520, 4.0]);
        check(&ladder).unwrap();
    }

    #[test]
    fn infinite_ladder_ends_at_infinity() {
        let ladder = geometric(4, f64::INFINITY).unwrap();

        assert_eq!(ladder, [1.0, 7.0, 49.0, f64::INFINITY]);
        check(&ladder).unwrap();
    }

    #[test]
    fn single_replica_is_canonical() {
        assert_eq!(geometric(1, 4.0).unwrap(), [1.0]);
        assert_eq!(geometric(1, 1.0).unwrap(), [1.0]);
    }

    #[test]
    fn flat_ladder_is_rejected() {
        assert!(geometric(3, 1.0).is_err());
        assert!(geometric(3, f64::NAN).is_err());
    }

    #[test]
    fn check_rejects_unordered_ladders() {
        assert!(check(&[]).is_err());
        assert!(check(&[2.0, 3.0]).is_err());
        assert!(check(&[1.0, 3.0, 3.0]).is_err());
        assert!(check(&[1.0, f64::INFINITY, f64::INFINITY]).is_err());
    }
}
