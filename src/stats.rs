/// Compute the arithmetic mean (NaN when empty).
pub fn compute_mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::NAN;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

/// Compute the exponentially weighted moving average.
///
/// Seeded with the first value: `ewma[0] = vals[0]` and
/// `ewma[i] = alpha * vals[i] + (1 - alpha) * ewma[i - 1]`.
pub fn compute_ewma(vals: &[f64], alpha: f64) -> Vec<f64> {
    let mut ewma = Vec::with_capacity(vals.len());
    for &val in vals {
        let next = match ewma.last() {
            None => val,
            Some(&prev) => alpha * val + (1.0 - alpha) * prev,
        };
        ewma.push(next);
    }
    ewma
}

/// Find the index and value of the maximum, keeping the first one on ties.
pub fn find_peak(vals: &[f64]) -> Option<(usize, f64)> {
    let mut peak: Option<(usize, f64)> = None;
    for (idx, &val) in vals.iter().enumerate() {
        if peak.is_none_or(|(_, max)| val > max) {
            peak = Some((idx, val));
        }
    }
    peak
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_values() {
        assert_eq!(compute_mean(&[10.0, 20.0, 10.0, 40.0, 10.0]), 18.0);
        assert!(compute_mean(&[]).is_nan());
    }

    #[test]
    fn ewma_is_seeded_with_first_value() {
        assert_eq!(compute_ewma(&[7.0], 0.3), vec![7.0]);
        assert!(compute_ewma(&[], 0.3).is_empty());
    }

    #[test]
    fn ewma_with_full_weight_tracks_input() {
        let vals = [3.0, 1.0, 4.0, 1.0, 5.0];
        assert_eq!(compute_ewma(&vals, 1.0), vals.to_vec());
    }

    #[test]
    fn ewma_is_damped_between_input_and_previous() {
        let vals = [5.0, 50.0, 0.0, 12.0, 12.0, 80.0, 3.0];
        let ewma = compute_ewma(&vals, 0.3);
        assert_eq!(ewma.len(), vals.len());
        for i in 1..vals.len() {
            let lo = vals[i].min(ewma[i - 1]);
            let hi = vals[i].max(ewma[i - 1]);
            assert!(lo <= ewma[i] && ewma[i] <= hi);
        }
    }

    #[test]
    fn peak_keeps_first_occurrence() {
        assert_eq!(find_peak(&[1.0, 9.0, 3.0, 9.0]), Some((1, 9.0)));
        assert_eq!(find_peak(&[2.0]), Some((0, 2.0)));
        assert_eq!(find_peak(&[]), None);
    }
}
