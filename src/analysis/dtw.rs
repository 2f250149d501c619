// DTWComparator - dynamic time warping with a Sakoe-Chiba band
//
// Aligns two MFCC sequences of possibly different lengths and returns a
// path-normalized distance: the cumulative cost of the optimal alignment
// path divided by the path's length, so scores are comparable across
// attempts of different duration.

/// Euclidean distance between two MFCC coefficient vectors.
fn frame_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

pub struct DtwComparator {
    /// Band radius as a fraction of the longer sequence's length.
    band_radius_fraction: f32,
}

impl DtwComparator {
    pub fn new(band_radius_fraction: f32) -> Self {
        Self {
            band_radius_fraction,
        }
    }

    /// Compute the path-normalized DTW distance between two MFCC sequences.
    /// Returns `None` if either sequence is empty.
    pub fn compare(&self, reference: &[Vec<f32>], query: &[Vec<f32>]) -> Option<f32> {
        if reference.is_empty() || query.is_empty() {
            return None;
        }

        let n = reference.len();
        let m = query.len();
        let band_radius = ((n.max(m) as f32) * self.band_radius_fraction)
            .ceil()
            .max(1.0) as i64;

        const INF: f32 = f32::INFINITY;
        let mut cost = vec![vec![INF; m + 1]; n + 1];
        let mut path_len = vec![vec![0u32; m + 1]; n + 1];
        cost[0][0] = 0.0;

        for i in 1..=n {
            let j_center = (i as f32 * m as f32 / n as f32).round() as i64;
            let j_lo = (j_center - band_radius).max(1) as usize;
            let j_hi = ((j_center + band_radius).min(m as i64)).max(1) as usize;

            for j in j_lo..=j_hi {
                let d = frame_distance(&reference[i - 1], &query[j - 1]);

                let candidates = [
                    (cost[i - 1][j], path_len[i - 1][j]),
                    (cost[i][j - 1], path_len[i][j - 1]),
                    (cost[i - 1][j - 1], path_len[i - 1][j - 1]),
                ];

                let (best_cost, best_len) = candidates
                    .into_iter()
                    .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
                    .unwrap();

                if best_cost.is_finite() {
                    cost[i][j] = best_cost + d;
                    path_len[i][j] = best_len + 1;
                }
            }
        }

        if !cost[n][m].is_finite() {
            return None;
        }

        Some(cost[n][m] / path_len[n][m].max(1) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(values: &[f32]) -> Vec<Vec<f32>> {
        values.iter().map(|&v| vec![v]).collect()
    }

    #[test]
    fn test_identical_sequences_have_zero_distance() {
        let comparator = DtwComparator::new(0.2);
        let s = seq(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let distance = comparator.compare(&s, &s).unwrap();
        assert!(distance < 1e-5);
    }

    #[test]
    fn test_different_sequences_have_positive_distance() {
        let comparator = DtwComparator::new(0.2);
        let a = seq(&[1.0, 1.0, 1.0, 1.0]);
        let b = seq(&[5.0, 5.0, 5.0, 5.0]);
        let distance = comparator.compare(&a, &b).unwrap();
        assert!(distance > 3.0);
    }

    #[test]
    fn test_tolerates_length_mismatch() {
        let comparator = DtwComparator::new(0.3);
        let a = seq(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = seq(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let distance = comparator.compare(&a, &b);
        assert!(distance.is_some());
        assert!(distance.unwrap() < 1.0);
    }

    #[test]
    fn test_empty_sequence_returns_none() {
        let comparator = DtwComparator::new(0.2);
        assert!(comparator.compare(&[], &seq(&[1.0])).is_none());
        assert!(comparator.compare(&seq(&[1.0]), &[]).is_none());
    }
}
