// Mel module - mel filterbank construction and the DCT-II used to
// decorrelate log mel-energies into cepstral coefficients.

/// Convert a frequency in Hz to the mel scale (Slaney/O'Shaughnessy formula).
fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Convert a mel-scale value back to Hz.
fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank applied to a linear-frequency magnitude/power
/// spectrum, producing a fixed number of mel-band energies per frame.
pub struct MelFilterbank {
    /// filters[b] holds (start_bin, weights) where weights[i] applies to
    /// spectrum bin start_bin + i.
    filters: Vec<(usize, Vec<f32>)>,
}

impl MelFilterbank {
    /// Build a filterbank of `num_filters` triangular bands spanning
    /// `[low_hz, high_hz]`, for a magnitude spectrum of `num_bins` bins
    /// (i.e. fft_size / 2 + 1) produced from audio at `sample_rate`.
    pub fn new(num_filters: usize, num_bins: usize, sample_rate: u32, low_hz: f32, high_hz: f32) -> Self {
        let mel_low = hz_to_mel(low_hz);
        let mel_high = hz_to_mel(high_hz);

        // num_filters + 2 boundary points define num_filters triangular filters
        let mel_points: Vec<f32> = (0..=num_filters + 1)
            .map(|i| mel_low + (mel_high - mel_low) * i as f32 / (num_filters + 1) as f32)
            .collect();
        let hz_points: Vec<f32> = mel_points.iter().map(|&m| mel_to_hz(m)).collect();

        let fft_size = (num_bins - 1) * 2;
        let bin_points: Vec<usize> = hz_points
            .iter()
            .map(|&hz| {
                let bin = (hz * fft_size as f32 / sample_rate as f32).floor() as i64;
                bin.clamp(0, num_bins as i64 - 1) as usize
            })
            .collect();

        let mut filters = Vec::with_capacity(num_filters);
        for m in 1..=num_filters {
            let left = bin_points[m - 1];
            let center = bin_points[m];
            let right = bin_points[m + 1];

            let start = left;
            let end = right.max(left);
            let mut weights = Vec::with_capacity(end - start + 1);
            for bin in start..=end {
                let w = if bin < center {
                    if center > left {
                        (bin - left) as f32 / (center - left) as f32
                    } else {
                        1.0
                    }
                } else if right > center {
                    (right - bin) as f32 / (right - center) as f32
                } else {
                    1.0
                };
                weights.push(w.max(0.0));
            }
            filters.push((start, weights));
        }

        Self { filters }
    }

    pub fn num_filters(&self) -> usize {
        self.filters.len()
    }

    /// Apply the filterbank to a magnitude spectrum, returning one energy
    /// value per band (power, not log-compressed).
    pub fn apply(&self, magnitude_spectrum: &[f32]) -> Vec<f32> {
        self.filters
            .iter()
            .map(|(start, weights)| {
                weights
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &w)| {
                        magnitude_spectrum.get(start + i).map(|&mag| w * mag * mag)
                    })
                    .sum()
            })
            .collect()
    }
}

/// Compute the first `num_coeffs` DCT-II coefficients of `log_energies`,
/// the standard decorrelation step between log mel-energies and MFCCs.
pub fn dct_ii(log_energies: &[f32], num_coeffs: usize) -> Vec<f32> {
    let n = log_energies.len();
    if n == 0 {
        return vec![0.0; num_coeffs];
    }

    (0..num_coeffs)
        .map(|k| {
            let sum: f32 = log_energies
                .iter()
                .enumerate()
                .map(|(i, &x)| {
                    x * (std::f32::consts::PI * k as f32 * (2.0 * i as f32 + 1.0) / (2.0 * n as f32))
                        .cos()
                })
                .sum();
            sum * 2.0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mel_roundtrip() {
        let hz = 1000.0;
        let mel = hz_to_mel(hz);
        let back = mel_to_hz(mel);
        assert!((back - hz).abs() < 1.0);
    }

    #[test]
    fn test_filterbank_shape() {
        let fb = MelFilterbank::new(26, 513, 16000, 0.0, 8000.0);
        assert_eq!(fb.num_filters(), 26);

        let spectrum = vec![1.0; 513];
        let energies = fb.apply(&spectrum);
        assert_eq!(energies.len(), 26);
        assert!(energies.iter().all(|&e| e >= 0.0));
    }

    #[test]
    fn test_filterbank_responds_to_band_energy() {
        let fb = MelFilterbank::new(10, 257, 16000, 0.0, 8000.0);
        let mut spectrum = vec![0.0; 257];
        // Put all energy in a low bin; low-frequency filters should fire,
        // high-frequency filters should stay near zero.
        spectrum[2] = 10.0;
        let energies = fb.apply(&spectrum);
        assert!(energies[0] > 0.0);
        assert!(energies[9] < 1e-6);
    }

    #[test]
    fn test_dct_first_coefficient_is_mean_like() {
        let energies = vec![1.0, 1.0, 1.0, 1.0];
        let coeffs = dct_ii(&energies, 4);
        // c0 should be proportional to the sum of log-energies
        assert!(coeffs[0] > 0.0);
    }

    #[test]
    fn test_dct_empty_input() {
        let coeffs = dct_ii(&[], 13);
        assert_eq!(coeffs.len(), 13);
        assert!(coeffs.iter().all(|&c| c == 0.0));
    }
}
