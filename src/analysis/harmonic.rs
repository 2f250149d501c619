// HarmonicAnalyzer - harmonic richness, harmonic-to-noise ratio, and
// spectral centroid, computed from a frame's magnitude spectrum plus the
// fundamental frequency estimate supplied by the pitch tracker.
//
// Reuses the spectral-centroid computation from the MFCC front-end's
// spectral feature module rather than re-deriving it.

use crate::analysis::features::SpectralFeatures;
use crate::config::HarmonicConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicFrame {
    /// Spectral centroid in Hz.
    pub spectral_centroid_hz: f32,
    /// Sum of harmonic-bin energies relative to total spectral energy,
    /// in `[0, 1]`; 0 when unvoiced.
    pub harmonic_richness: f32,
    /// Harmonic-to-noise ratio in dB; `None` when unvoiced.
    pub hnr_db: Option<f32>,
    /// Confidence that this frame's spectrum is genuinely harmonic,
    /// combining pitch confidence and richness.
    pub harmonic_confidence: f32,
}

pub struct HarmonicAnalyzer {
    sample_rate: u32,
    fft_size: usize,
    num_harmonics: usize,
    search_width_bins: usize,
    spectral: SpectralFeatures,
}

impl HarmonicAnalyzer {
    pub fn new(sample_rate: u32, fft_size: usize, config: &HarmonicConfig) -> Self {
        Self {
            sample_rate,
            fft_size,
            num_harmonics: config.num_harmonics.max(1),
            search_width_bins: config.harmonic_search_width_bins,
            spectral: SpectralFeatures::new(sample_rate, fft_size),
        }
    }

    /// Analyze one frame's magnitude spectrum. `pitch_hz`/`pitch_confidence`
    /// come from the pitch tracker's estimate for the same frame; pass
    /// `None` when the frame was judged unvoiced.
    pub fn process(
        &self,
        magnitude_spectrum: &[f32],
        pitch_hz: Option<f32>,
        pitch_confidence: f32,
    ) -> HarmonicFrame {
        let centroid = self.spectral.compute_centroid(magnitude_spectrum);

        let (richness, hnr_db) = match pitch_hz {
            Some(f0) if f0 > 0.0 => self.harmonic_energy_ratio(magnitude_spectrum, f0),
            _ => (0.0, None),
        };

        let harmonic_confidence = if pitch_hz.is_some() {
            (pitch_confidence * richness).clamp(0.0, 1.0)
        } else {
            0.0
        };

        HarmonicFrame {
            spectral_centroid_hz: centroid,
            harmonic_richness: richness,
            hnr_db,
            harmonic_confidence,
        }
    }

    /// Sum energy in bins near each of the first `num_harmonics` partials
    /// of `f0`, compare to total spectral energy for richness, and to
    /// non-harmonic ("noise") energy for HNR.
    fn harmonic_energy_ratio(&self, spectrum: &[f32], f0: f32) -> (f32, Option<f32>) {
        let bin_width = self.sample_rate as f32 / self.fft_size as f32;
        let total_energy: f32 = spectrum.iter().map(|&m| m * m).sum();
        if total_energy < 1e-12 {
            return (0.0, None);
        }

        let mut harmonic_energy = 0.0f32;
        for h in 1..=self.num_harmonics {
            let center_bin = ((h as f32 * f0) / bin_width).round() as i64;
            let lo = (center_bin - self.search_width_bins as i64).max(0) as usize;
            let hi = ((center_bin + self.search_width_bins as i64) as usize).min(spectrum.len() - 1);
            if lo > hi {
                continue;
            }
            harmonic_energy += spectrum[lo..=hi].iter().map(|&m| m * m).sum::<f32>();
        }

        let richness = (harmonic_energy / total_energy).clamp(0.0, 1.0);
        let noise_energy = (total_energy - harmonic_energy).max(1e-12);
        let hnr_db = 10.0 * (harmonic_energy.max(1e-12) / noise_energy).log10();

        (richness, Some(hnr_db))
    }
}
