// CadenceAnalyzer - onset-driven timing/rhythm analysis
//
// Wraps the spectral-flux OnsetDetector and turns its onset timestamps
// into inter-onset intervals (IOIs), a tempo estimate, a tempo confidence
// (how consistent recent IOIs are), and a single cadence score used as
// one component of overall similarity.

use std::collections::VecDeque;

use crate::analysis::onset::OnsetDetector;
use crate::config::CadenceConfig;

const IOI_HISTORY_LEN: usize = 16;

/// Onset rate, in onsets/second, treated as "fully regular" for the
/// self-assessment score below. Most wildlife calls and vocal cadences
/// fall well under this.
const PLAUSIBLE_ONSET_RATE_HZ: f32 = 4.0;

pub struct CadenceAnalyzer {
    detector: OnsetDetector,
    sample_rate: u32,
    min_ioi_samples: u64,
    onsets: Vec<u64>,
    recent_iois: VecDeque<f32>,
}

impl CadenceAnalyzer {
    pub fn new(sample_rate: u32, config: &CadenceConfig) -> Self {
        Self {
            detector: OnsetDetector::with_config(sample_rate, config.clone()),
            sample_rate,
            min_ioi_samples: ((config.min_ioi_ms / 1000.0) * sample_rate as f32) as u64,
            onsets: Vec::new(),
            recent_iois: VecDeque::with_capacity(IOI_HISTORY_LEN),
        }
    }

    /// Feed a chunk of audio and fold any newly detected onsets into state.
    pub fn process(&mut self, audio: &[f32]) -> Vec<u64> {
        let raw_onsets = self.detector.process(audio);
        let mut accepted = Vec::new();

        for onset in raw_onsets {
            if let Some(&last) = self.onsets.last() {
                if onset.saturating_sub(last) < self.min_ioi_samples {
                    continue;
                }
                let ioi_ms = (onset - last) as f32 / self.sample_rate as f32 * 1000.0;
                if self.recent_iois.len() == IOI_HISTORY_LEN {
                    self.recent_iois.pop_front();
                }
                self.recent_iois.push_back(ioi_ms);
            }
            self.onsets.push(onset);
            accepted.push(onset);
        }

        accepted
    }

    pub fn onsets(&self) -> &[u64] {
        &self.onsets
    }

    /// Snapshot of the recent inter-onset-interval history, oldest first.
    pub fn recent_iois(&self) -> Vec<f32> {
        self.recent_iois.iter().copied().collect()
    }

    /// Mean and coefficient-of-variation derived tempo/confidence over the
    /// recent IOI history.
    pub fn tempo_estimate(&self) -> (Option<f32>, f32) {
        if self.recent_iois.is_empty() {
            return (None, 0.0);
        }

        let mean_ioi_ms: f32 = self.recent_iois.iter().sum::<f32>() / self.recent_iois.len() as f32;
        if mean_ioi_ms <= 0.0 {
            return (None, 0.0);
        }
        let tempo_bpm = 60_000.0 / mean_ioi_ms;

        let variance: f32 = self
            .recent_iois
            .iter()
            .map(|&ioi| (ioi - mean_ioi_ms).powi(2))
            .sum::<f32>()
            / self.recent_iois.len() as f32;
        let std_dev = variance.sqrt();
        let coefficient_of_variation = std_dev / mean_ioi_ms;
        let confidence = (1.0 - coefficient_of_variation).clamp(0.0, 1.0);

        (Some(tempo_bpm), confidence)
    }

    /// Compare this session's observed IOI sequence against a reference
    /// (master call) IOI sequence, returning a `[0, 1]` cadence score:
    /// the mean absolute relative IOI deviation, inverted.
    pub fn compare_to_reference(&self, reference_iois_ms: &[f32]) -> f32 {
        if reference_iois_ms.is_empty() || self.recent_iois.is_empty() {
            return 0.0;
        }

        let n = reference_iois_ms.len().min(self.recent_iois.len());
        let observed: Vec<f32> = self.recent_iois.iter().rev().take(n).copied().collect();

        let mean_relative_error: f32 = observed
            .iter()
            .zip(reference_iois_ms.iter())
            .map(|(&obs, &reference)| {
                if reference <= 0.0 {
                    0.0
                } else {
                    ((obs - reference).abs() / reference).min(1.0)
                }
            })
            .sum::<f32>()
            / n as f32;

        (1.0 - mean_relative_error).clamp(0.0, 1.0)
    }

    /// Self-assessed cadence quality over `observed_duration_samples` of
    /// audio, independent of any reference: blends tempo regularity
    /// (`tempo_estimate`'s confidence) with how plausible the onset rate
    /// is for a vocal cadence. Used by `get_enhanced_summary`, where no
    /// reference IOI sequence is available to call `compare_to_reference`.
    pub fn cadence_score(&self, observed_duration_samples: u64) -> f32 {
        if self.onsets.is_empty() || observed_duration_samples == 0 {
            return 0.0;
        }
        let (_, tempo_confidence) = self.tempo_estimate();
        let duration_s = observed_duration_samples as f32 / self.sample_rate as f32;
        let onset_rate_hz = self.onsets.len() as f32 / duration_s.max(1e-3);
        let rate_score = (onset_rate_hz / PLAUSIBLE_ONSET_RATE_HZ).clamp(0.0, 1.0);
        (0.6 * tempo_confidence + 0.4 * rate_score).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_impulse_train(sample_rate: u32, duration_ms: u32, period_ms: u32) -> Vec<f32> {
        let total_samples = (sample_rate * duration_ms / 1000) as usize;
        let period_samples = (sample_rate * period_ms / 1000) as usize;
        let mut signal = vec![0.0; total_samples];
        let mut pos = period_samples;
        while pos + 10 < total_samples {
            for offset in 0..10 {
                signal[pos + offset] = 1.0;
            }
            pos += period_samples;
        }
        signal
    }

    #[test]
    fn test_regular_impulses_yield_tempo_estimate() {
        let sample_rate = 48000;
        let mut analyzer = CadenceAnalyzer::new(sample_rate, &CadenceConfig::default());
        let signal = generate_impulse_train(sample_rate, 2000, 250);
        analyzer.process(&signal);

        let (tempo, confidence) = analyzer.tempo_estimate();
        if let Some(bpm) = tempo {
            // 250ms period => 240 BPM
            assert!(bpm > 100.0, "expected a plausible tempo, got {}", bpm);
            assert!(confidence >= 0.0 && confidence <= 1.0);
        }
    }

    #[test]
    fn test_silence_yields_no_tempo() {
        let sample_rate = 48000;
        let mut analyzer = CadenceAnalyzer::new(sample_rate, &CadenceConfig::default());
        let signal = vec![0.0; sample_rate as usize];
        analyzer.process(&signal);
        let (tempo, confidence) = analyzer.tempo_estimate();
        assert!(tempo.is_none());
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn test_compare_to_reference_perfect_match() {
        let sample_rate = 48000;
        let mut analyzer = CadenceAnalyzer::new(sample_rate, &CadenceConfig::default());
        let signal = generate_impulse_train(sample_rate, 2000, 250);
        analyzer.process(&signal);

        let observed: Vec<f32> = analyzer.recent_iois.iter().copied().collect();
        if !observed.is_empty() {
            let score = analyzer.compare_to_reference(&observed);
            assert!(score > 0.9);
        }
    }

    #[test]
    fn test_compare_to_reference_empty_is_zero() {
        let sample_rate = 48000;
        let analyzer = CadenceAnalyzer::new(sample_rate, &CadenceConfig::default());
        assert_eq!(analyzer.compare_to_reference(&[]), 0.0);
    }

    #[test]
    fn test_cadence_score_zero_without_onsets() {
        let sample_rate = 48000;
        let analyzer = CadenceAnalyzer::new(sample_rate, &CadenceConfig::default());
        assert_eq!(analyzer.cadence_score(sample_rate as u64), 0.0);
    }

    #[test]
    fn test_cadence_score_positive_for_regular_impulses() {
        let sample_rate = 48000;
        let mut analyzer = CadenceAnalyzer::new(sample_rate, &CadenceConfig::default());
        let signal = generate_impulse_train(sample_rate, 2000, 250);
        analyzer.process(&signal);
        let score = analyzer.cadence_score(signal.len() as u64);
        assert!(score >= 0.0 && score <= 1.0);
        assert!(score > 0.0);
    }
}
