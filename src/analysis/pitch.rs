// PitchTracker - YIN fundamental frequency estimation
//
// Implements the YIN algorithm (de Cheveigne & Kawahara, 2002): a
// cumulative mean normalized difference function (CMNDF), absolute
// thresholding to find the first acceptable dip, parabolic interpolation
// around that dip for sub-sample precision, and an EMA over the reported
// track to smooth frame-to-frame jitter.

use crate::config::PitchConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Estimated fundamental frequency in Hz, or `None` if the frame was
    /// judged unvoiced (no CMNDF dip cleared the threshold).
    pub frequency_hz: Option<f32>,
    /// Confidence in `[0, 1]`; `1 - cmndf_value` at the selected lag.
    pub confidence: f32,
}

pub struct PitchTracker {
    sample_rate: u32,
    min_hz: f32,
    max_hz: f32,
    threshold: f32,
    smoothing_alpha: f32,
    smoothed_hz: Option<f32>,
}

impl PitchTracker {
    pub fn new(sample_rate: u32, config: &PitchConfig) -> Self {
        Self {
            sample_rate,
            min_hz: config.min_hz,
            max_hz: config.max_hz,
            threshold: config.yin_threshold,
            smoothing_alpha: config.smoothing_alpha,
            smoothed_hz: None,
        }
    }

    /// Estimate pitch for one frame of time-domain samples.
    pub fn process(&mut self, frame: &[f32]) -> PitchEstimate {
        let max_lag = (self.sample_rate as f32 / self.min_hz).ceil() as usize;
        let min_lag = (self.sample_rate as f32 / self.max_hz).floor().max(1.0) as usize;

        if frame.len() <= max_lag + 1 || max_lag <= min_lag {
            return PitchEstimate {
                frequency_hz: None,
                confidence: 0.0,
            };
        }

        let cmndf = Self::cumulative_mean_normalized_difference(frame, max_lag);

        let selected = Self::absolute_threshold(&cmndf, min_lag, self.threshold);

        match selected {
            Some(tau) => {
                let refined_tau = Self::parabolic_interpolation(&cmndf, tau);
                let freq = self.sample_rate as f32 / refined_tau;
                let confidence = (1.0 - cmndf[tau]).clamp(0.0, 1.0);

                if !(self.min_hz..=self.max_hz).contains(&freq) {
                    return PitchEstimate {
                        frequency_hz: None,
                        confidence: 0.0,
                    };
                }

                let smoothed = match self.smoothed_hz {
                    Some(prev) => {
                        self.smoothing_alpha * prev + (1.0 - self.smoothing_alpha) * freq
                    }
                    None => freq,
                };
                self.smoothed_hz = Some(smoothed);

                PitchEstimate {
                    frequency_hz: Some(smoothed),
                    confidence,
                }
            }
            None => {
                self.smoothed_hz = None;
                PitchEstimate {
                    frequency_hz: None,
                    confidence: 0.0,
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.smoothed_hz = None;
    }

    /// Difference function d(tau) = sum_{j} (x[j] - x[j+tau])^2, cumulative
    /// mean normalized per YIN step 3: d'(tau) = d(tau) / ((1/tau) sum_{j<=tau} d(j)).
    fn cumulative_mean_normalized_difference(frame: &[f32], max_lag: usize) -> Vec<f32> {
        let mut diff = vec![0.0f32; max_lag + 1];
        for tau in 1..=max_lag {
            let mut sum = 0.0;
            for j in 0..(frame.len() - tau) {
                let delta = frame[j] - frame[j + tau];
                sum += delta * delta;
            }
            diff[tau] = sum;
        }

        let mut cmndf = vec![1.0f32; max_lag + 1];
        let mut running_sum = 0.0f32;
        for tau in 1..=max_lag {
            running_sum += diff[tau];
            cmndf[tau] = if running_sum > 0.0 {
                diff[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }
        cmndf
    }

    /// YIN step 4: find the first local minimum below `threshold`,
    /// searching from `min_lag`; if none clears the threshold, accept the
    /// global minimum so voiced-but-noisy frames still get a confidence
    /// score (consumer treats it the same as unvoiced when confidence is low).
    fn absolute_threshold(cmndf: &[f32], min_lag: usize, threshold: f32) -> Option<usize> {
        let mut tau = min_lag.max(2);
        while tau < cmndf.len() - 1 {
            if cmndf[tau] < threshold {
                while tau + 1 < cmndf.len() - 1 && cmndf[tau + 1] < cmndf[tau] {
                    tau += 1;
                }
                return Some(tau);
            }
            tau += 1;
        }
        None
    }

    /// Parabolic interpolation around the selected lag for sub-sample
    /// resolution, using the two neighboring CMNDF values.
    fn parabolic_interpolation(cmndf: &[f32], tau: usize) -> f32 {
        if tau == 0 || tau + 1 >= cmndf.len() {
            return tau as f32;
        }
        let (s0, s1, s2) = (cmndf[tau - 1], cmndf[tau], cmndf[tau + 1]);
        let denom = 2.0 * (2.0 * s1 - s2 - s0);
        if denom.abs() < 1e-12 {
            tau as f32
        } else {
            tau as f32 + (s2 - s0) / denom
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> PitchConfig {
        PitchConfig::default()
    }

    fn generate_sine(sample_rate: u32, frequency: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_detects_sine_frequency() {
        let sample_rate = 16000;
        let mut tracker = PitchTracker::new(sample_rate, &default_config());
        let signal = generate_sine(sample_rate, 220.0, 2048);
        let estimate = tracker.process(&signal);

        let freq = estimate.frequency_hz.expect("expected a voiced estimate");
        assert!(
            (freq - 220.0).abs() < 5.0,
            "expected ~220 Hz, got {} Hz",
            freq
        );
        assert!(estimate.confidence > 0.5);
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let sample_rate = 16000;
        let mut tracker = PitchTracker::new(sample_rate, &default_config());
        let signal = vec![0.0; 2048];
        let estimate = tracker.process(&signal);
        assert!(estimate.frequency_hz.is_none());
    }

    #[test]
    fn test_short_frame_is_unvoiced() {
        let sample_rate = 16000;
        let mut tracker = PitchTracker::new(sample_rate, &default_config());
        let signal = generate_sine(sample_rate, 220.0, 32);
        let estimate = tracker.process(&signal);
        assert!(estimate.frequency_hz.is_none());
    }

    #[test]
    fn test_smoothing_reduces_jitter_across_frames() {
        let sample_rate = 16000;
        let mut tracker = PitchTracker::new(sample_rate, &default_config());
        let signal_a = generate_sine(sample_rate, 200.0, 2048);
        let signal_b = generate_sine(sample_rate, 260.0, 2048);

        let first = tracker.process(&signal_a).frequency_hz.unwrap();
        let second = tracker.process(&signal_b).frequency_hz.unwrap();

        // Smoothed estimate should sit between the raw 200 Hz history and
        // the new 260 Hz signal, not jump straight to 260 Hz.
        assert!(second > first);
        assert!(second < 260.0);
    }

    #[test]
    fn test_reset_clears_smoothing_state() {
        let sample_rate = 16000;
        let mut tracker = PitchTracker::new(sample_rate, &default_config());
        tracker.process(&generate_sine(sample_rate, 200.0, 2048));
        tracker.reset();
        let estimate = tracker.process(&generate_sine(sample_rate, 400.0, 2048));
        let freq = estimate.frequency_hz.unwrap();
        assert!((freq - 400.0).abs() < 10.0);
    }
}
