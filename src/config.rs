//! Configuration management for the analysis engine
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling tuning of front-end, per-analyzer, scoring, and grading
//! parameters without recompilation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub front_end: FrontEndConfig,
    pub vad: VadConfig,
    pub pitch: PitchConfig,
    pub harmonic: HarmonicConfig,
    pub cadence: CadenceConfig,
    pub dtw: DtwConfig,
    pub scoring: ScoringConfig,
}

/// MFCC front-end framing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontEndConfig {
    /// Analysis window size in samples.
    pub window_size: usize,
    /// Hop size between successive windows, in samples.
    pub hop_size: usize,
    /// Number of mel filterbank bands.
    pub num_mel_filters: usize,
    /// Number of retained MFCC coefficients (including c0).
    pub num_mfcc_coeffs: usize,
    /// Pre-emphasis filter coefficient, applied as x[n] - a*x[n-1].
    pub pre_emphasis_coeff: f32,
}

impl Default for FrontEndConfig {
    fn default() -> Self {
        Self {
            window_size: 400,
            hop_size: 160,
            num_mel_filters: 26,
            num_mfcc_coeffs: 13,
            pre_emphasis_coeff: 0.97,
        }
    }
}

/// Voice activity detector hysteresis parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// Frame energy (dBFS) above which a frame is a candidate for ACTIVE.
    pub activate_threshold_db: f32,
    /// Frame energy (dBFS) below which a frame is a candidate for SILENCE.
    /// Must be lower than `activate_threshold_db` to provide hysteresis.
    pub deactivate_threshold_db: f32,
    /// Consecutive candidate frames required to confirm a transition.
    pub confirm_frames: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            activate_threshold_db: -35.0,
            deactivate_threshold_db: -42.0,
            confirm_frames: 3,
        }
    }
}

/// YIN pitch tracker parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitchConfig {
    /// Minimum trackable fundamental frequency, in Hz.
    pub min_hz: f32,
    /// Maximum trackable fundamental frequency, in Hz.
    pub max_hz: f32,
    /// CMNDF absolute threshold below which the first dip is accepted.
    pub yin_threshold: f32,
    /// EMA smoothing coefficient for the reported pitch track (0..1, higher = smoother).
    pub smoothing_alpha: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            min_hz: 60.0,
            max_hz: 1500.0,
            yin_threshold: 0.15,
            smoothing_alpha: 0.3,
        }
    }
}

/// Harmonic analysis parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarmonicConfig {
    /// Number of harmonic partials considered for richness/HNR estimation.
    pub num_harmonics: usize,
    /// Bin search half-width (in spectrum bins) around each expected
    /// harmonic location, to tolerate pitch-estimate jitter.
    pub harmonic_search_width_bins: usize,
}

impl Default for HarmonicConfig {
    fn default() -> Self {
        Self {
            num_harmonics: 6,
            harmonic_search_width_bins: 2,
        }
    }
}

/// Cadence/onset detection parameters (adapted from the onset-detection
/// configuration used by percussive transient detection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Threshold offset added to the median for adaptive thresholding.
    pub threshold_offset: f32,
    /// FFT window size in samples for spectral-flux computation.
    pub window_size: usize,
    /// Hop size for overlapping flux windows.
    pub hop_size: usize,
    /// Half-size of the median filter window.
    pub median_window_halfsize: usize,
    /// Minimum inter-onset interval, in milliseconds; closer onsets are merged.
    pub min_ioi_ms: f32,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            threshold_offset: 0.15,
            window_size: 256,
            hop_size: 64,
            median_window_halfsize: 50,
            min_ioi_ms: 80.0,
        }
    }
}

/// Dynamic time warping parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtwConfig {
    /// Sakoe-Chiba band radius as a fraction of the longer sequence length.
    pub band_radius_fraction: f32,
    /// Realtime path only: the comparison window is truncated to the last
    /// this-many MFCC frames before each DTW call, bounding per-chunk cost
    /// to a fixed size regardless of session length. Finalize's refined DTW
    /// runs over the already-bounded selected segment and ignores this.
    pub dtw_rolling_window_frames: usize,
}

impl Default for DtwConfig {
    fn default() -> Self {
        Self {
            band_radius_fraction: 0.1,
            dtw_rolling_window_frames: 200,
        }
    }
}

/// Similarity scoring weights and readiness gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weight_mfcc: f32,
    pub weight_pitch: f32,
    pub weight_harmonic: f32,
    pub weight_cadence: f32,
    pub weight_loudness: f32,
    /// Minimum amount of audio, in milliseconds, that must have been
    /// observed before a realtime score is reported. Converted to a frame
    /// count at session construction via
    /// `ceil(min_audio_ms * sample_rate / 1000 / hop_samples)`.
    pub min_audio_ms_for_readiness: f32,
    /// Number of chunks a component may go unrefreshed before it is
    /// treated as stale and redistributed away from in scoring.
    pub staleness_chunks: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weight_mfcc: 0.40,
            weight_pitch: 0.20,
            weight_harmonic: 0.15,
            weight_cadence: 0.15,
            weight_loudness: 0.10,
            min_audio_ms_for_readiness: 300.0,
            staleness_chunks: 5,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            front_end: FrontEndConfig::default(),
            vad: VadConfig::default(),
            pitch: PitchConfig::default(),
            harmonic: HarmonicConfig::default(),
            cadence: CadenceConfig::default(),
            dtw: DtwConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a JSON file, falling back to defaults (with
    /// a warning) if the file is missing or malformed.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded session configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Validate internal consistency, returning a human-readable error on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.front_end.hop_size == 0 || self.front_end.hop_size > self.front_end.window_size {
            return Err(format!(
                "hop_size ({}) must be nonzero and <= window_size ({})",
                self.front_end.hop_size, self.front_end.window_size
            ));
        }
        if self.front_end.num_mfcc_coeffs == 0
            || self.front_end.num_mfcc_coeffs > self.front_end.num_mel_filters
        {
            return Err(format!(
                "num_mfcc_coeffs ({}) must be nonzero and <= num_mel_filters ({})",
                self.front_end.num_mfcc_coeffs, self.front_end.num_mel_filters
            ));
        }
        if self.vad.deactivate_threshold_db >= self.vad.activate_threshold_db {
            return Err("vad.deactivate_threshold_db must be below activate_threshold_db".into());
        }
        if self.pitch.min_hz <= 0.0 || self.pitch.max_hz <= self.pitch.min_hz {
            return Err("pitch.min_hz must be positive and less than pitch.max_hz".into());
        }
        if self.dtw.dtw_rolling_window_frames == 0 {
            return Err("dtw.dtw_rolling_window_frames must be nonzero".into());
        }
        if self.scoring.min_audio_ms_for_readiness <= 0.0 {
            return Err("scoring.min_audio_ms_for_readiness must be positive".into());
        }
        let weight_sum = self.scoring.weight_mfcc
            + self.scoring.weight_pitch
            + self.scoring.weight_harmonic
            + self.scoring.weight_cadence
            + self.scoring.weight_loudness;
        if (weight_sum - 1.0).abs() > 0.01 {
            return Err(format!(
                "scoring weights must sum to ~1.0, got {}",
                weight_sum
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = SessionConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.front_end.window_size, config.front_end.window_size);
        assert_eq!(parsed.scoring.weight_mfcc, config.scoring.weight_mfcc);
    }

    #[test]
    fn test_validate_rejects_bad_hop_size() {
        let mut config = SessionConfig::default();
        config.front_end.hop_size = config.front_end.window_size + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unsorted_vad_thresholds() {
        let mut config = SessionConfig::default();
        config.vad.deactivate_threshold_db = config.vad.activate_threshold_db + 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_weight_sum() {
        let mut config = SessionConfig::default();
        config.scoring.weight_mfcc = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_dtw_window() {
        let mut config = SessionConfig::default();
        config.dtw.dtw_rolling_window_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nonpositive_readiness_ms() {
        let mut config = SessionConfig::default();
        config.scoring.min_audio_ms_for_readiness = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_file_falls_back_to_default() {
        let config = SessionConfig::load_from_file("/nonexistent/path/config.json");
        assert_eq!(config.front_end.window_size, FrontEndConfig::default().window_size);
    }
}
