//! Session - per-attempt analyzer state and the chunk-processing loop.

use std::sync::Arc;
use std::time::Instant;

use crate::analysis::cadence::CadenceAnalyzer;
use crate::analysis::features::{FeatureFrontEnd, MfccFrame};
use crate::analysis::harmonic::{HarmonicAnalyzer, HarmonicFrame};
use crate::analysis::loudness::{LoudnessFrame, LoudnessMeter};
use crate::analysis::pitch::{PitchEstimate, PitchTracker};
use crate::analysis::vad::VoiceActivityDetector;
use crate::api::types::{ComponentContributions, EnhancedSummary, FinalSummary, OverlayExport, RealtimeState};
use crate::config::SessionConfig;
use crate::engine::master::MasterCall;
use crate::error::EngineError;
use crate::finalize;
use crate::grading::GradeTable;
use crate::scoring::{ComponentInput, SimilarityScorer};

/// Relative tolerance used to turn an absolute pitch/loudness delta from a
/// master's reference value into a `[0, 1]` similarity.
const PITCH_TOLERANCE_FRACTION: f32 = 0.5;
const LOUDNESS_TOLERANCE_DB: f32 = 12.0;

pub struct Session {
    id: u64,
    config: SessionConfig,
    sample_rate: u32,

    front_end: FeatureFrontEnd,
    vad: VoiceActivityDetector,
    loudness: LoudnessMeter,
    pitch: PitchTracker,
    harmonic: HarmonicAnalyzer,
    cadence: CadenceAnalyzer,
    scorer: SimilarityScorer,

    master: Option<Arc<MasterCall>>,

    raw_samples: Vec<f32>,
    mfcc_frames: Vec<MfccFrame>,
    pitch_track: Vec<PitchEstimate>,
    harmonic_track: Vec<HarmonicFrame>,
    loudness_track: Vec<LoudnessFrame>,
    vad_track: Vec<bool>,

    /// Off by default; pitch/harmonic/cadence analysis only runs per-chunk
    /// once a caller opts in via `set_enhanced_analyzers_enabled`.
    enhanced_enabled: bool,

    samples_processed: u64,
    finalized: bool,
    cached_final: Option<FinalSummary>,
    last_score: Option<(f32, ComponentContributions)>,
    created_at: Instant,
}

/// `ceil(min_audio_ms * sample_rate / 1000 / hop_samples)`.
fn derive_min_frames_required(min_audio_ms: f32, sample_rate: u32, hop_samples: usize) -> usize {
    let frames = (min_audio_ms * sample_rate as f32) / 1000.0 / hop_samples.max(1) as f32;
    frames.ceil().max(0.0) as usize
}

impl Session {
    pub fn new(id: u64, sample_rate: u32, config: SessionConfig) -> Result<Self, EngineError> {
        config
            .validate()
            .map_err(|details| EngineError::ConfigurationError { details })?;

        let fft_size = config.front_end.window_size.next_power_of_two();
        let min_frames_required = derive_min_frames_required(
            config.scoring.min_audio_ms_for_readiness,
            sample_rate,
            config.front_end.hop_size,
        );

        Ok(Self {
            id,
            front_end: FeatureFrontEnd::new(
                sample_rate,
                config.front_end.window_size,
                config.front_end.hop_size,
                config.front_end.num_mel_filters,
                config.front_end.num_mfcc_coeffs,
                config.front_end.pre_emphasis_coeff,
            ),
            vad: VoiceActivityDetector::new(&config.vad),
            loudness: LoudnessMeter::new(),
            pitch: PitchTracker::new(sample_rate, &config.pitch),
            harmonic: HarmonicAnalyzer::new(sample_rate, fft_size, &config.harmonic),
            cadence: CadenceAnalyzer::new(sample_rate, &config.cadence),
            scorer: SimilarityScorer::new(config.scoring.clone(), min_frames_required),
            master: None,
            raw_samples: Vec::new(),
            mfcc_frames: Vec::new(),
            pitch_track: Vec::new(),
            harmonic_track: Vec::new(),
            loudness_track: Vec::new(),
            vad_track: Vec::new(),
            enhanced_enabled: false,
            samples_processed: 0,
            finalized: false,
            cached_final: None,
            last_score: None,
            created_at: Instant::now(),
            sample_rate,
            config,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bind_master(&mut self, master: Arc<MasterCall>) {
        self.master = Some(master);
        self.scorer.set_master_loaded(true);
    }

    pub fn set_enhanced_analyzers_enabled(&mut self, enabled: bool) {
        self.enhanced_enabled = enabled;
    }

    pub fn process_chunk(&mut self, samples: &[f32]) -> Result<EnhancedSummary, EngineError> {
        if self.finalized {
            return Err(EngineError::Finalized);
        }
        if samples.is_empty() {
            return Err(EngineError::BadFormat {
                details: "chunk was empty".to_string(),
            });
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(EngineError::BadFormat {
                details: "chunk contained non-finite samples".to_string(),
            });
        }

        let window_size = self.config.front_end.window_size;
        self.raw_samples.extend_from_slice(samples);
        self.samples_processed += samples.len() as u64;

        let frames = self.front_end.push(samples);
        for frame in frames {
            let start = frame.start_sample as usize;
            let window = if start + window_size <= self.raw_samples.len() {
                &self.raw_samples[start..start + window_size]
            } else {
                &self.raw_samples[start.min(self.raw_samples.len())..]
            };

            let loudness_frame = self.loudness.process(window);
            self.vad.process(loudness_frame.rms_dbfs);
            let is_active = self.vad.is_active();

            let (pitch_estimate, harmonic_frame) = if self.enhanced_enabled {
                let started = Instant::now();
                let pitch_estimate = self.pitch.process(window);
                let harmonic_frame = self.harmonic.process(
                    &frame.magnitude_spectrum,
                    pitch_estimate.frequency_hz,
                    pitch_estimate.confidence,
                );
                tracing::debug!(
                    session_id = self.id,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "pitch+harmonic analysis for chunk frame"
                );
                (pitch_estimate, harmonic_frame)
            } else {
                (
                    PitchEstimate {
                        frequency_hz: None,
                        confidence: 0.0,
                    },
                    HarmonicFrame {
                        spectral_centroid_hz: 0.0,
                        harmonic_richness: 0.0,
                        hnr_db: None,
                        harmonic_confidence: 0.0,
                    },
                )
            };

            if is_active {
                self.scorer.note_active_frame();
            }

            self.pitch_track.push(pitch_estimate);
            self.harmonic_track.push(harmonic_frame);
            self.loudness_track.push(loudness_frame);
            self.vad_track.push(is_active);
            self.mfcc_frames.push(frame);
        }

        if self.enhanced_enabled {
            let started = Instant::now();
            self.cadence.process(samples);
            tracing::debug!(
                session_id = self.id,
                elapsed_us = started.elapsed().as_micros() as u64,
                "cadence analysis for chunk"
            );
        }

        if let Some(master) = self.master.clone() {
            self.update_realtime_score(&master);
        }

        Ok(self.build_enhanced_summary())
    }

    fn build_enhanced_summary(&self) -> EnhancedSummary {
        let last_pitch = self.pitch_track.last();
        let last_harmonic = self.harmonic_track.last();
        let last_loudness = self.loudness_track.last();
        let cadence_score = self.cadence.cadence_score(self.samples_processed);
        let (_, tempo_confidence) = self.cadence.tempo_estimate();

        let rms_dbfs = last_loudness
            .map(|l| l.rms_dbfs)
            .unwrap_or_else(|| self.loudness.mean_rms_dbfs());
        let peak_dbfs = last_loudness.map(|l| l.peak_dbfs).unwrap_or(self.loudness.peak_dbfs());

        let (loudness_deviation, normalization_scalar) = match &self.master {
            Some(master) => (
                (rms_dbfs - master.mean_rms_dbfs).abs(),
                self.loudness.normalization_gain(master.mean_rms_dbfs),
            ),
            None => (0.0, 1.0),
        };

        EnhancedSummary {
            pitch_hz: last_pitch.and_then(|p| p.frequency_hz),
            pitch_confidence: last_pitch.map(|p| p.confidence).unwrap_or(0.0),
            harmonicity_score: last_harmonic.map(|h| h.harmonic_richness).unwrap_or(0.0),
            harmonic_confidence: last_harmonic.map(|h| h.harmonic_confidence).unwrap_or(0.0),
            cadence_score,
            tempo_confidence,
            rms_dbfs,
            peak_dbfs,
            loudness_deviation,
            normalization_scalar,
            last_update_ms: self.created_at.elapsed().as_millis() as u64,
            frames_observed: self.mfcc_frames.len() as u64,
        }
    }

    /// Point-in-time pull of every enhanced analyzer's current state,
    /// independent of `process_chunk`'s own return value.
    pub fn enhanced_summary(&self) -> EnhancedSummary {
        self.build_enhanced_summary()
    }

    /// Last computed realtime similarity score, or `EngineError::NotReady`
    /// if the session hasn't yet satisfied the reliability predicate.
    pub fn similarity_score(&self) -> Result<f32, EngineError> {
        if !self.scorer.is_ready() {
            return Err(EngineError::NotReady);
        }
        self.last_score
            .map(|(score, _)| score)
            .ok_or(EngineError::NotReady)
    }

    fn update_realtime_score(&mut self, master: &MasterCall) {
        if !self.scorer.is_ready() {
            return;
        }

        let dtw_window = self.config.dtw.dtw_rolling_window_frames;
        let mfcc_vectors: Vec<Vec<f32>> = self
            .mfcc_frames
            .iter()
            .rev()
            .take(dtw_window)
            .rev()
            .map(|f| f.mfcc.clone())
            .collect();
        let dtw = crate::analysis::dtw::DtwComparator::new(self.config.dtw.band_radius_fraction);
        let mfcc_similarity = dtw
            .compare(&master.mfcc_frames, &mfcc_vectors)
            .map(|distance| 1.0 / (1.0 + distance));

        let voiced_pitches: Vec<f32> = self
            .pitch_track
            .iter()
            .filter_map(|p| p.frequency_hz)
            .collect();
        let pitch_similarity = if !voiced_pitches.is_empty() && master.mean_pitch_hz > 0.0 {
            let mean_pitch = voiced_pitches.iter().sum::<f32>() / voiced_pitches.len() as f32;
            Some(relative_similarity(
                mean_pitch,
                master.mean_pitch_hz,
                master.mean_pitch_hz * PITCH_TOLERANCE_FRACTION,
            ))
        } else {
            None
        };

        let richness_values: Vec<f32> = self
            .harmonic_track
            .iter()
            .filter(|h| h.harmonic_confidence > 0.0)
            .map(|h| h.harmonic_richness)
            .collect();
        let harmonic_similarity = if !richness_values.is_empty() {
            let mean_richness = richness_values.iter().sum::<f32>() / richness_values.len() as f32;
            Some(relative_similarity(mean_richness, master.mean_harmonic_richness, 0.5))
        } else {
            None
        };

        let cadence_similarity = if !master.reference_iois_ms.is_empty() {
            Some(self.cadence.compare_to_reference(&master.reference_iois_ms))
        } else {
            None
        };

        let loudness_similarity = Some(relative_similarity(
            self.loudness.mean_rms_dbfs(),
            master.mean_rms_dbfs,
            LOUDNESS_TOLERANCE_DB,
        ));

        let result = self.scorer.score(ComponentInput {
            mfcc: mfcc_similarity,
            pitch: pitch_similarity,
            harmonic: harmonic_similarity,
            cadence: cadence_similarity,
            loudness: loudness_similarity,
        });

        self.last_score = Some((result.score, result.contributions));
    }

    pub fn realtime_state(&self) -> RealtimeState {
        let (score, contributions) = match self.last_score {
            Some((s, c)) => (Some(s), Some(c)),
            None => (None, None),
        };

        RealtimeState {
            is_ready: self.scorer.is_ready(),
            is_voice_active: self.vad.is_active(),
            active_frame_count: self.vad_track.iter().filter(|&&a| a).count(),
            current_pitch_hz: self.pitch_track.last().and_then(|p| p.frequency_hz),
            current_rms_dbfs: self.loudness_track.last().map(|l| l.rms_dbfs).unwrap_or(self.loudness.mean_rms_dbfs()),
            provisional_score: score,
            provisional_contributions: contributions,
        }
    }

    pub fn finalize(
        &mut self,
        grade_table: &GradeTable,
    ) -> Result<FinalSummary, EngineError> {
        if let Some(cached) = &self.cached_final {
            return Ok(cached.clone());
        }

        let master = self
            .master
            .clone()
            .ok_or(EngineError::NoMaster)?;

        let summary = finalize::finalize_session(
            &self.raw_samples,
            &self.mfcc_frames,
            &self.vad_track,
            self.sample_rate,
            &self.config,
            &master,
            grade_table,
            self.last_score.map(|(score, _)| score),
        )?;

        self.finalized = true;
        self.cached_final = Some(summary.clone());
        Ok(summary)
    }

    /// Decimate the master's and this session's own attempt audio into
    /// peak traces suitable for overlay rendering, aligned at the start of
    /// the selected active segment once `finalize` has run (or at sample 0
    /// otherwise).
    pub fn export_overlay(&self, decimation_step: usize) -> Result<OverlayExport, EngineError> {
        let master = self.master.as_ref().ok_or(EngineError::NoMaster)?;
        let step_samples = decimation_step.max(1);

        let alignment_offset_ms = match &self.cached_final {
            Some(summary) => {
                summary.segment_start_sample as f32 / self.sample_rate as f32 * 1000.0
            }
            None => 0.0,
        };

        Ok(OverlayExport {
            master_peaks: decimate_peaks(&master.samples, step_samples),
            user_peaks: decimate_peaks(&self.raw_samples, step_samples),
            step_samples,
            alignment_offset_ms,
        })
    }

    pub fn reset(&mut self) {
        let sample_rate = self.sample_rate;
        let config = self.config.clone();
        if let Ok(fresh) = Session::new(self.id, sample_rate, config) {
            let master = self.master.clone();
            let had_master = master.is_some();
            *self = fresh;
            self.master = master;
            self.scorer.set_master_loaded(had_master);
        }
    }
}

fn relative_similarity(value: f32, reference: f32, tolerance: f32) -> f32 {
    if tolerance <= 0.0 {
        return if (value - reference).abs() < 1e-6 { 1.0 } else { 0.0 };
    }
    (1.0 - (value - reference).abs() / tolerance).clamp(0.0, 1.0)
}

/// Collapse `samples` into one peak (max absolute value) per
/// `step_samples`-sized bucket.
fn decimate_peaks(samples: &[f32], step_samples: usize) -> Vec<f32> {
    samples
        .chunks(step_samples.max(1))
        .map(|chunk| chunk.iter().fold(0.0f32, |acc, &s| acc.max(s.abs())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_rejects_invalid_config() {
        let mut config = SessionConfig::default();
        config.front_end.hop_size = config.front_end.window_size + 1;
        let result = Session::new(1, 16000, config);
        assert!(matches!(result, Err(EngineError::ConfigurationError { .. })));
    }

    #[test]
    fn test_process_chunk_rejects_empty() {
        let mut session = Session::new(1, 16000, SessionConfig::default()).unwrap();
        let result = session.process_chunk(&[]);
        assert!(matches!(result, Err(EngineError::BadFormat { .. })));
    }

    #[test]
    fn test_process_chunk_rejects_non_finite() {
        let mut session = Session::new(1, 16000, SessionConfig::default()).unwrap();
        let result = session.process_chunk(&[0.0, f32::NAN]);
        assert!(matches!(result, Err(EngineError::BadFormat { .. })));
    }

    #[test]
    fn test_process_chunk_after_finalize_errors() {
        let mut session = Session::new(1, 16000, SessionConfig::default()).unwrap();
        let samples = vec![0.1; 16000];
        session.process_chunk(&samples).unwrap();
        // Manually mark finalized to test the guard without a bound master.
        session.finalized = true;
        let result = session.process_chunk(&samples);
        assert!(matches!(result, Err(EngineError::Finalized)));
    }

    #[test]
    fn test_finalize_without_master_errors() {
        let mut session = Session::new(1, 16000, SessionConfig::default()).unwrap();
        session.process_chunk(&vec![0.1; 16000]).unwrap();
        let grade_table = GradeTable::default();
        let result = session.finalize(&grade_table);
        assert!(matches!(result, Err(EngineError::NoMaster)));
    }

    #[test]
    fn test_similarity_score_not_ready_before_master_bound() {
        let mut session = Session::new(1, 16000, SessionConfig::default()).unwrap();
        session.process_chunk(&vec![0.1; 16000]).unwrap();
        assert!(matches!(session.similarity_score(), Err(EngineError::NotReady)));
    }

    #[test]
    fn test_export_overlay_requires_master() {
        let session = Session::new(1, 16000, SessionConfig::default()).unwrap();
        assert!(matches!(session.export_overlay(160), Err(EngineError::NoMaster)));
    }

    #[test]
    fn test_enhanced_analyzers_disabled_by_default_yields_no_pitch() {
        let mut session = Session::new(1, 16000, SessionConfig::default()).unwrap();
        let summary = session.process_chunk(&vec![0.1; 16000]).unwrap();
        assert_eq!(summary.pitch_hz, None);
        assert_eq!(summary.pitch_confidence, 0.0);
    }

    #[test]
    fn test_decimate_peaks_picks_max_abs_per_bucket() {
        let samples = vec![0.1, -0.9, 0.2, 0.3, -0.1, 0.05];
        let peaks = decimate_peaks(&samples, 3);
        assert_eq!(peaks, vec![0.9, 0.3]);
    }
}
