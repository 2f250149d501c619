//! SimilarityScorer - weighted composition of per-analyzer components
//! into a single similarity score, with readiness gating and staleness
//! tracking so a component that stops producing fresh data (e.g. pitch
//! tracking losing voicing) doesn't silently drag the score down forever.

use crate::api::types::ComponentContributions;
use crate::config::ScoringConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentInput {
    pub mfcc: Option<f32>,
    pub pitch: Option<f32>,
    pub harmonic: Option<f32>,
    pub cadence: Option<f32>,
    pub loudness: Option<f32>,
}

impl ComponentInput {
    pub fn all_absent() -> Self {
        Self {
            mfcc: None,
            pitch: None,
            harmonic: None,
            cadence: None,
            loudness: None,
        }
    }
}

/// Tracks how many consecutive chunks each component has gone without a
/// fresh value; once that count exceeds `staleness_chunks`, the component
/// is excluded from scoring and its weight redistributed.
#[derive(Debug, Clone, Copy, Default)]
struct StalenessCounters {
    mfcc: u32,
    pitch: u32,
    harmonic: u32,
    cadence: u32,
    loudness: u32,
}

pub struct SimilarityScorer {
    config: ScoringConfig,
    staleness: StalenessCounters,
    active_frame_count: usize,
    /// Active-frame count derived at construction from
    /// `ScoringConfig::min_audio_ms_for_readiness` and the session's
    /// sample rate/hop size.
    min_frames_required: usize,
    master_loaded: bool,
    active_segment_seen: bool,
}

pub struct ScoreResult {
    pub score: f32,
    pub contributions: ComponentContributions,
    pub is_ready: bool,
}

impl SimilarityScorer {
    pub fn new(config: ScoringConfig, min_frames_required: usize) -> Self {
        Self {
            config,
            staleness: StalenessCounters::default(),
            active_frame_count: 0,
            min_frames_required,
            master_loaded: false,
            active_segment_seen: false,
        }
    }

    pub fn note_active_frame(&mut self) {
        self.active_frame_count += 1;
        self.active_segment_seen = true;
    }

    /// Told by the session whenever a master becomes bound or unbound;
    /// `reliable` can never be true without one.
    pub fn set_master_loaded(&mut self, loaded: bool) {
        self.master_loaded = loaded;
    }

    /// `reliable = (frames_observed >= min_frames_required) AND
    /// (master_loaded) AND (at_least_one_active_segment_seen)`.
    pub fn is_ready(&self) -> bool {
        self.active_frame_count >= self.min_frames_required
            && self.master_loaded
            && self.active_segment_seen
    }

    /// Compute the combined score for this chunk's component inputs,
    /// updating staleness counters and redistributing weight away from any
    /// component that has been absent for too long.
    pub fn score(&mut self, input: ComponentInput) -> ScoreResult {
        self.update_staleness(&input);

        let weights = [
            (
                input.mfcc,
                self.config.weight_mfcc,
                self.staleness.mfcc,
            ),
            (
                input.pitch,
                self.config.weight_pitch,
                self.staleness.pitch,
            ),
            (
                input.harmonic,
                self.config.weight_harmonic,
                self.staleness.harmonic,
            ),
            (
                input.cadence,
                self.config.weight_cadence,
                self.staleness.cadence,
            ),
            (
                input.loudness,
                self.config.weight_loudness,
                self.staleness.loudness,
            ),
        ];

        let usable_weight_sum: f32 = weights
            .iter()
            .filter(|(value, _, stale)| value.is_some() && *stale <= self.config.staleness_chunks)
            .map(|(_, w, _)| w)
            .sum();

        let normalize = |value: Option<f32>, weight: f32, stale: u32| -> f32 {
            if usable_weight_sum <= 0.0 {
                return 0.0;
            }
            match value {
                Some(v) if stale <= self.config.staleness_chunks => {
                    v * (weight / usable_weight_sum)
                }
                _ => 0.0,
            }
        };

        let contributions = ComponentContributions {
            mfcc: normalize(input.mfcc, self.config.weight_mfcc, self.staleness.mfcc),
            pitch: normalize(input.pitch, self.config.weight_pitch, self.staleness.pitch),
            harmonic: normalize(
                input.harmonic,
                self.config.weight_harmonic,
                self.staleness.harmonic,
            ),
            cadence: normalize(
                input.cadence,
                self.config.weight_cadence,
                self.staleness.cadence,
            ),
            loudness: normalize(
                input.loudness,
                self.config.weight_loudness,
                self.staleness.loudness,
            ),
        };

        let score = contributions.mfcc
            + contributions.pitch
            + contributions.harmonic
            + contributions.cadence
            + contributions.loudness;

        ScoreResult {
            score: score.clamp(0.0, 1.0),
            contributions,
            is_ready: self.is_ready(),
        }
    }

    fn update_staleness(&mut self, input: &ComponentInput) {
        self.staleness.mfcc = if input.mfcc.is_some() { 0 } else { self.staleness.mfcc + 1 };
        self.staleness.pitch = if input.pitch.is_some() { 0 } else { self.staleness.pitch + 1 };
        self.staleness.harmonic = if input.harmonic.is_some() {
            0
        } else {
            self.staleness.harmonic + 1
        };
        self.staleness.cadence = if input.cadence.is_some() {
            0
        } else {
            self.staleness.cadence + 1
        };
        self.staleness.loudness = if input.loudness.is_some() {
            0
        } else {
            self.staleness.loudness + 1
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_input() -> ComponentInput {
        ComponentInput {
            mfcc: Some(0.9),
            pitch: Some(0.8),
            harmonic: Some(0.7),
            cadence: Some(0.6),
            loudness: Some(1.0),
        }
    }

    #[test]
    fn test_readiness_gate() {
        let mut scorer = SimilarityScorer::new(ScoringConfig::default(), 8);
        assert!(!scorer.is_ready());
        for _ in 0..8 {
            scorer.note_active_frame();
        }
        assert!(
            !scorer.is_ready(),
            "enough active frames but no master bound should not be reliable"
        );
        scorer.set_master_loaded(true);
        assert!(scorer.is_ready());
    }

    #[test]
    fn test_full_components_sum_to_weighted_average() {
        let mut scorer = SimilarityScorer::new(ScoringConfig::default(), 8);
        let result = scorer.score(full_input());
        assert!(result.score > 0.0 && result.score <= 1.0);
    }

    #[test]
    fn test_absent_component_redistributes_weight() {
        let mut scorer = SimilarityScorer::new(ScoringConfig::default(), 8);
        let mut input = full_input();
        input.cadence = None;

        let result = scorer.score(input);
        assert_eq!(result.contributions.cadence, 0.0);
        // Remaining components should pick up the redistributed weight, so
        // total score can still approach the same magnitude.
        assert!(result.score > 0.0);
    }

    #[test]
    fn test_stale_component_excluded_after_threshold() {
        let mut scorer = SimilarityScorer::new(ScoringConfig::default(), 8);
        let staleness_chunks = ScoringConfig::default().staleness_chunks;

        let mut input = full_input();
        input.pitch = None;
        for _ in 0..=staleness_chunks {
            scorer.score(input);
        }

        input.pitch = Some(0.8);
        let result = scorer.score(input);
        // After exceeding the staleness window the counter reset on this
        // fresh value, so it should contribute again.
        assert!(result.contributions.pitch > 0.0);
    }

    #[test]
    fn test_all_absent_gives_zero_score() {
        let mut scorer = SimilarityScorer::new(ScoringConfig::default(), 8);
        let result = scorer.score(ComponentInput::all_absent());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_not_ready_without_active_segment_even_with_master() {
        let mut scorer = SimilarityScorer::new(ScoringConfig::default(), 0);
        scorer.set_master_loaded(true);
        assert!(
            !scorer.is_ready(),
            "zero active frames observed means no active segment was ever seen"
        );
    }
}
