//! Public-facing result types returned by `Engine`/`Session` calls.

use serde::{Deserialize, Serialize};

/// Per-component contribution to the overall similarity score, exposed so
/// callers can show which aspect of an attempt drove the score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentContributions {
    pub mfcc: f32,
    pub pitch: f32,
    pub harmonic: f32,
    pub cadence: f32,
    pub loudness: f32,
}

/// A-F letter grade assigned by `GradeTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
    /// No grade band matched (metric absent from the table, or the score
    /// fell outside every configured band).
    N,
}

/// Snapshot of a session's analyzers, refreshed on every `process_chunk`
/// call once the session has accumulated enough active audio to be
/// "ready" (see `SessionConfig::scoring::min_audio_ms_for_readiness`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeState {
    pub is_ready: bool,
    pub is_voice_active: bool,
    pub active_frame_count: usize,
    pub current_pitch_hz: Option<f32>,
    pub current_rms_dbfs: f32,
    pub provisional_score: Option<f32>,
    pub provisional_contributions: Option<ComponentContributions>,
}

/// Point-in-time snapshot of every enhanced analyzer, returned by
/// `get_enhanced_summary` as a pull rather than as part of every
/// `process_chunk` call. Pitch/harmonic/cadence fields read as neutral
/// defaults while enhanced analyzers are disabled for the session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnhancedSummary {
    pub pitch_hz: Option<f32>,
    pub pitch_confidence: f32,
    pub harmonicity_score: f32,
    pub harmonic_confidence: f32,
    pub cadence_score: f32,
    pub tempo_confidence: f32,
    pub rms_dbfs: f32,
    pub peak_dbfs: f32,
    /// Absolute difference between `rms_dbfs` and the bound master's mean
    /// RMS, in dB. `0.0` when no master is bound.
    pub loudness_deviation: f32,
    /// Linear gain that would bring `rms_dbfs` to the master's mean RMS.
    /// `1.0` when no master is bound.
    pub normalization_scalar: f32,
    /// Milliseconds elapsed since the session was created.
    pub last_update_ms: u64,
    pub frames_observed: u64,
}

/// Result of `finalize()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalSummary {
    pub overall_score: f32,
    pub grade: Grade,
    pub contributions: ComponentContributions,
    /// Sample range of the segment selected for scoring, in the original
    /// (pre-normalization) input stream.
    pub segment_start_sample: u64,
    pub segment_end_sample: u64,
    /// Linear-domain gain applied during loudness normalization.
    pub loudness_gain_applied: f32,
    /// Set when finalize could not produce a meaningful score and instead
    /// returned a diagnostic fallback (e.g. "too short", "too quiet").
    pub fallback_reason: Option<String>,
    pub pitch_grade: Grade,
    pub harmonic_grade: Grade,
    pub cadence_grade: Grade,
    /// True only when the session's pre-finalize provisional score was
    /// below the fallback floor and the finalized score crossed back
    /// above it - i.e. the refined finalize pass rescued a score the
    /// realtime path had given up on.
    pub fallback_used: bool,
}

/// Data bundle exported for overlay/visualization UIs: two decimated peak
/// traces (master reference, user attempt) the caller can render aligned
/// without re-running analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayExport {
    /// Decimated peak (max abs sample) magnitude per step, master call.
    pub master_peaks: Vec<f32>,
    /// Decimated peak magnitude per step, user attempt.
    pub user_peaks: Vec<f32>,
    /// Number of samples each decimated peak bucket spans, at the
    /// session's own sample rate.
    pub step_samples: usize,
    /// Offset, in milliseconds, of the user's selected active segment
    /// start relative to the start of the raw attempt stream. Overlay
    /// consumers align `user_peaks[0]` to this offset.
    pub alignment_offset_ms: f32,
}
