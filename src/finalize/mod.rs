//! SessionFinalizer - best-segment selection, loudness normalization,
//! refined DTW comparison, and grade mapping for a completed attempt.

use crate::analysis::cadence::CadenceAnalyzer;
use crate::analysis::dtw::DtwComparator;
use crate::analysis::features::{FeatureFrontEnd, MfccFrame};
use crate::analysis::loudness::LoudnessMeter;
use crate::analysis::pitch::PitchTracker;
use crate::api::types::{ComponentContributions, FinalSummary};
use crate::config::SessionConfig;
use crate::engine::master::MasterCall;
use crate::error::EngineError;
use crate::grading::GradeTable;

const MIN_SEGMENT_FRAMES: usize = 4;

/// Score floor below which a session's provisional realtime score is
/// considered unreliable. `fallback_used` on `FinalSummary` is set when
/// the pre-finalize score was below this floor but the finalized,
/// refined score crosses back above it.
const FALLBACK_SCORE_FLOOR: f32 = 0.70;

/// Find the longest contiguous run of `true` in `vad_track`, returning the
/// inclusive `(start, end)` frame index range. Returns `None` if no run
/// reaches `MIN_SEGMENT_FRAMES`.
pub fn select_active_segment(vad_track: &[bool]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    let mut run_start: Option<usize> = None;

    for (i, &active) in vad_track.iter().enumerate() {
        if active {
            if run_start.is_none() {
                run_start = Some(i);
            }
        } else if let Some(start) = run_start.take() {
            consider_run(&mut best, start, i - 1);
        }
    }
    if let Some(start) = run_start {
        consider_run(&mut best, start, vad_track.len() - 1);
    }

    best.filter(|(start, end)| end - start + 1 >= MIN_SEGMENT_FRAMES)
}

fn consider_run(best: &mut Option<(usize, usize)>, start: usize, end: usize) {
    let len = end - start + 1;
    let better = match best {
        Some((bs, be)) => len > (*be - *bs + 1),
        None => true,
    };
    if better {
        *best = Some((start, end));
    }
}

/// Combine five `[0, 1]` component similarities into an overall score
/// using the configured weights (already validated to sum to ~1.0).
pub fn combine_scores(
    config: &SessionConfig,
    mfcc: f32,
    pitch: f32,
    harmonic: f32,
    cadence: f32,
    loudness: f32,
) -> (f32, ComponentContributions) {
    let contributions = ComponentContributions {
        mfcc: mfcc * config.scoring.weight_mfcc,
        pitch: pitch * config.scoring.weight_pitch,
        harmonic: harmonic * config.scoring.weight_harmonic,
        cadence: cadence * config.scoring.weight_cadence,
        loudness: loudness * config.scoring.weight_loudness,
    };
    let overall = (contributions.mfcc
        + contributions.pitch
        + contributions.harmonic
        + contributions.cadence
        + contributions.loudness)
        .clamp(0.0, 1.0);
    (overall, contributions)
}

fn relative_similarity(value: f32, reference: f32, tolerance: f32) -> f32 {
    if tolerance <= 0.0 {
        return if (value - reference).abs() < 1e-6 { 1.0 } else { 0.0 };
    }
    (1.0 - (value - reference).abs() / tolerance).clamp(0.0, 1.0)
}

/// Run the full finalize pipeline over a completed session's accumulated
/// state: select the best active segment, normalize its loudness against
/// the master, recompute MFCC/pitch/harmonic/cadence on the normalized
/// segment, and grade the result.
pub fn finalize_session(
    raw_samples: &[f32],
    mfcc_frames: &[MfccFrame],
    vad_track: &[bool],
    sample_rate: u32,
    config: &SessionConfig,
    master: &MasterCall,
    grade_table: &GradeTable,
    last_provisional_score: Option<f32>,
) -> Result<FinalSummary, EngineError> {
    let (start_idx, end_idx) = select_active_segment(vad_track).ok_or(EngineError::NoData)?;

    let window_size = config.front_end.window_size;
    let segment_start_sample = mfcc_frames[start_idx].start_sample;
    let segment_end_sample =
        mfcc_frames[end_idx].start_sample + window_size as u64;

    let seg_start = segment_start_sample as usize;
    let seg_end = (segment_end_sample as usize).min(raw_samples.len());
    if seg_start >= seg_end {
        return Err(EngineError::NoData);
    }
    let segment = &raw_samples[seg_start..seg_end];

    // Loudness normalization: measure this segment's own mean RMS, derive
    // the linear gain that would bring it to the master's mean RMS.
    let mut segment_loudness = LoudnessMeter::new();
    for chunk in segment.chunks(window_size.max(1)) {
        segment_loudness.process(chunk);
    }
    let gain = segment_loudness.normalization_gain(master.mean_rms_dbfs);
    let normalized_segment: Vec<f32> = segment.iter().map(|&s| s * gain).collect();

    // Refined MFCC + DTW on the normalized segment.
    let mut front_end = FeatureFrontEnd::new(
        sample_rate,
        config.front_end.window_size,
        config.front_end.hop_size,
        config.front_end.num_mel_filters,
        config.front_end.num_mfcc_coeffs,
        config.front_end.pre_emphasis_coeff,
    );
    let refined_frames = front_end.push(&normalized_segment);
    let refined_mfcc: Vec<Vec<f32>> = refined_frames.iter().map(|f| f.mfcc.clone()).collect();

    let dtw = DtwComparator::new(config.dtw.band_radius_fraction);
    let mfcc_similarity = dtw
        .compare(&master.mfcc_frames, &refined_mfcc)
        .map(|distance| 1.0 / (1.0 + distance))
        .unwrap_or(0.0);

    // Refined pitch on the normalized segment (pitch is gain-invariant in
    // principle, but we recompute for consistency with the refined frames).
    let mut pitch_tracker = PitchTracker::new(sample_rate, &config.pitch);
    let mut pitch_sum = 0.0f64;
    let mut pitch_count = 0u64;
    let hop = config.front_end.hop_size.max(1);
    let mut pos = 0usize;
    while pos + window_size <= normalized_segment.len() {
        let estimate = pitch_tracker.process(&normalized_segment[pos..pos + window_size]);
        if let Some(hz) = estimate.frequency_hz {
            pitch_sum += hz as f64;
            pitch_count += 1;
        }
        pos += hop;
    }
    let pitch_similarity = if pitch_count > 0 && master.mean_pitch_hz > 0.0 {
        let mean_pitch = (pitch_sum / pitch_count as f64) as f32;
        relative_similarity(mean_pitch, master.mean_pitch_hz, master.mean_pitch_hz * 0.5)
    } else {
        0.0
    };

    // Harmonic richness proxy: voiced-frame fraction over the refined
    // frames, matching how the master's own richness was estimated.
    let harmonic_similarity = if !refined_frames.is_empty() {
        let voiced_fraction = pitch_count as f32 / refined_frames.len() as f32;
        relative_similarity(voiced_fraction.clamp(0.0, 1.0), master.mean_harmonic_richness, 0.5)
    } else {
        0.0
    };

    // Cadence on the original (ungained) segment — rhythm is independent
    // of loudness normalization.
    let mut cadence = CadenceAnalyzer::new(sample_rate, &config.cadence);
    cadence.process(segment);
    let cadence_similarity = if master.reference_iois_ms.is_empty() {
        0.0
    } else {
        cadence.compare_to_reference(&master.reference_iois_ms)
    };

    // Loudness component reflects how close the *original* segment's
    // loudness was to the master's, before normalization was applied.
    let gain_db = 20.0 * gain.max(1e-6).log10();
    let loudness_similarity = relative_similarity(gain_db, 0.0, 12.0);

    let (overall, contributions) = combine_scores(
        config,
        mfcc_similarity,
        pitch_similarity,
        harmonic_similarity,
        cadence_similarity,
        loudness_similarity,
    );

    let fallback_reason = if refined_mfcc.is_empty() {
        Some("segment too short to extract any MFCC frames".to_string())
    } else if pitch_count == 0 {
        Some("no voiced pitch detected in selected segment".to_string())
    } else {
        None
    };

    let fallback_used = last_provisional_score
        .map(|provisional| provisional < FALLBACK_SCORE_FLOOR && overall >= FALLBACK_SCORE_FLOOR)
        .unwrap_or(false);

    Ok(FinalSummary {
        overall_score: overall,
        grade: grade_table.grade_overall(overall),
        contributions,
        segment_start_sample,
        segment_end_sample,
        loudness_gain_applied: gain,
        fallback_reason,
        pitch_grade: grade_table.grade_for_metric("pitch", pitch_similarity),
        harmonic_grade: grade_table.grade_for_metric("harmonic", harmonic_similarity),
        cadence_grade: grade_table.grade_for_metric("cadence", cadence_similarity),
        fallback_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_active_segment_picks_longest_run() {
        let track = vec![false, true, true, false, true, true, true, true, true, false];
        let segment = select_active_segment(&track);
        assert_eq!(segment, Some((4, 8)));
    }

    #[test]
    fn test_select_active_segment_none_when_too_short() {
        let track = vec![false, true, true, false];
        assert!(select_active_segment(&track).is_none());
    }

    #[test]
    fn test_select_active_segment_run_until_end() {
        let track = vec![false, false, true, true, true, true, true];
        assert_eq!(select_active_segment(&track), Some((2, 6)));
    }

    #[test]
    fn test_combine_scores_weights_sum_correctly() {
        let config = SessionConfig::default();
        let (overall, _) = combine_scores(&config, 1.0, 1.0, 1.0, 1.0, 1.0);
        assert!((overall - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_combine_scores_zero_components_yield_zero() {
        let config = SessionConfig::default();
        let (overall, _) = combine_scores(&config, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(overall, 0.0);
    }
}
