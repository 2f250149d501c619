//! Per-chunk audio analysis: MFCC extraction, voice activity detection,
//! loudness tracking, pitch tracking, harmonic analysis, and cadence
//! (rhythm) analysis. `crate::engine::session` owns one instance of each
//! analyzer per session and drives them from incoming audio chunks.

pub mod cadence;
pub mod dtw;
pub mod features;
pub mod harmonic;
pub mod loudness;
pub mod onset;
pub mod pitch;
pub mod vad;
