// Types module - data structures produced by the MFCC front-end.

/// One analysis frame's worth of extracted features.
///
/// Produced once per hop by `FeatureFrontEnd::push` whenever a full window
/// of samples has accumulated. `mfcc` holds the DCT-II coefficients
/// (including c0, the log-energy term); `log_energy` is kept separately so
/// callers don't need to re-derive it from c0.
#[derive(Debug, Clone, PartialEq)]
pub struct MfccFrame {
    /// Sample index of the first sample in this frame, in the session's
    /// input stream.
    pub start_sample: u64,
    /// Mel-frequency cepstral coefficients, c0..c{num_coeffs-1}.
    pub mfcc: Vec<f32>,
    /// Frame log-energy (natural log of summed squared samples, floored).
    pub log_energy: f32,
    /// Linear-domain magnitude spectrum for this frame, reused by harmonic
    /// and cadence analysis so they don't re-run the FFT.
    pub magnitude_spectrum: Vec<f32>,
}
