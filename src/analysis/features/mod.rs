// FeatureFrontEnd - framing and MFCC extraction for the analysis pipeline
//
// This module turns a stream of raw PCM samples into a sequence of MFCC
// frames: pre-emphasis, Hamming-windowed framing, FFT magnitude spectrum,
// mel filterbank, log compression, and DCT-II.
//
// Module organization:
// - types: MfccFrame, the per-frame output
// - fft: windowing + FFT magnitude spectrum
// - mel: mel filterbank + DCT-II
// - spectral: frequency-domain features reused by harmonic analysis
// - mod.rs: coordinator (FeatureFrontEnd)

mod fft;
mod mel;
mod spectral;
mod types;

pub use mel::MelFilterbank;
pub use spectral::SpectralFeatures;
pub use types::MfccFrame;

use fft::FftProcessor;

/// Turns raw PCM samples into a sequence of `MfccFrame`s.
///
/// Samples are pushed incrementally via `push`; a frame is emitted each
/// time `hop_size` new samples have accumulated past a full `window_size`.
/// A one-pole pre-emphasis filter runs ahead of framing, matching the
/// standard MFCC front-end.
pub struct FeatureFrontEnd {
    sample_rate: u32,
    window_size: usize,
    hop_size: usize,
    num_mfcc_coeffs: usize,

    fft: FftProcessor,
    mel_filterbank: MelFilterbank,

    /// Pre-emphasized sample ring buffer; holds at least one window.
    buffer: Vec<f32>,
    /// Total raw samples pushed so far, used to stamp frame start indices.
    samples_seen: u64,
    /// Pre-emphasis filter state (previous raw sample).
    prev_raw_sample: f32,
    pre_emphasis_coeff: f32,
}

impl FeatureFrontEnd {
    /// Create a new front-end.
    ///
    /// `window_size`/`hop_size` are in samples. The FFT size used
    /// internally is the next power of two >= `window_size`.
    pub fn new(
        sample_rate: u32,
        window_size: usize,
        hop_size: usize,
        num_mel_filters: usize,
        num_mfcc_coeffs: usize,
        pre_emphasis_coeff: f32,
    ) -> Self {
        let fft_size = window_size.next_power_of_two();
        let num_bins = fft_size / 2 + 1;

        Self {
            sample_rate,
            window_size,
            hop_size,
            num_mfcc_coeffs,
            fft: FftProcessor::new(fft_size),
            mel_filterbank: MelFilterbank::new(
                num_mel_filters,
                num_bins,
                sample_rate,
                0.0,
                sample_rate as f32 / 2.0,
            ),
            buffer: Vec::with_capacity(window_size * 2),
            samples_seen: 0,
            prev_raw_sample: 0.0,
            pre_emphasis_coeff,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Push new raw samples, returning every complete frame they produce.
    ///
    /// Multiple frames may be returned from a single call if `samples` is
    /// longer than `hop_size`.
    pub fn push(&mut self, samples: &[f32]) -> Vec<MfccFrame> {
        let mut emitted = Vec::new();

        for &raw in samples {
            let emphasized = raw - self.pre_emphasis_coeff * self.prev_raw_sample;
            self.prev_raw_sample = raw;
            self.buffer.push(emphasized);
            self.samples_seen += 1;

            if self.buffer.len() >= self.window_size {
                emitted.push(self.emit_frame());

                // Slide by hop_size, keeping the tail for the next window.
                if self.hop_size < self.buffer.len() {
                    self.buffer.drain(0..self.hop_size);
                } else {
                    self.buffer.clear();
                }
            }
        }

        emitted
    }

    fn emit_frame(&self) -> MfccFrame {
        let window = &self.buffer[..self.window_size];
        let start_sample = self.samples_seen - self.buffer.len() as u64;

        let log_energy = {
            let energy: f32 = window.iter().map(|&x| x * x).sum();
            (energy / self.window_size as f32).max(1e-10).ln()
        };

        let magnitude_spectrum = self.fft.compute_magnitude_spectrum(window);
        let mel_energies = self.mel_filterbank.apply(&magnitude_spectrum);
        let log_mel: Vec<f32> = mel_energies.iter().map(|&e| e.max(1e-10).ln()).collect();
        let mfcc = mel::dct_ii(&log_mel, self.num_mfcc_coeffs);

        MfccFrame {
            start_sample,
            mfcc,
            log_energy,
            magnitude_spectrum,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
