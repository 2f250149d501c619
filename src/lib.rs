// Wildcall Core - Rust Audio Engine
// Real-time wildlife-call similarity analysis: MFCC/DTW scoring, VAD,
// pitch, harmonic, and cadence analysis.

pub mod analysis;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod finalize;
pub mod grading;
pub mod scoring;
pub mod testing;

pub use api::{ComponentContributions, EnhancedSummary, FinalSummary, Grade, OverlayExport, RealtimeState};
pub use config::SessionConfig;
pub use engine::Engine;
pub use engine::master::{MasterSource, WavMasterSource};
pub use error::EngineError;
pub use grading::GradeTable;

/// Initialize env_logger-backed logging for host applications that embed
/// this crate without their own logging setup.
#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::master::MasterSource;

    struct InMemorySource {
        samples: Vec<f32>,
        sample_rate: u32,
    }

    impl MasterSource for InMemorySource {
        fn resolve(&self, _master_id: &str) -> Result<(Vec<f32>, u32), EngineError> {
            Ok((self.samples.clone(), self.sample_rate))
        }
    }

    #[test]
    fn test_public_api_surface_is_usable_end_to_end() {
        let engine = Engine::new(SessionConfig::default(), 16000).unwrap();
        let source = InMemorySource {
            samples: crate::testing::sine_wave(16000, 220.0, 0.5, 16000),
            sample_rate: 16000,
        };
        engine.load_master_call("call_a", &source).unwrap();

        let session_id = engine.create_session(16000, None).unwrap();
        engine.bind_master(session_id, "call_a").unwrap();
        engine
            .process_chunk(session_id, &crate::testing::sine_wave(16000, 220.0, 0.5, 16000))
            .unwrap();

        let summary = engine.finalize(session_id).unwrap();
        assert!(summary.overall_score >= 0.0);
    }
}
