//! Engine - the public entry point: session lifecycle, master-call
//! loading/caching, and per-session chunk processing/finalization.
//!
//! Concurrency model: the session table and master cache are each guarded
//! by a `std::sync::RwLock` (not `tokio::sync`, since nothing here ever
//! suspends); each session itself is additionally wrapped in a `Mutex` so
//! two threads can drive two different sessions concurrently while a
//! single session is only ever touched by one caller at a time.

pub mod master;
pub mod session;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::api::types::{EnhancedSummary, FinalSummary, OverlayExport, RealtimeState};
use crate::config::SessionConfig;
use crate::error::EngineError;
use crate::grading::GradeTable;

use master::{MasterCall, MasterSource};
use session::Session;

/// Default cap on concurrently live sessions per engine. Not a hard
/// platform limit, just a guard against unbounded growth from a caller
/// that forgets to `destroy_session`.
const DEFAULT_MAX_SESSIONS: usize = 10_000;

pub struct Engine {
    default_config: SessionConfig,
    /// Sample rate master calls are resampled to at load time; sessions
    /// bound to a master must share this rate.
    canonical_sample_rate: u32,
    grade_table: GradeTable,
    masters: RwLock<HashMap<String, Arc<MasterCall>>>,
    sessions: RwLock<HashMap<u64, Mutex<Session>>>,
    next_session_id: AtomicU64,
    max_sessions: usize,
}

impl Engine {
    pub fn new(default_config: SessionConfig, canonical_sample_rate: u32) -> Result<Self, EngineError> {
        default_config
            .validate()
            .map_err(|details| EngineError::ConfigurationError { details })?;

        Ok(Self {
            default_config,
            canonical_sample_rate,
            grade_table: GradeTable::default(),
            masters: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            max_sessions: DEFAULT_MAX_SESSIONS,
        })
    }

    /// Override the concurrent-session cap (default 10,000) that
    /// `create_session` enforces with `EngineError::ResourceExhausted`.
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    /// Build an engine loading its grade table from a JSON file (falling
    /// back to the built-in default with a warning if absent/invalid).
    pub fn with_grade_table_file<P: AsRef<std::path::Path>>(
        default_config: SessionConfig,
        canonical_sample_rate: u32,
        grade_table_path: P,
    ) -> Result<Self, EngineError> {
        let mut engine = Self::new(default_config, canonical_sample_rate)?;
        engine.grade_table = GradeTable::load_from_file(grade_table_path);
        Ok(engine)
    }

    /// Resolve and cache a master call's precomputed analysis, resampling
    /// to the engine's canonical sample rate if needed. Calling this again
    /// for an id already in the cache re-resolves and replaces the entry.
    pub fn load_master_call(
        &self,
        master_id: &str,
        source: &dyn MasterSource,
    ) -> Result<(), EngineError> {
        let master = MasterCall::load(
            master_id,
            source,
            self.canonical_sample_rate,
            &self.default_config,
        )?;

        let mut masters = self.masters.write().map_err(|_| EngineError::Internal {
            details: "master cache lock poisoned".to_string(),
        })?;
        masters.insert(master_id.to_string(), Arc::new(master));
        log::info!("[Engine] Loaded master call '{}'", master_id);
        Ok(())
    }

    pub fn create_session(
        &self,
        sample_rate: u32,
        config: Option<SessionConfig>,
    ) -> Result<u64, EngineError> {
        let config = config.unwrap_or_else(|| self.default_config.clone());

        let mut sessions = self.sessions.write().map_err(|_| EngineError::Internal {
            details: "session table lock poisoned".to_string(),
        })?;
        if sessions.len() >= self.max_sessions {
            return Err(EngineError::ResourceExhausted {
                details: format!(
                    "engine already has {} live sessions (max {})",
                    sessions.len(),
                    self.max_sessions
                ),
            });
        }

        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let session = Session::new(session_id, sample_rate, config)?;
        sessions.insert(session_id, Mutex::new(session));
        Ok(session_id)
    }

    pub fn destroy_session(&self, session_id: u64) -> Result<(), EngineError> {
        let mut sessions = self.sessions.write().map_err(|_| EngineError::Internal {
            details: "session table lock poisoned".to_string(),
        })?;
        sessions
            .remove(&session_id)
            .map(|_| ())
            .ok_or(EngineError::SessionNotFound { session_id })
    }

    pub fn bind_master(&self, session_id: u64, master_id: &str) -> Result<(), EngineError> {
        let master = {
            let masters = self.masters.read().map_err(|_| EngineError::Internal {
                details: "master cache lock poisoned".to_string(),
            })?;
            masters
                .get(master_id)
                .cloned()
                .ok_or_else(|| EngineError::MasterNotFound {
                    master_id: master_id.to_string(),
                })?
        };

        self.with_session_mut(session_id, |session| {
            if session.sample_rate() != master.sample_rate {
                return Err(EngineError::ConfigurationError {
                    details: format!(
                        "session sample rate {} does not match master '{}' sample rate {}",
                        session.sample_rate(),
                        master.id,
                        master.sample_rate
                    ),
                });
            }
            session.bind_master(master);
            Ok(())
        })
    }

    pub fn process_chunk(
        &self,
        session_id: u64,
        samples: &[f32],
    ) -> Result<EnhancedSummary, EngineError> {
        self.with_session_mut(session_id, |session| session.process_chunk(samples))
    }

    pub fn get_realtime_state(&self, session_id: u64) -> Result<RealtimeState, EngineError> {
        self.with_session(session_id, |session| Ok(session.realtime_state()))
    }

    /// Toggle pitch/harmonic/cadence analysis for a session; off by default.
    pub fn enable_enhanced_analyzers(&self, session_id: u64, enabled: bool) -> Result<(), EngineError> {
        self.with_session_mut(session_id, |session| {
            session.set_enhanced_analyzers_enabled(enabled);
            Ok(())
        })
    }

    /// Last computed realtime similarity score, or `EngineError::NotReady`
    /// if the session hasn't yet satisfied the reliability predicate.
    pub fn get_similarity_score(&self, session_id: u64) -> Result<f32, EngineError> {
        self.with_session(session_id, |session| session.similarity_score())
    }

    /// Point-in-time pull of every enhanced analyzer's current state.
    pub fn get_enhanced_summary(&self, session_id: u64) -> Result<EnhancedSummary, EngineError> {
        self.with_session(session_id, |session| Ok(session.enhanced_summary()))
    }

    pub fn finalize(&self, session_id: u64) -> Result<FinalSummary, EngineError> {
        self.with_session_mut(session_id, |session| session.finalize(&self.grade_table))
    }

    pub fn export_overlay(
        &self,
        session_id: u64,
        decimation_step: usize,
    ) -> Result<OverlayExport, EngineError> {
        self.with_session(session_id, |session| session.export_overlay(decimation_step))
    }

    pub fn reset_session(&self, session_id: u64) -> Result<(), EngineError> {
        self.with_session_mut(session_id, |session| {
            session.reset();
            Ok(())
        })
    }

    fn with_session<T>(
        &self,
        session_id: u64,
        f: impl FnOnce(&Session) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let sessions = self.sessions.read().map_err(|_| EngineError::Internal {
            details: "session table lock poisoned".to_string(),
        })?;
        let session_lock = sessions
            .get(&session_id)
            .ok_or(EngineError::SessionNotFound { session_id })?;
        let session = session_lock.lock().map_err(|_| EngineError::Internal {
            details: "session lock poisoned".to_string(),
        })?;
        f(&session)
    }

    fn with_session_mut<T>(
        &self,
        session_id: u64,
        f: impl FnOnce(&mut Session) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let sessions = self.sessions.read().map_err(|_| EngineError::Internal {
            details: "session table lock poisoned".to_string(),
        })?;
        let session_lock = sessions
            .get(&session_id)
            .ok_or(EngineError::SessionNotFound { session_id })?;
        let mut session = session_lock.lock().map_err(|_| EngineError::Internal {
            details: "session lock poisoned".to_string(),
        })?;
        f(&mut session)
    }
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

    fn sine(sample_rate: u32, freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_create_and_destroy_session() {
        let engine = Engine::new(SessionConfig::default(), 16000).unwrap();
        let session_id = engine.create_session(16000, None).unwrap();
        engine.destroy_session(session_id).unwrap();
        let result = engine.process_chunk(session_id, &[0.0; 100]);
        assert!(matches!(result, Err(EngineError::SessionNotFound { .. })));
    }

    #[test]
    fn test_bind_master_requires_loaded_master() {
        let engine = Engine::new(SessionConfig::default(), 16000).unwrap();
        let session_id = engine.create_session(16000, None).unwrap();
        let result = engine.bind_master(session_id, "nonexistent");
        assert!(matches!(result, Err(EngineError::MasterNotFound { .. })));
    }

    #[test]
    fn test_full_happy_path() {
        let engine = Engine::new(SessionConfig::default(), 16000).unwrap();
        let source = InMemorySource {
            samples: sine(16000, 220.0, 32000),
            sample_rate: 16000,
        };
        engine.load_master_call("test_call", &source).unwrap();

        let session_id = engine.create_session(16000, None).unwrap();
        engine.bind_master(session_id, "test_call").unwrap();

        let attempt = sine(16000, 220.0, 32000);
        for chunk in attempt.chunks(1600) {
            engine.process_chunk(session_id, chunk).unwrap();
        }

        let summary = engine.finalize(session_id).unwrap();
        assert!(summary.overall_score >= 0.0 && summary.overall_score <= 1.0);

        // Idempotent: calling finalize again returns the same summary.
        let summary2 = engine.finalize(session_id).unwrap();
        assert_eq!(summary.overall_score, summary2.overall_score);
    }

    #[test]
    fn test_finalize_on_silence_yields_no_data_error() {
        let engine = Engine::new(SessionConfig::default(), 16000).unwrap();
        let source = InMemorySource {
            samples: sine(16000, 220.0, 16000),
            sample_rate: 16000,
        };
        engine.load_master_call("test_call", &source).unwrap();

        let session_id = engine.create_session(16000, None).unwrap();
        engine.bind_master(session_id, "test_call").unwrap();
        engine.process_chunk(session_id, &vec![0.0; 16000]).unwrap();

        let result = engine.finalize(session_id);
        assert!(matches!(result, Err(EngineError::NoData)));
    }

    #[test]
    fn test_get_similarity_score_requires_readiness() {
        let engine = Engine::new(SessionConfig::default(), 16000).unwrap();
        let source = InMemorySource {
            samples: sine(16000, 220.0, 32000),
            sample_rate: 16000,
        };
        engine.load_master_call("test_call", &source).unwrap();

        let session_id = engine.create_session(16000, None).unwrap();
        assert!(matches!(
            engine.get_similarity_score(session_id),
            Err(EngineError::NotReady)
        ));

        engine.bind_master(session_id, "test_call").unwrap();
        let attempt = sine(16000, 220.0, 32000);
        for chunk in attempt.chunks(1600) {
            engine.process_chunk(session_id, chunk).unwrap();
        }
        let score = engine.get_similarity_score(session_id).unwrap();
        assert!(score >= 0.0 && score <= 1.0);
    }

    #[test]
    fn test_enable_enhanced_analyzers_populates_pitch() {
        let engine = Engine::new(SessionConfig::default(), 16000).unwrap();
        let session_id = engine.create_session(16000, None).unwrap();
        engine.enable_enhanced_analyzers(session_id, true).unwrap();

        let attempt = sine(16000, 220.0, 16000);
        engine.process_chunk(session_id, &attempt).unwrap();

        let summary = engine.get_enhanced_summary(session_id).unwrap();
        assert!(summary.frames_observed > 0);
    }

    #[test]
    fn test_export_overlay_aligns_master_and_user_peaks() {
        let engine = Engine::new(SessionConfig::default(), 16000).unwrap();
        let source = InMemorySource {
            samples: sine(16000, 220.0, 32000),
            sample_rate: 16000,
        };
        engine.load_master_call("test_call", &source).unwrap();

        let session_id = engine.create_session(16000, None).unwrap();
        engine.bind_master(session_id, "test_call").unwrap();
        engine.process_chunk(session_id, &sine(16000, 220.0, 32000)).unwrap();

        let overlay = engine.export_overlay(session_id, 160).unwrap();
        assert_eq!(overlay.step_samples, 160);
        assert!(!overlay.master_peaks.is_empty());
        assert!(!overlay.user_peaks.is_empty());
    }

    #[test]
    fn test_create_session_past_cap_is_resource_exhausted() {
        let engine = Engine::new(SessionConfig::default(), 16000)
            .unwrap()
            .with_max_sessions(1);
        engine.create_session(16000, None).unwrap();
        let result = engine.create_session(16000, None);
        assert!(matches!(result, Err(EngineError::ResourceExhausted { .. })));
    }
}
