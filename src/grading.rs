//! GradeTable - calibrated score-to-letter-grade thresholds.
//!
//! Loaded once at `Engine` construction from a JSON file of per-metric
//! threshold bands, the same load-with-fallback pattern as `SessionConfig`.
//! If a metric is absent from the table, `grade_for` returns `Grade::N`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::api::types::Grade;

/// Lower-bound-inclusive thresholds for a single metric, checked in order
/// A, B, C, D; anything below `d_min` is an F.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradeBands {
    pub a_min: f32,
    pub b_min: f32,
    pub c_min: f32,
    pub d_min: f32,
}

impl GradeBands {
    fn grade_for(&self, score: f32) -> Grade {
        if score >= self.a_min {
            Grade::A
        } else if score >= self.b_min {
            Grade::B
        } else if score >= self.c_min {
            Grade::C
        } else if score >= self.d_min {
            Grade::D
        } else {
            Grade::F
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeTable {
    bands: HashMap<String, GradeBands>,
}

const OVERALL_METRIC: &str = "overall";

static DEFAULT_BANDS: Lazy<HashMap<String, GradeBands>> = Lazy::new(|| {
    let standard = GradeBands {
        a_min: 0.85,
        b_min: 0.70,
        c_min: 0.55,
        d_min: 0.40,
    };
    let mut bands = HashMap::new();
    // Per-metric bands reuse the overall thresholds as a reasonable
    // default; a deployment can override any subset via its grade table
    // JSON file without needing to supply all four.
    bands.insert(OVERALL_METRIC.to_string(), standard);
    bands.insert("pitch".to_string(), standard);
    bands.insert("harmonic".to_string(), standard);
    bands.insert("cadence".to_string(), standard);
    bands
});

impl Default for GradeTable {
    fn default() -> Self {
        Self {
            bands: DEFAULT_BANDS.clone(),
        }
    }
}

impl GradeTable {
    /// Load a grade table from a JSON file, falling back to the built-in
    /// default (with a warning) if the file is missing or malformed.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(table) => {
                    log::info!("[GradeTable] Loaded grade table from {:?}", path.as_ref());
                    table
                }
                Err(err) => {
                    log::warn!(
                        "[GradeTable] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[GradeTable] Failed to read grade table {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Grade a named metric's score, or `Grade::N` if the metric has no
    /// configured bands.
    pub fn grade_for_metric(&self, metric: &str, score: f32) -> Grade {
        match self.bands.get(metric) {
            Some(bands) => bands.grade_for(score),
            None => Grade::N,
        }
    }

    /// Grade the overall composite similarity score.
    pub fn grade_overall(&self, score: f32) -> Grade {
        self.grade_for_metric(OVERALL_METRIC, score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_grades_overall() {
        let table = GradeTable::default();
        assert_eq!(table.grade_overall(0.9), Grade::A);
        assert_eq!(table.grade_overall(0.75), Grade::B);
        assert_eq!(table.grade_overall(0.6), Grade::C);
        assert_eq!(table.grade_overall(0.45), Grade::D);
        assert_eq!(table.grade_overall(0.1), Grade::F);
    }

    #[test]
    fn test_missing_metric_is_n() {
        let table = GradeTable::default();
        assert_eq!(table.grade_for_metric("nonexistent", 0.9), Grade::N);
    }

    #[test]
    fn test_default_table_grades_pitch_harmonic_cadence() {
        let table = GradeTable::default();
        assert_eq!(table.grade_for_metric("pitch", 0.9), Grade::A);
        assert_eq!(table.grade_for_metric("harmonic", 0.6), Grade::C);
        assert_eq!(table.grade_for_metric("cadence", 0.1), Grade::F);
    }

    #[test]
    fn test_load_from_missing_file_falls_back() {
        let table = GradeTable::load_from_file("/nonexistent/grades.json");
        assert_eq!(table.grade_overall(0.9), Grade::A);
    }

    #[test]
    fn test_json_roundtrip() {
        let table = GradeTable::default();
        let json = serde_json::to_string(&table).unwrap();
        let parsed: GradeTable = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.grade_overall(0.9), Grade::A);
    }
}
