//! Public result types returned from `Engine`/`Session` calls.

pub mod types;

pub use types::{
    ComponentContributions, EnhancedSummary, FinalSummary, Grade, OverlayExport, RealtimeState,
};
