//! Session Lens - Behavioral analysis engine for recorded browsing sessions
//!
//! Lens turns the raw event stream captured by a session recorder into
//! prioritized UX insights through a deterministic pipeline: event
//! normalization → page-view extraction → pattern detection → scoring →
//! aggregation → summarization.
//!
//! ## Modules
//!
//! - **Session Analysis**: One session's events into insights, scores and a summary
//! - **Overview**: Many analyzed sessions rolled up into site-wide issues
//! - **Page analysis / Trends**: One URL across sessions, and sessions by day

pub mod aggregator;
pub mod detectors;
pub mod error;
pub mod normalizer;
pub mod overview;
pub mod page;
pub mod patterns;
pub mod pipeline;
pub mod scorer;
pub mod summary;
pub mod timeline;
pub mod trends;
pub mod types;

#[cfg(feature = "cli")]
pub mod logging;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use error::AnalysisError;
pub use normalizer::EventNormalizer;
pub use pipeline::{
    analyze, analyze_events, analyze_json, overview_json, page_analysis_json, trends_json,
    SessionAnalyzer,
};

// Pattern exports
pub use patterns::{PatternConfig, Patterns};

// Result exports
pub use overview::{InsightOverview, SessionAnalysis, SessionInput};
pub use page::PageAnalysis;
pub use trends::Trends;
pub use types::{
    AnalysisResult, Event, EventKind, Insight, InsightType, Score, SessionMeta, Severity,
};

/// Lens version
pub const LENS_VERSION: &str = env!("CARGO_PKG_VERSION");
