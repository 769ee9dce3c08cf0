//! Engine session bridge and two-pass mistake analysis.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod session;
pub mod severity;
pub mod uci;

pub use analyzer::{AnalysisSettings, Candidate, Mistake, PositionEvaluator};
pub use config::WorkerConfig;
pub use error::WorkerError;
pub use session::{with_engine, EngineSession};
pub use severity::{Severity, SeverityThresholds};
