pub mod engine;
pub mod model;
pub mod store;
pub mod thresholds;

pub use engine::ThresholdEngine;
pub use model::{ActionType, Decision, DecisionError, MetricSnapshot, Severity};
pub use store::{DecisionStore, SaveOutcome, StoreError};
pub use thresholds::{DecisionRules, ThresholdConfig, ThresholdConfigError};
