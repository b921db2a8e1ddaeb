//! Per-record explanation with rule-based recovery, and the batch driver on top.

pub mod batch;
pub mod fallback;
pub mod generator;
pub mod prompt;
pub mod quality;

pub use batch::{BatchOptions, BatchOrchestrator};
pub use fallback::{fallback_explanation, FALLBACK_CONFIDENCE};
pub use generator::ExplanationGenerator;
pub use prompt::{compose_prompt, ScenarioOverrides};
pub use quality::validate_explanation;
