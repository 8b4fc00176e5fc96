//! Domain value types shared across the pipeline.

pub mod content;

pub use content::{FailureReport, StepRecord, StructuredContent, parse_model_output};
