//! stepdoc library crate.
//!
//! Turns screen recordings into narrated step-by-step manuals: upload a
//! video, let the analyzer extract steps, synthesize narration per step,
//! optionally stitch branded intro/outro segments, publish.

pub mod analyzer;
pub mod api;
pub mod compositor;
pub mod config;
pub mod context;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod synthesizer;

pub use error::{Error, Result};
