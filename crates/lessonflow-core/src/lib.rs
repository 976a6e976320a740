//! lessonflow-core: page navigation, answer evaluation and grading for
//! branching lessons.
//!
//! This crate defines the lesson data model, the validated page graph, the
//! jump resolver and the per-kind answer evaluator that the rest of
//! lessonflow builds on.

pub mod cloze;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod graph;
pub mod model;
pub mod navigation;
pub mod parser;
pub mod report;
pub mod statistics;
pub mod store;
