//! proctor-core — Exam attempt engine.
//!
//! This crate defines the data model, the deterministic order generator, the
//! countdown state machine, both scoring strategies, and the attempt engine
//! that ties them together behind async storage seams.

pub mod countdown;
pub mod engine;
pub mod error;
pub mod model;
pub mod ordering;
pub mod parser;
pub mod report;
pub mod scoring;
pub mod traits;
