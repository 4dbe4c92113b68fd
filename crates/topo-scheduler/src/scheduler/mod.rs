//! Scoring of candidate hosts for a workload.

pub mod priority;

pub use priority::Priority;
