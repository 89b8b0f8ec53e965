// src/dag/mod.rs

//! Dependency graph resolution.
//!
//! - [`resolver`] computes the transitive closure of a requested task set.
//! - [`validate`] checks conflicts and cycles and produces a launch order.
//! - [`graph`] holds the validated result.

pub mod graph;
pub mod resolver;
pub mod validate;

pub use graph::ResolvedGraph;
pub use resolver::resolve;
