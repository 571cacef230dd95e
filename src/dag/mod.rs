// src/dag/mod.rs

//! Concept graph access and dependency resolution.
//!
//! - [`graph`] is a read-only view over concepts and their typed edges.
//! - [`resolver`] orders a set of concepts so prerequisites come first,
//!   breaking cycles deterministically.

pub mod graph;
pub mod resolver;

pub use graph::{GraphAccessor, Neighbor, PrerequisiteLookup};
pub use resolver::{DependencyResolver, ResolvedOrder};
