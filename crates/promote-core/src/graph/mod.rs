//! Hierarchy materialization.
//!
//! ## Submodules
//!
//! - [`tree`]: the [`Registry`] arena and [`build_tree`], which turns the
//!   flat edge list into a forest.
//! - [`batch`]: page-size bounded record fetching with soft failure.

pub mod batch;
pub mod tree;

pub use batch::{BatchFailure, DEFAULT_PAGE_SIZE};
pub use tree::{BuildOutcome, Registry, TreeError, build_tree};
