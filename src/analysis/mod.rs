//! The dataflow analysis: lattice state, operation classification, and the
//! fixpoint traversal engine.

pub mod classify;
pub mod engine;
pub mod state;

pub use classify::{BranchSide, DefaultClassifier, OperationClassifier};
pub use engine::FixpointEngine;
pub use state::{AccessFacts, CallFacts, NodeSet, ReentrancyState};
