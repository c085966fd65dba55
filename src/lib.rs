//! reread — read-only reentrancy detection over smart-contract
//! control-flow graphs.
//!
//! The crate consumes an already-built control-flow representation (one
//! `ir::Program` per analysis run: contracts, functions, father/son-wired
//! nodes annotated with state-variable accesses and call targets) and
//! reduces it to structured vulnerability findings.
//!
//! # Architecture
//!
//! - `ir`: the consumed graph model plus `ProgramBuilder`, the surface the
//!   graph-building front end (and the test suite) uses.
//! - `analysis`: the engine — `ReentrancyState` is the per-node monotone
//!   lattice element, `FixpointEngine` walks every function's graph merging
//!   predecessor states until nothing new is learned, and
//!   `OperationClassifier` is the injected policy for "can this operation
//!   call back / move value".
//! - `readonly_reentrancy`: the detector — reduces the stabilized per-node
//!   annotations into `(function, call-site-set)`-grouped findings.
//! - `core`: finding records, severity scales, and the `Scanner` trait the
//!   host framework drives.
//!
//! # Usage
//!
//! ```ignore
//! use reread::{ProgramBuilder, ReadOnlyReentrancyScanner, Scanner};
//!
//! let program = lower_contracts(&sources)?; // front end, out of scope here
//! let scanner = ReadOnlyReentrancyScanner::new();
//! let findings = scanner.scan(&program)?;
//! ```

pub mod analysis;
pub mod core;
pub mod ir;

pub mod readonly_reentrancy;

pub use crate::core::{Confidence, Finding, FindingMetadata, Location, Scanner, Severity};

pub use analysis::{
    BranchSide, DefaultClassifier, FixpointEngine, OperationClassifier, ReentrancyState,
};

pub use ir::{
    Contract, ContractId, Function, FunctionId, IrError, Node, NodeId, NodeKind, Operation,
    OperationKind, Program, ProgramBuilder, VarId, Variable,
};

pub use readonly_reentrancy::{
    FindingKey, FindingValue, ReadOnlyReentrancyScanner, ReentrancyGroups,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
