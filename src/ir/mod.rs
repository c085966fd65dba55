//! The control-flow representation the analysis consumes.
//!
//! A `Program` is built once by the graph-building front end (or by
//! `ProgramBuilder` in tests) and never mutated afterwards: contracts own
//! their declared functions and state variables, functions own an ordered
//! set of nodes wired by father/son edges, and every node already carries
//! the state variables it reads/writes, its call targets, and its low-level
//! operations. Detectors only ever attach analysis state *keyed by* node
//! identity; they never write into the graph itself.

pub mod builder;

pub use builder::ProgramBuilder;

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_type {
    ($name:ident, $what:literal) => {
        #[doc = concat!("Index of a ", $what, " in its `Program` arena.")]
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

id_type!(ContractId, "contract");
id_type!(FunctionId, "function");
id_type!(NodeId, "control-flow node");
id_type!(VarId, "state variable");

#[derive(Debug, Error)]
pub enum IrError {
    #[error("unknown contract id {0:?}")]
    UnknownContract(ContractId),
    #[error("unknown function id {0:?}")]
    UnknownFunction(FunctionId),
    #[error("unknown node id {0:?}")]
    UnknownNode(NodeId),
    #[error("unknown variable id {0:?}")]
    UnknownVariable(VarId),
    #[error("function '{0}' has no nodes")]
    EmptyFunction(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Entry,
    Statement,
    /// Conditional branch; sons[0] is the true branch, sons[1] the false one.
    If,
    /// Loop-header conditional; same son convention as `If`.
    IfLoop,
    Return,
}

impl NodeKind {
    pub fn is_conditional(self) -> bool {
        matches!(self, NodeKind::If | NodeKind::IfLoop)
    }
}

/// A low-level operation inside a node, tagged with the node that issued it.
/// Nodes inlined from internal calls keep their own `node` backref, so call
/// sites discovered through inlining are attributed to the callee node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub node: NodeId,
    pub kind: OperationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    InternalCall(FunctionId),
    HighLevelCall {
        target: ContractId,
        function: FunctionId,
    },
    /// `address.call{...}(...)` and friends: destination unresolved.
    LowLevelCall,
    Send,
    Transfer,
    EmitEvent(String),
    Other,
}

impl OperationKind {
    pub fn event_name(&self) -> Option<&str> {
        match self {
            OperationKind::EmitEvent(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub id: VarId,
    pub name: String,
    pub contract: ContractId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub function: FunctionId,
    pub fathers: Vec<NodeId>,
    pub sons: Vec<NodeId>,
    /// State variables this node reads/writes locally (not via calls).
    pub vars_read: Vec<VarId>,
    pub vars_written: Vec<VarId>,
    /// Same-contract call targets, inlined by the analysis.
    pub internal_calls: Vec<FunctionId>,
    /// Cross-contract call targets with the callee contract identity.
    pub high_level_calls: Vec<(ContractId, FunctionId)>,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub contract: ContractId,
    pub entry: Option<NodeId>,
    pub nodes: Vec<NodeId>,
    /// Declared mutability: true for functions that perform no state writes.
    pub is_view: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub name: String,
    /// Declared functions and modifiers, in declaration order.
    pub functions: Vec<FunctionId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub(crate) contracts: Vec<Contract>,
    pub(crate) functions: Vec<Function>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) variables: Vec<Variable>,
}

impl Program {
    pub fn contracts(&self) -> &[Contract] {
        &self.contracts
    }

    pub fn contract(&self, id: ContractId) -> Result<&Contract, IrError> {
        self.contracts
            .get(id.index())
            .ok_or(IrError::UnknownContract(id))
    }

    pub fn function(&self, id: FunctionId) -> Result<&Function, IrError> {
        self.functions
            .get(id.index())
            .ok_or(IrError::UnknownFunction(id))
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, IrError> {
        self.nodes.get(id.index()).ok_or(IrError::UnknownNode(id))
    }

    pub fn variable(&self, id: VarId) -> Result<&Variable, IrError> {
        self.variables
            .get(id.index())
            .ok_or(IrError::UnknownVariable(id))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
