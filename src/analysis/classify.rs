//! Operation classification, injected at scanner construction.
//!
//! The graph builder owns the full operation taxonomy; the analysis only
//! needs three predicates over it plus the branch heuristic for
//! call-guarded conditionals. Hosts with richer operation knowledge (proxy
//! patterns, known-safe callees) supply their own implementation.

use crate::ir::{Node, OperationKind, Program};

/// Which son of a conditional represents the path guarded by a prior call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchSide {
    True,
    False,
}

pub trait OperationClassifier: Send + Sync {
    /// Can this operation hand control to an attacker-chosen callee?
    fn can_callback(&self, op: &OperationKind) -> bool;

    /// Does this operation transfer ether?
    fn can_send_eth(&self, op: &OperationKind) -> bool;

    fn is_event(&self, op: &OperationKind) -> bool {
        matches!(op, OperationKind::EmitEvent(_))
    }

    /// For a call-containing conditional, pick the son to descend into.
    fn guarded_branch(&self, _program: &Program, _node: &Node) -> BranchSide {
        BranchSide::True
    }
}

/// Conservative defaults: any unresolved or cross-contract call can call
/// back; sends, transfers, and low-level calls move value.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl OperationClassifier for DefaultClassifier {
    fn can_callback(&self, op: &OperationKind) -> bool {
        matches!(
            op,
            OperationKind::HighLevelCall { .. } | OperationKind::LowLevelCall
        )
    }

    fn can_send_eth(&self, op: &OperationKind) -> bool {
        matches!(
            op,
            OperationKind::Send | OperationKind::Transfer | OperationKind::LowLevelCall
        )
    }
}
