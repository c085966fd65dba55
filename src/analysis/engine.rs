//! Fixpoint traversal over every function's control-flow graph.
//!
//! One traversal run per function entry, but node annotations persist and
//! keep refining across runs, so effects of already-analyzed callees are
//! visible to later callers. The walk is an explicit work-stack depth-first
//! descent: a per-frame path list suppresses cycles within a single
//! descent, while the global subsumption memo terminates re-exploration
//! once a node's accumulated state stops growing.

use crate::analysis::classify::{BranchSide, OperationClassifier};
use crate::analysis::state::{NodeSet, ReentrancyState};
use crate::ir::{NodeId, Program};
use anyhow::Result;
use std::collections::HashMap;
use tracing::trace;

pub struct FixpointEngine<'a, C: OperationClassifier + ?Sized> {
    program: &'a Program,
    classifier: &'a C,
    /// Accumulated per-node state across all paths and all runs; only ever
    /// merged into. The subsumption check against it is the termination
    /// criterion.
    visited_all_paths: HashMap<NodeId, ReentrancyState>,
    /// The node's current annotation: merged predecessor facts plus the
    /// node's own contribution, replaced on each effective visit. Synthesis
    /// reads these after `run` returns.
    annotations: HashMap<NodeId, ReentrancyState>,
    /// For a son cut off by branch pruning: conditional nodes whose
    /// call/value facts must not flow in when the son is merged through
    /// its remaining predecessors.
    skip_keys: HashMap<NodeId, NodeSet>,
}

impl<'a, C: OperationClassifier + ?Sized> FixpointEngine<'a, C> {
    pub fn new(program: &'a Program, classifier: &'a C) -> Self {
        Self {
            program,
            classifier,
            visited_all_paths: HashMap::new(),
            annotations: HashMap::new(),
            skip_keys: HashMap::new(),
        }
    }

    /// Walks every declared function of every contract, in declaration
    /// order, and leaves the stabilized annotations behind.
    pub fn run(&mut self) -> Result<()> {
        for contract in self.program.contracts() {
            for function_id in &contract.functions {
                let function = self.program.function(*function_id)?;
                if let Some(entry) = function.entry {
                    trace!(function = %function.name, "exploring function");
                    self.explore(entry)?;
                }
            }
        }
        Ok(())
    }

    pub fn annotations(&self) -> &HashMap<NodeId, ReentrancyState> {
        &self.annotations
    }

    pub fn into_annotations(self) -> HashMap<NodeId, ReentrancyState> {
        self.annotations
    }

    fn explore(&mut self, entry: NodeId) -> Result<()> {
        let mut stack: Vec<(NodeId, Vec<NodeId>)> = vec![(entry, Vec::new())];

        while let Some((node_id, mut path)) = stack.pop() {
            // Loop back-edge within this descent; the global memo handles
            // convergence, not unbounded revisiting.
            if path.contains(&node_id) {
                continue;
            }
            path.push(node_id);

            let node = self.program.node(node_id)?;

            let mut fathers_context = ReentrancyState::new();
            fathers_context.merge_fathers(
                self.program,
                node_id,
                self.skip_keys.get(&node_id),
                &self.annotations,
            )?;

            // This path brought nothing new; fixpoint reached on this branch.
            if let Some(memo) = self.visited_all_paths.get(&node_id) {
                if memo.subsumes(&fathers_context) {
                    trace!(node = node_id.0, "state subsumed, pruning descent");
                    continue;
                }
            }
            self.visited_all_paths
                .entry(node_id)
                .or_default()
                .merge(&fathers_context);

            let mut state = fathers_context;
            let contains_call =
                state.analyze_node(self.program, node_id, self.classifier, &self.annotations)?;
            self.annotations.insert(node_id, state);

            if contains_call && node.kind.is_conditional() && node.sons.len() == 2 {
                // Call-guarded conditional: descend only into the branch
                // the heuristic selects. The other son stays reachable
                // through its remaining fathers, minus this node's call
                // facts.
                let (taken, skipped) = match self.classifier.guarded_branch(self.program, node) {
                    BranchSide::True => (node.sons[0], node.sons[1]),
                    BranchSide::False => (node.sons[1], node.sons[0]),
                };
                trace!(node = node_id.0, taken = taken.0, skipped = skipped.0, "pruning branch");
                self.skip_keys.entry(skipped).or_default().insert(node_id);
                stack.push((taken, path));
            } else {
                for son in node.sons.iter().rev() {
                    stack.push((*son, path.clone()));
                }
            }
        }
        Ok(())
    }
}
