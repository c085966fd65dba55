//! The per-node dataflow lattice element.
//!
//! Every mapping here only ever grows as more predecessor paths are merged
//! in; there is no element removal, which is what guarantees the traversal
//! reaches a fixpoint on a finite graph. Ordered collections keep the
//! accumulated facts deterministic across runs.

use crate::analysis::classify::OperationClassifier;
use crate::ir::{ContractId, NodeId, Program, VarId};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type NodeSet = BTreeSet<NodeId>;

/// Call, value-transfer, and event facts shared with the plain reentrancy
/// detectors. Consumed as-is by the read-only synthesis; never redefined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallFacts {
    /// For every node that issued an external call on some path reaching
    /// here, the set of call sites attributed to it.
    pub calls: BTreeMap<NodeId, NodeSet>,
    pub send_eth: BTreeMap<NodeId, NodeSet>,
    pub events: BTreeMap<String, NodeSet>,
}

/// Read/write provenance, locally and through external callees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessFacts {
    /// Every node where the variable was read on some path reaching here,
    /// including nodes pulled in from internally-called functions.
    pub reads: BTreeMap<VarId, NodeSet>,
    /// Write sites contributed by this node itself (local plus inlined
    /// internal calls). Deliberately not re-merged from fathers.
    pub written: BTreeMap<VarId, NodeSet>,
    pub reads_external: BTreeMap<VarId, NodeSet>,
    pub written_external: BTreeMap<VarId, NodeSet>,
    /// Which contracts performed each external read; pass 2 of the
    /// synthesis checks these against the post-call writer contracts.
    pub reads_external_contracts: BTreeMap<VarId, BTreeSet<ContractId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReentrancyState {
    pub calls: CallFacts,
    pub access: AccessFacts,
}

fn union_into<K: Ord + Clone, V: Ord + Clone>(
    dst: &mut BTreeMap<K, BTreeSet<V>>,
    src: &BTreeMap<K, BTreeSet<V>>,
) {
    for (key, values) in src {
        dst.entry(key.clone()).or_default().extend(values.iter().cloned());
    }
}

fn union_filtered(
    dst: &mut BTreeMap<NodeId, NodeSet>,
    src: &BTreeMap<NodeId, NodeSet>,
    skip_keys: Option<&NodeSet>,
) {
    for (key, values) in src {
        if skip_keys.is_some_and(|skip| skip.contains(key)) {
            continue;
        }
        dst.entry(*key).or_default().extend(values.iter().copied());
    }
}

fn is_subset<K: Ord, V: Ord>(
    candidate: &BTreeMap<K, BTreeSet<V>>,
    reference: &BTreeMap<K, BTreeSet<V>>,
) -> bool {
    candidate.iter().all(|(key, values)| {
        reference
            .get(key)
            .is_some_and(|held| values.is_subset(held))
    })
}

impl ReentrancyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Element-wise union of every mapping. Commutative, associative,
    /// idempotent.
    pub fn merge(&mut self, other: &Self) {
        union_into(&mut self.calls.calls, &other.calls.calls);
        union_into(&mut self.calls.send_eth, &other.calls.send_eth);
        union_into(&mut self.calls.events, &other.calls.events);
        union_into(&mut self.access.reads, &other.access.reads);
        union_into(&mut self.access.written, &other.access.written);
        union_into(&mut self.access.reads_external, &other.access.reads_external);
        union_into(
            &mut self.access.written_external,
            &other.access.written_external,
        );
        union_into(
            &mut self.access.reads_external_contracts,
            &other.access.reads_external_contracts,
        );
    }

    /// True iff `candidate` carries no information not already held here.
    /// The engine's fixpoint termination check.
    pub fn subsumes(&self, candidate: &Self) -> bool {
        is_subset(&candidate.calls.calls, &self.calls.calls)
            && is_subset(&candidate.calls.send_eth, &self.calls.send_eth)
            && is_subset(&candidate.calls.events, &self.calls.events)
            && is_subset(&candidate.access.reads, &self.access.reads)
            && is_subset(&candidate.access.reads_external, &self.access.reads_external)
            && is_subset(
                &candidate.access.reads_external_contracts,
                &self.access.reads_external_contracts,
            )
    }

    /// Merges the call/value-send facts of every annotated father of
    /// `node`, skipping entries keyed by a pruned conditional. Read/write
    /// provenance is intentionally not re-merged here; it flows through the
    /// cumulative bookkeeping of `analyze_node` instead.
    pub fn merge_fathers(
        &mut self,
        program: &Program,
        node: NodeId,
        skip_keys: Option<&NodeSet>,
        annotations: &HashMap<NodeId, ReentrancyState>,
    ) -> Result<()> {
        for father in &program.node(node)?.fathers {
            if let Some(father_state) = annotations.get(father) {
                union_filtered(&mut self.calls.calls, &father_state.calls.calls, skip_keys);
                union_filtered(
                    &mut self.calls.send_eth,
                    &father_state.calls.send_eth,
                    skip_keys,
                );
            }
        }
        Ok(())
    }

    /// Applies the node's own contribution on top of the merged
    /// predecessor facts: local reads/writes, inlined internal-call
    /// effects (attributed to the callee's nodes), external-call effects
    /// into the `*_external` bundles, and operation classification.
    ///
    /// Returns whether this node issued or inlined an external call; the
    /// engine uses that to decide branch-pruning eligibility.
    pub fn analyze_node<C: OperationClassifier + ?Sized>(
        &mut self,
        program: &Program,
        node_id: NodeId,
        classifier: &C,
        annotations: &HashMap<NodeId, ReentrancyState>,
    ) -> Result<bool> {
        let node = program.node(node_id)?;

        let mut reads: BTreeMap<VarId, NodeSet> = BTreeMap::new();
        let mut written: BTreeMap<VarId, NodeSet> = BTreeMap::new();
        for var in &node.vars_read {
            reads.entry(*var).or_default().insert(node_id);
        }
        for var in &node.vars_written {
            written.entry(*var).or_default().insert(node_id);
        }

        // Internal calls are inlined: their reads/writes belong to the
        // callee's nodes, and their operations count as this node's.
        let mut inlined_ops = Vec::new();
        for callee in &node.internal_calls {
            let function = program.function(*callee)?;
            for callee_node_id in &function.nodes {
                let callee_node = program.node(*callee_node_id)?;
                for var in &callee_node.vars_read {
                    reads.entry(*var).or_default().insert(*callee_node_id);
                }
                for var in &callee_node.vars_written {
                    written.entry(*var).or_default().insert(*callee_node_id);
                }
                inlined_ops.extend(callee_node.operations.iter());
            }
        }

        let mut reads_external: BTreeMap<VarId, NodeSet> = BTreeMap::new();
        let mut written_external: BTreeMap<VarId, NodeSet> = BTreeMap::new();
        let mut read_contracts: BTreeMap<VarId, BTreeSet<ContractId>> = BTreeMap::new();
        for (target, callee) in &node.high_level_calls {
            let function = program.function(*callee)?;
            for callee_node_id in &function.nodes {
                let callee_node = program.node(*callee_node_id)?;
                for var in &callee_node.vars_read {
                    reads_external.entry(*var).or_default().insert(*callee_node_id);
                    read_contracts.entry(*var).or_default().insert(*target);
                }
                // Reads the callee itself performed externally propagate
                // one level up, still attributed to the calling contract.
                if let Some(callee_state) = annotations.get(callee_node_id) {
                    for var in callee_state.access.reads_external.keys() {
                        reads_external.entry(*var).or_default().insert(*callee_node_id);
                        read_contracts.entry(*var).or_default().insert(*target);
                    }
                }
                for var in &callee_node.vars_written {
                    written_external
                        .entry(*var)
                        .or_default()
                        .insert(*callee_node_id);
                }
            }
        }

        // Write provenance is this node's contribution alone.
        self.access.written = written;
        self.access.written_external = written_external;

        let mut contains_call = false;
        for op in node.operations.iter().chain(inlined_ops) {
            if classifier.can_callback(&op.kind) {
                self.calls.calls.entry(node_id).or_default().insert(op.node);
                contains_call = true;
            }
            if classifier.can_send_eth(&op.kind) {
                self.calls
                    .send_eth
                    .entry(node_id)
                    .or_default()
                    .insert(op.node);
            }
            if classifier.is_event(&op.kind) {
                if let Some(name) = op.kind.event_name() {
                    self.calls
                        .events
                        .entry(name.to_string())
                        .or_default()
                        .extend([op.node, node_id]);
                }
            }
        }

        union_into(&mut self.access.reads, &reads);
        union_into(&mut self.access.reads_external, &reads_external);
        union_into(&mut self.access.reads_external_contracts, &read_contracts);

        Ok(contains_call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_read(var: u32, node: u32) -> ReentrancyState {
        let mut state = ReentrancyState::new();
        state
            .access
            .reads
            .entry(VarId(var))
            .or_default()
            .insert(NodeId(node));
        state
    }

    #[test]
    fn merge_is_idempotent() {
        let mut state = state_with_read(0, 1);
        state.calls.calls.entry(NodeId(1)).or_default().insert(NodeId(2));

        let snapshot = state.clone();
        let other = state.clone();
        state.merge(&other);
        assert_eq!(state, snapshot);
    }

    #[test]
    fn merge_only_grows() {
        let mut state = state_with_read(0, 1);
        let other = state_with_read(0, 2);
        state.merge(&other);
        assert_eq!(
            state.access.reads[&VarId(0)],
            BTreeSet::from([NodeId(1), NodeId(2)])
        );

        // Merging more predecessors never removes anything.
        let third = state_with_read(1, 3);
        let before = state.clone();
        state.merge(&third);
        assert!(state.subsumes(&before));
    }

    #[test]
    fn subsumes_detects_new_information() {
        let held = state_with_read(0, 1);
        let known = state_with_read(0, 1);
        let novel = state_with_read(0, 2);

        assert!(held.subsumes(&known));
        assert!(!held.subsumes(&novel));
        assert!(held.subsumes(&ReentrancyState::new()));
    }
}
