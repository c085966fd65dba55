//! Read-only reentrancy detection.
//!
//! A state variable is read through a view path while another function can
//! still rewrite it before the external call that enabled reentrancy has
//! finished: the contract's invariant is temporarily broken and a reader
//! observing it mid-break can be exploited. Classic reentrancy detectors
//! miss this because the vulnerable function writes nothing — the damage is
//! done in whoever trusts its return value.
//!
//! The detector runs the fixpoint engine over every function, then reduces
//! the stabilized per-node annotations in two passes: first collect, per
//! variable, the nodes that wrote it after an external call on some
//! reaching path (plus the contracts those writes belong to); then flag
//! every read of such a variable that escapes the ordinary reentrancy
//! classes — reads from other contracts' storage, and own-contract reads
//! performed by view functions. External reads are only flagged when the
//! contract that was read is itself among the post-call writers, so a read
//! of contract B's variable is not blamed on contract C's unrelated write.
//!
//! The heuristic accepts false positives and false negatives by design; it
//! ranks paths, it does not verify them.

use crate::analysis::{DefaultClassifier, FixpointEngine, NodeSet, OperationClassifier, ReentrancyState};
use crate::core::{Confidence, Finding, Location, Scanner, Severity};
use crate::ir::{ContractId, FunctionId, NodeId, Program, VarId};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Groups findings that share a reading function and the call sites
/// recorded on the path to the read. The ordered calls map doubles as the
/// order-independent comparable form of the call-site set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FindingKey {
    pub function: FunctionId,
    pub calls: BTreeMap<NodeId, NodeSet>,
}

/// One vulnerable read: the variable, the nodes that wrote it after a
/// call, the node whose state recorded the read, and every read site that
/// contributed to that record. Node lists are id-sorted for determinism.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FindingValue {
    pub variable: VarId,
    pub written_at: Vec<NodeId>,
    pub node: NodeId,
    pub nodes: Vec<NodeId>,
}

pub type ReentrancyGroups = BTreeMap<FindingKey, BTreeSet<FindingValue>>;

/// Pass-1 output: post-call write sites per variable, split by whether the
/// write was observed locally or inside an external callee, plus the
/// contracts that performed such writes.
#[derive(Debug, Default)]
struct WritesAfterReentrancy {
    local: BTreeMap<VarId, NodeSet>,
    external: BTreeMap<VarId, NodeSet>,
    contracts: BTreeMap<VarId, BTreeSet<ContractId>>,
}

pub struct ReadOnlyReentrancyScanner {
    classifier: Box<dyn OperationClassifier>,
}

impl ReadOnlyReentrancyScanner {
    pub fn new() -> Self {
        Self {
            classifier: Box::new(DefaultClassifier),
        }
    }

    pub fn with_classifier(classifier: Box<dyn OperationClassifier>) -> Self {
        Self { classifier }
    }

    /// Runs the full analysis and returns the grouped structured results.
    /// Hosts that want the raw tuples instead of rendered `Finding`
    /// records consume this directly.
    pub fn analyze(&self, program: &Program) -> Result<ReentrancyGroups> {
        let mut engine = FixpointEngine::new(program, self.classifier.as_ref());
        engine.run()?;
        let annotations = engine.into_annotations();
        self.readonly_reentrancies(program, &annotations)
    }

    /// Pass 1: every node whose state records a call site other than
    /// itself contributes its write provenance to the per-variable
    /// written-after-call maps.
    fn find_writes_after_reentrancy(
        &self,
        program: &Program,
        annotations: &HashMap<NodeId, ReentrancyState>,
    ) -> Result<WritesAfterReentrancy> {
        let mut writes = WritesAfterReentrancy::default();

        for contract in program.contracts() {
            for function_id in &contract.functions {
                let function = program.function(*function_id)?;
                for node_id in &function.nodes {
                    // Unannotated nodes are dead code; skip them.
                    let Some(state) = annotations.get(node_id) else {
                        continue;
                    };
                    if state.calls.calls.is_empty() {
                        continue;
                    }
                    // A node trivially calling itself is not "after" a call.
                    if !state.calls.calls.keys().any(|caller| caller != node_id) {
                        continue;
                    }
                    for var in state.access.written.keys() {
                        writes.local.entry(*var).or_default().insert(*node_id);
                        writes
                            .contracts
                            .entry(*var)
                            .or_default()
                            .insert(contract.id);
                    }
                    for var in state.access.written_external.keys() {
                        writes.external.entry(*var).or_default().insert(*node_id);
                        writes
                            .contracts
                            .entry(*var)
                            .or_default()
                            .insert(contract.id);
                    }
                }
            }
        }

        Ok(writes)
    }

    /// Pass 2: reduce every annotated read against the pass-1 maps.
    fn readonly_reentrancies(
        &self,
        program: &Program,
        annotations: &HashMap<NodeId, ReentrancyState>,
    ) -> Result<ReentrancyGroups> {
        let writes = self.find_writes_after_reentrancy(program, annotations)?;
        let mut result = ReentrancyGroups::new();

        for contract in program.contracts() {
            for function_id in &contract.functions {
                let function = program.function(*function_id)?;
                for node_id in &function.nodes {
                    let Some(state) = annotations.get(node_id) else {
                        continue;
                    };

                    let mut vulnerable: BTreeSet<FindingValue> = BTreeSet::new();

                    for (var, read_nodes) in &state.access.reads {
                        // A non-view function reading its own contract's
                        // variable is the ordinary reentrancy class,
                        // reported elsewhere.
                        let variable = program.variable(*var)?;
                        if variable.contract == function.contract && !function.is_view {
                            continue;
                        }
                        if let Some(writers) = writes.local.get(var) {
                            vulnerable.insert(FindingValue {
                                variable: *var,
                                written_at: writers.iter().copied().collect(),
                                node: *node_id,
                                nodes: read_nodes.iter().copied().collect(),
                            });
                        }
                    }

                    for (var, read_nodes) in &state.access.reads_external {
                        if let Some(writers) = writes.external.get(var) {
                            // Only blame an external read if the contract
                            // that was read is itself a post-call writer.
                            let consistent = state
                                .access
                                .reads_external_contracts
                                .get(var)
                                .is_some_and(|readers| {
                                    writes.contracts.get(var).is_some_and(|writers| {
                                        readers.iter().any(|c| writers.contains(c))
                                    })
                                });
                            if consistent {
                                debug!(
                                    function = %function.name,
                                    variable = %program.variable(*var)?.name,
                                    "external read of externally rewritten variable"
                                );
                                vulnerable.insert(FindingValue {
                                    variable: *var,
                                    written_at: writers.iter().copied().collect(),
                                    node: *node_id,
                                    nodes: read_nodes.iter().copied().collect(),
                                });
                            }
                        }
                        if let Some(writers) = writes.local.get(var) {
                            debug!(
                                function = %function.name,
                                variable = %program.variable(*var)?.name,
                                "external read of locally rewritten variable"
                            );
                            vulnerable.insert(FindingValue {
                                variable: *var,
                                written_at: writers.iter().copied().collect(),
                                node: *node_id,
                                nodes: read_nodes.iter().copied().collect(),
                            });
                        }
                    }

                    if !vulnerable.is_empty() {
                        let key = FindingKey {
                            function: function.id,
                            calls: state.calls.calls.clone(),
                        };
                        result.entry(key).or_default().extend(vulnerable);
                    }
                }
            }
        }

        Ok(result)
    }

    fn build_finding(
        &self,
        program: &Program,
        key: &FindingKey,
        values: &BTreeSet<FindingValue>,
    ) -> Result<Finding> {
        let function = program.function(key.function)?;
        let contract = program.contract(function.contract)?;

        // Render order matches the grouping's determinism guarantee.
        let mut sorted: Vec<&FindingValue> = values.iter().collect();
        let mut names: BTreeMap<VarId, &str> = BTreeMap::new();
        for value in &sorted {
            names.insert(value.variable, &program.variable(value.variable)?.name);
        }
        sorted.sort_by_key(|v| (names[&v.variable], v.node));

        let mut description = format!(
            "Function '{}' of contract '{}' reads state that a pending external call can still rewrite:\n",
            function.name, contract.name
        );
        let mut locations = Vec::new();
        let mut finding = Finding::new(
            self.id().to_string(),
            self.severity(),
            self.confidence(),
            format!("Read-only reentrancy in '{}'", function.name),
            String::new(),
        )
        .with_contract(&contract.name)
        .with_function(&function.name);

        let mut seen_vars = BTreeSet::new();
        for value in sorted {
            let read_node = program.node(value.node)?;
            let read_function = program.function(read_node.function)?;
            description.push_str(&format!(
                "- '{}' is read at node {} in '{}'",
                names[&value.variable], value.node.0, read_function.name
            ));
            let co_reads: Vec<String> = value
                .nodes
                .iter()
                .filter(|n| **n != value.node)
                .map(|n| n.0.to_string())
                .collect();
            if !co_reads.is_empty() {
                description.push_str(&format!(" (via nodes {})", co_reads.join(", ")));
            }
            let writers: Vec<String> = value
                .written_at
                .iter()
                .filter(|n| **n != value.node)
                .map(|n| n.0.to_string())
                .collect();
            description.push_str(&format!(
                " and written after the external call(s) at node(s) {}\n",
                writers.join(", ")
            ));

            locations.push(Location::new(
                contract.name.clone(),
                read_function.name.clone(),
                value.node.0,
            ));
            for writer in &value.written_at {
                let write_node = program.node(*writer)?;
                let write_function = program.function(write_node.function)?;
                let write_contract = program.contract(write_function.contract)?;
                locations.push(Location::new(
                    write_contract.name.clone(),
                    write_function.name.clone(),
                    writer.0,
                ));
            }

            if seen_vars.insert(value.variable) {
                finding = finding.with_variable(names[&value.variable]);
            }
        }

        finding.description = description;
        Ok(finding.with_locations(locations))
    }

    /// An unexpected internal fault becomes a single degraded finding,
    /// never an abort of the whole run.
    fn degraded_finding(error: anyhow::Error) -> Finding {
        Finding::new(
            "readonly-reentrancy".to_string(),
            Severity::Low,
            Confidence::Low,
            "Read-only reentrancy analysis failed".to_string(),
            format!(
                "The read-only reentrancy analysis could not complete: {error:#}. \
                 Findings from this detector are unavailable for this run."
            ),
        )
        .with_finding_type("analysis-error".to_string())
    }
}

impl Default for ReadOnlyReentrancyScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for ReadOnlyReentrancyScanner {
    fn id(&self) -> &'static str {
        "readonly-reentrancy"
    }

    fn name(&self) -> &'static str {
        "Read-Only Reentrancy Scanner"
    }

    fn description(&self) -> &'static str {
        "Detects state variables exposed through view paths while a reentrant \
         execution can still rewrite them before the enabling external call returns"
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    fn scan(&self, program: &Program) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();
        let rendered = self.analyze(program).and_then(|groups| {
            groups
                .iter()
                .map(|(key, values)| self.build_finding(program, key, values))
                .collect::<Result<Vec<_>>>()
        });
        match rendered {
            Ok(list) => findings.extend(list),
            Err(error) => {
                debug!(%error, "read-only reentrancy analysis degraded");
                findings.push(Self::degraded_finding(error));
            }
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionId, NodeKind, ProgramBuilder};

    #[test]
    fn internal_fault_degrades_to_single_finding() -> Result<()> {
        let mut b = ProgramBuilder::new();
        let c = b.contract("Broken");
        let f = b.function(c, "f", false)?;
        let entry = b.node(f, NodeKind::Entry)?;
        let mut program = b.finish()?;
        // Simulate a front-end bug: a call target that was never lowered.
        program.nodes[entry.index()]
            .internal_calls
            .push(FunctionId(99));

        let scanner = ReadOnlyReentrancyScanner::new();
        let findings = scanner.scan(&program)?;

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].finding_type, "analysis-error");
        assert_eq!(findings[0].scanner_id, "readonly-reentrancy");
        Ok(())
    }

    #[test]
    fn scanner_identity() {
        let scanner = ReadOnlyReentrancyScanner::new();
        assert_eq!(scanner.id(), "readonly-reentrancy");
        assert_eq!(scanner.severity(), Severity::Low);
        assert_eq!(scanner.confidence(), Confidence::Medium);
    }
}
