//! Programmatic construction of `Program` graphs.
//!
//! The real front end lowers parsed contracts into this form; tests build
//! their fixtures through the same surface so detectors never see a graph
//! the builder would have rejected.

use crate::ir::{
    Contract, ContractId, Function, FunctionId, IrError, Node, NodeId, NodeKind, Operation,
    OperationKind, Program, VarId, Variable,
};

#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contract(&mut self, name: &str) -> ContractId {
        let id = ContractId(self.program.contracts.len() as u32);
        self.program.contracts.push(Contract {
            id,
            name: name.to_string(),
            functions: Vec::new(),
        });
        id
    }

    pub fn variable(&mut self, contract: ContractId, name: &str) -> Result<VarId, IrError> {
        self.check_contract(contract)?;
        let id = VarId(self.program.variables.len() as u32);
        self.program.variables.push(Variable {
            id,
            name: name.to_string(),
            contract,
        });
        Ok(id)
    }

    pub fn function(
        &mut self,
        contract: ContractId,
        name: &str,
        is_view: bool,
    ) -> Result<FunctionId, IrError> {
        self.check_contract(contract)?;
        let id = FunctionId(self.program.functions.len() as u32);
        self.program.functions.push(Function {
            id,
            name: name.to_string(),
            contract,
            entry: None,
            nodes: Vec::new(),
            is_view,
        });
        self.program.contracts[contract.index()].functions.push(id);
        Ok(id)
    }

    /// Adds a node to `function`. The first node added becomes the entry.
    pub fn node(&mut self, function: FunctionId, kind: NodeKind) -> Result<NodeId, IrError> {
        self.check_function(function)?;
        let id = NodeId(self.program.nodes.len() as u32);
        self.program.nodes.push(Node {
            id,
            kind,
            function,
            fathers: Vec::new(),
            sons: Vec::new(),
            vars_read: Vec::new(),
            vars_written: Vec::new(),
            internal_calls: Vec::new(),
            high_level_calls: Vec::new(),
            operations: Vec::new(),
        });
        let func = &mut self.program.functions[function.index()];
        func.nodes.push(id);
        if func.entry.is_none() {
            func.entry = Some(id);
        }
        Ok(id)
    }

    /// Wires a father/son edge in both directions.
    pub fn edge(&mut self, father: NodeId, son: NodeId) -> Result<(), IrError> {
        self.check_node(father)?;
        self.check_node(son)?;
        self.program.nodes[father.index()].sons.push(son);
        self.program.nodes[son.index()].fathers.push(father);
        Ok(())
    }

    pub fn read(&mut self, node: NodeId, var: VarId) -> Result<(), IrError> {
        self.check_node(node)?;
        self.check_variable(var)?;
        self.program.nodes[node.index()].vars_read.push(var);
        Ok(())
    }

    pub fn write(&mut self, node: NodeId, var: VarId) -> Result<(), IrError> {
        self.check_node(node)?;
        self.check_variable(var)?;
        self.program.nodes[node.index()].vars_written.push(var);
        Ok(())
    }

    pub fn internal_call(&mut self, node: NodeId, callee: FunctionId) -> Result<(), IrError> {
        self.check_node(node)?;
        self.check_function(callee)?;
        let n = &mut self.program.nodes[node.index()];
        n.internal_calls.push(callee);
        n.operations.push(Operation {
            node,
            kind: OperationKind::InternalCall(callee),
        });
        Ok(())
    }

    pub fn high_level_call(
        &mut self,
        node: NodeId,
        target: ContractId,
        callee: FunctionId,
    ) -> Result<(), IrError> {
        self.check_node(node)?;
        self.check_contract(target)?;
        self.check_function(callee)?;
        let n = &mut self.program.nodes[node.index()];
        n.high_level_calls.push((target, callee));
        n.operations.push(Operation {
            node,
            kind: OperationKind::HighLevelCall {
                target,
                function: callee,
            },
        });
        Ok(())
    }

    pub fn low_level_call(&mut self, node: NodeId) -> Result<(), IrError> {
        self.op(node, OperationKind::LowLevelCall)
    }

    pub fn send(&mut self, node: NodeId) -> Result<(), IrError> {
        self.op(node, OperationKind::Send)
    }

    pub fn transfer(&mut self, node: NodeId) -> Result<(), IrError> {
        self.op(node, OperationKind::Transfer)
    }

    pub fn emit_event(&mut self, node: NodeId, name: &str) -> Result<(), IrError> {
        self.op(node, OperationKind::EmitEvent(name.to_string()))
    }

    pub fn op(&mut self, node: NodeId, kind: OperationKind) -> Result<(), IrError> {
        self.check_node(node)?;
        self.program.nodes[node.index()]
            .operations
            .push(Operation { node, kind });
        Ok(())
    }

    pub fn finish(self) -> Result<Program, IrError> {
        for func in &self.program.functions {
            if func.nodes.is_empty() {
                return Err(IrError::EmptyFunction(func.name.clone()));
            }
        }
        Ok(self.program)
    }

    fn check_contract(&self, id: ContractId) -> Result<(), IrError> {
        if id.index() < self.program.contracts.len() {
            Ok(())
        } else {
            Err(IrError::UnknownContract(id))
        }
    }

    fn check_function(&self, id: FunctionId) -> Result<(), IrError> {
        if id.index() < self.program.functions.len() {
            Ok(())
        } else {
            Err(IrError::UnknownFunction(id))
        }
    }

    fn check_node(&self, id: NodeId) -> Result<(), IrError> {
        if id.index() < self.program.nodes.len() {
            Ok(())
        } else {
            Err(IrError::UnknownNode(id))
        }
    }

    fn check_variable(&self, id: VarId) -> Result<(), IrError> {
        if id.index() < self.program.variables.len() {
            Ok(())
        } else {
            Err(IrError::UnknownVariable(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_are_wired_both_ways() -> Result<(), IrError> {
        let mut b = ProgramBuilder::new();
        let c = b.contract("C");
        let f = b.function(c, "f", false)?;
        let n0 = b.node(f, NodeKind::Entry)?;
        let n1 = b.node(f, NodeKind::Statement)?;
        b.edge(n0, n1)?;
        let program = b.finish()?;

        assert_eq!(program.node(n0)?.sons, vec![n1]);
        assert_eq!(program.node(n1)?.fathers, vec![n0]);
        assert_eq!(program.function(f)?.entry, Some(n0));
        Ok(())
    }

    #[test]
    fn empty_function_is_rejected() {
        let mut b = ProgramBuilder::new();
        let c = b.contract("C");
        b.function(c, "f", false).unwrap();
        assert!(matches!(b.finish(), Err(IrError::EmptyFunction(_))));
    }

    #[test]
    fn high_level_call_records_target_and_operation() -> Result<(), IrError> {
        let mut b = ProgramBuilder::new();
        let a = b.contract("A");
        let c = b.contract("C");
        let callee = b.function(a, "callee", false)?;
        b.node(callee, NodeKind::Entry)?;
        let f = b.function(c, "f", false)?;
        let n = b.node(f, NodeKind::Statement)?;
        b.high_level_call(n, a, callee)?;
        let program = b.finish()?;

        let node = program.node(n)?;
        assert_eq!(node.high_level_calls, vec![(a, callee)]);
        assert_eq!(node.operations.len(), 1);
        Ok(())
    }
}
