//! Traversal-engine behavior on synthetic graphs: termination on cycles,
//! branch pruning, and the consumed call/value/event facts.

use anyhow::Result;
use reread::{DefaultClassifier, FixpointEngine, NodeKind, ProgramBuilder};

#[test]
fn traversal_terminates_on_cyclic_graph() -> Result<()> {
    let mut b = ProgramBuilder::new();
    let c = b.contract("Looper");
    let x = b.variable(c, "x")?;
    let f = b.function(c, "drain", false)?;

    let entry = b.node(f, NodeKind::Entry)?;
    let head = b.node(f, NodeKind::IfLoop)?;
    let body = b.node(f, NodeKind::Statement)?;
    let exit = b.node(f, NodeKind::Return)?;
    b.edge(entry, head)?;
    b.edge(head, body)?;
    b.edge(head, exit)?;
    b.edge(body, head)?; // back edge
    b.low_level_call(body)?;
    b.write(body, x)?;

    let program = b.finish()?;
    let classifier = DefaultClassifier;
    let mut engine = FixpointEngine::new(&program, &classifier);
    engine.run()?;

    let annotations = engine.annotations();
    assert!(annotations.contains_key(&exit), "exit node was analyzed");
    assert!(annotations.contains_key(&body), "loop body was analyzed");
    Ok(())
}

#[test]
fn call_guarded_conditional_prunes_one_branch() -> Result<()> {
    // `cond` contains the call and branches to `taken`/`skipped`; `skipped`
    // is also reachable through `other`, which carries no call facts.
    let mut b = ProgramBuilder::new();
    let c = b.contract("Guarded");
    let f = b.function(c, "run", false)?;

    let entry = b.node(f, NodeKind::Entry)?;
    let cond = b.node(f, NodeKind::If)?;
    let other = b.node(f, NodeKind::Statement)?;
    let taken = b.node(f, NodeKind::Statement)?;
    let skipped = b.node(f, NodeKind::Statement)?;
    b.edge(entry, cond)?;
    b.edge(entry, other)?;
    b.edge(cond, taken)?;
    b.edge(cond, skipped)?;
    b.edge(other, skipped)?;
    b.low_level_call(cond)?;

    let program = b.finish()?;
    let classifier = DefaultClassifier;
    let mut engine = FixpointEngine::new(&program, &classifier);
    engine.run()?;
    let annotations = engine.annotations();

    // The selected branch inherits the call fact from the conditional.
    let taken_state = annotations.get(&taken).expect("taken branch analyzed");
    assert!(taken_state.calls.calls.contains_key(&cond));

    // The skipped branch is still analyzed (through `other`), but without
    // the conditional's call fact flowing in through the pruned edge.
    let skipped_state = annotations.get(&skipped).expect("skipped branch analyzed");
    assert!(skipped_state.calls.calls.is_empty());
    Ok(())
}

#[test]
fn value_transfers_and_events_are_recorded() -> Result<()> {
    let mut b = ProgramBuilder::new();
    let c = b.contract("Payer");
    let f = b.function(c, "payout", false)?;
    let entry = b.node(f, NodeKind::Entry)?;
    let pay = b.node(f, NodeKind::Statement)?;
    b.edge(entry, pay)?;
    b.send(pay)?;
    b.emit_event(pay, "Paid")?;

    let program = b.finish()?;
    let classifier = DefaultClassifier;
    let mut engine = FixpointEngine::new(&program, &classifier);
    engine.run()?;
    let annotations = engine.annotations();

    let state = annotations.get(&pay).expect("pay node analyzed");
    assert!(state.calls.send_eth.contains_key(&pay));
    assert!(state.calls.events.contains_key("Paid"));
    // A bare `send` is a value transfer, not a reentrancy-enabling call.
    assert!(state.calls.calls.is_empty());
    Ok(())
}
