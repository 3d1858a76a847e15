//! Basic-block partitioning, the flow graph built from it, and a
//! reaching-definitions dataflow analysis over the result.
//!
//! This module is diagnostic only — nothing downstream (codegen) reads
//! its output. It backs the `flowgraph` and `dataflow` CLI subcommands,
//! which exist so a reader can inspect the compiler's own understanding
//! of control flow and variable liveness.
//!
//! Every instruction across the *entire program* (not per function)
//! gets one globally unique step index, matching how label names are
//! generated: the `if`/`while`/`and`/`or` counters in [`crate::ir`] are
//! shared across every function body, so a label is unique program-wide
//! and a single flat index space is safe to reason about.

use crate::ir::{FunctionIr, Instruction, Variable};
use std::collections::{BTreeSet, HashMap};

pub type Step = i64;

/// A basic block opens right before a `Label` (when the current block
/// is non-empty) and closes right after a `Jump`/`CondJump`. Every block
/// produced by this module's construction starts with a `Label`: the
/// IR generator never falls through into an unlabeled join point.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub function: String,
    pub label: String,
    pub instructions: Vec<(Step, Instruction)>,
}

pub struct FlowGraph {
    pub blocks: Vec<BasicBlock>,
    /// label -> successor labels, in then/else order for a `CondJump`.
    pub edges: HashMap<String, Vec<String>>,
}

pub fn build_flow_graph(functions: &FunctionIr) -> FlowGraph {
    let mut blocks = Vec::new();
    let mut step: Step = 0;

    for (name, instructions) in functions {
        let mut current: Vec<(Step, Instruction)> = Vec::new();
        for instr in instructions {
            if matches!(instr, Instruction::Label { .. }) && !current.is_empty() {
                blocks.push(finish_block(name, std::mem::take(&mut current)));
            }
            current.push((step, instr.clone()));
            step += 1;
            if matches!(instr, Instruction::Jump { .. } | Instruction::CondJump { .. }) {
                blocks.push(finish_block(name, std::mem::take(&mut current)));
            }
        }
        if !current.is_empty() {
            blocks.push(finish_block(name, current));
        }
    }

    let mut edges = HashMap::new();
    for (i, block) in blocks.iter().enumerate() {
        let mut successors = Vec::new();
        if let Some((_, last)) = block.instructions.last() {
            match last {
                Instruction::Jump { label, .. } => successors.push(label.clone()),
                Instruction::CondJump {
                    then_label, else_label, ..
                } => {
                    successors.push(then_label.clone());
                    successors.push(else_label.clone());
                }
                _ => {
                    if let Some(next) = blocks.get(i + 1) {
                        if next.function == block.function {
                            successors.push(next.label.clone());
                        }
                    }
                }
            }
        }
        edges.insert(block.label.clone(), successors);
    }

    FlowGraph { blocks, edges }
}

fn finish_block(function: &str, instructions: Vec<(Step, Instruction)>) -> BasicBlock {
    let label = match &instructions[0].1 {
        Instruction::Label { name, .. } => name.clone(),
        _ => format!("<unlabeled block in {function}>"),
    };
    BasicBlock {
        function: function.to_string(),
        label,
        instructions,
    }
}

/// A reaching-definitions state: for each variable, the set of step
/// indices of instructions whose definition might still be live here.
/// `-1` means "imported/global" (a builtin or another function's name
/// seen as a `Call` target); `-2` means "declared but not yet defined
/// on this path".
pub type State = HashMap<String, BTreeSet<i64>>;

pub struct ReachingDefinitions {
    pub inp: Vec<State>,
    pub outp: Vec<State>,
}

impl ReachingDefinitions {
    pub fn at(&self, step: Step) -> (&State, &State) {
        (&self.inp[step as usize], &self.outp[step as usize])
    }
}

pub fn analyze(graph: &FlowGraph) -> ReachingDefinitions {
    let total_steps: usize = graph.blocks.iter().map(|b| b.instructions.len()).sum();
    if total_steps == 0 {
        return ReachingDefinitions {
            inp: Vec::new(),
            outp: Vec::new(),
        };
    }

    let mut variables: BTreeSet<String> = BTreeSet::new();
    for block in &graph.blocks {
        for (_, instr) in &block.instructions {
            for v in instr.referenced_vars() {
                variables.insert(v.0.clone());
            }
        }
    }
    let empty_state = || -> State { variables.iter().map(|v| (v.clone(), BTreeSet::new())).collect() };

    let mut inp: Vec<State> = vec![empty_state(); total_steps];
    let mut outp: Vec<State> = vec![empty_state(); total_steps];

    let mut initial = empty_state();
    for block in &graph.blocks {
        for (_, instr) in &block.instructions {
            mark_initial(instr, &mut initial);
        }
    }
    inp[0] = initial;

    let mut predecessors: HashMap<&str, Vec<Step>> = HashMap::new();
    for block in &graph.blocks {
        if let Some((step, last)) = block.instructions.last() {
            match last {
                Instruction::Jump { label, .. } => predecessors.entry(label.as_str()).or_default().push(*step),
                Instruction::CondJump {
                    then_label, else_label, ..
                } => {
                    predecessors.entry(then_label.as_str()).or_default().push(*step);
                    predecessors.entry(else_label.as_str()).or_default().push(*step);
                }
                _ => {}
            }
        }
    }

    loop {
        let mut changed = false;

        for block in &graph.blocks {
            if let Some((first_step, Instruction::Label { name, .. })) = block.instructions.first() {
                if let Some(preds) = predecessors.get(name.as_str()) {
                    let merged = merge(preds, &outp);
                    if merged != inp[*first_step as usize] {
                        inp[*first_step as usize] = merged;
                        changed = true;
                    }
                }
            }

            for (idx, (step, instr)) in block.instructions.iter().enumerate() {
                let new_out = transfer(&inp[*step as usize], *step, instr);
                if new_out != outp[*step as usize] {
                    outp[*step as usize] = new_out;
                    changed = true;
                }
                if let Some((next_step, _)) = block.instructions.get(idx + 1) {
                    if inp[*next_step as usize] != outp[*step as usize] {
                        inp[*next_step as usize] = outp[*step as usize].clone();
                        changed = true;
                    }
                }
            }
        }

        if !changed {
            break;
        }
    }

    ReachingDefinitions { inp, outp }
}

fn merge(preds: &[Step], outp: &[State]) -> State {
    let mut merged: State = HashMap::new();
    for &p in preds {
        for (var, defs) in &outp[p as usize] {
            merged.entry(var.clone()).or_default().extend(defs.iter().copied());
        }
    }
    merged
}

fn transfer(in_state: &State, step: Step, instr: &Instruction) -> State {
    let mut out = in_state.clone();
    if let Some(dest) = instr.defines() {
        let mut s = BTreeSet::new();
        s.insert(step);
        out.insert(dest.0.clone(), s);
    }
    out
}

fn mark_initial(instr: &Instruction, state: &mut State) {
    let not_yet_defined = || BTreeSet::from([-2]);
    let imported = || BTreeSet::from([-1]);
    let mark = |state: &mut State, var: &Variable, set: BTreeSet<i64>| {
        state.insert(var.0.clone(), set);
    };
    match instr {
        Instruction::LoadIntConst { dest, .. } | Instruction::LoadBoolConst { dest, .. } => {
            mark(state, dest, not_yet_defined());
        }
        Instruction::LoadIntParam { symbol, dest, .. }
        | Instruction::LoadBoolParam { symbol, dest, .. }
        | Instruction::LoadPointerParam { symbol, dest, .. } => {
            mark(state, symbol, not_yet_defined());
            mark(state, dest, not_yet_defined());
        }
        Instruction::Copy { source, dest, .. } | Instruction::CopyPointer { source, dest, .. } => {
            mark(state, source, not_yet_defined());
            mark(state, dest, not_yet_defined());
        }
        Instruction::Call { fun, args, dest, .. } => {
            mark(state, fun, imported());
            for a in args {
                mark(state, a, not_yet_defined());
            }
            mark(state, dest, not_yet_defined());
        }
        Instruction::CondJump { cond, .. } => mark(state, cond, not_yet_defined()),
        Instruction::ReturnValue { var, .. } => mark(state, var, not_yet_defined()),
        Instruction::Jump { .. } | Instruction::Label { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::generate;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::typechecker::typecheck_module;

    fn flow_graph(source: &str) -> FlowGraph {
        let tokens = tokenize(source, "test.vl").unwrap();
        let mut module = parse(tokens).unwrap();
        typecheck_module(&mut module).unwrap();
        let ir = generate(&module).unwrap();
        build_flow_graph(&ir)
    }

    #[test]
    fn every_block_starts_with_a_label() {
        let graph = flow_graph("var x: Int = 0; while x < 10 do { x = x + 1 }");
        for block in &graph.blocks {
            assert!(matches!(block.instructions[0].1, Instruction::Label { .. }));
        }
    }

    #[test]
    fn a_while_loop_has_a_back_edge_into_its_own_condition_block() {
        let graph = flow_graph("var x: Int = 0; while x < 10 do { x = x + 1 }");
        let start_label = graph
            .blocks
            .iter()
            .find(|b| b.label.starts_with("while_start"))
            .unwrap()
            .label
            .clone();
        let body_label = graph
            .blocks
            .iter()
            .find(|b| b.label.starts_with("while_body"))
            .unwrap()
            .label
            .clone();
        assert!(graph.edges[&body_label].contains(&start_label));
    }

    #[test]
    fn reaching_definitions_reach_the_loop_header_from_both_predecessors() {
        let graph = flow_graph("var x: Int = 0; while x < 10 do { x = x + 1 }");
        let defs = analyze(&graph);
        // The while-condition block is entered both from the code before
        // the loop and from the loop body's back edge, so its `in` set
        // for `x` should contain more than one reaching definition once
        // the fixpoint settles (the initial def, plus the def from the
        // loop body).
        let start_block = graph.blocks.iter().find(|b| b.label.starts_with("while_start")).unwrap();
        let (first_step, _) = start_block.instructions[0];
        let x_var = graph.blocks[0]
            .instructions
            .iter()
            .find_map(|(_, i)| match i {
                Instruction::Copy { dest, .. } => Some(dest.0.clone()),
                _ => None,
            })
            .unwrap();
        let (in_state, _) = defs.at(first_step);
        assert!(in_state.get(&x_var).map(|s| s.len()).unwrap_or(0) >= 1);
    }
}
