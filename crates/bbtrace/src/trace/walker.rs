//! ID allocation and block walking.
//!
//! One deterministic traversal of the module produces the trace plan every
//! other stage consumes: dense `func_id`s over eligible functions in
//! declaration order, dense `bb_id`s per function in block layout order,
//! per-function `inst_id` counters partitioned by instruction class, branch
//! target lists, block entry addresses, loop hints, and the printed form of
//! every instruction (captured here, before any rewriting, so the static
//! descriptor is identical whether or not hooks get inserted).

use crate::analysis::loops;
use crate::ir::{Address, Block, BlockId, Callee, Function, Inst, Module, Terminator};
use bbtrace_abi::{is_reserved, NO_LOOP};
use serde::Serialize;
use std::collections::HashMap;

/// Instruction classification used for `inst_id` partitioning and descriptor
/// records. Loads and stores share the memory id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstKind {
    Generic,
    Load,
    Store,
    Branch,
    Call,
}

/// What the walker recorded about one instruction (or terminator).
#[derive(Debug, Clone, PartialEq)]
pub struct InstNote {
    pub kind: InstKind,
    /// Dense within the kind's class scope; `None` for generic instructions.
    pub inst_id: Option<u32>,
    /// Successor `bb_id`s, present only for branches: one entry for an
    /// unconditional branch, `[true, false]` for a conditional one.
    pub targets: Option<Vec<u32>>,
    /// Printed IR of the instruction at walk time.
    pub text: String,
}

/// Per-block slice of the trace plan.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockTrace {
    pub bb_id: u32,
    /// The block's IR handle, for looking the block up during injection.
    pub block: BlockId,
    /// Display name: the block's label, or `bb_<bb_id>` if unnamed.
    pub name: String,
    /// Entry address: the function symbol for the entry block, a
    /// block-address constant otherwise.
    pub entry: Address,
    /// Innermost enclosing loop id, or [`NO_LOOP`].
    pub loop_hint: u32,
    /// Set when this block is the header of a loop.
    pub header_of: Option<u32>,
    /// One note per instruction, in order.
    pub insts: Vec<InstNote>,
    /// Classification of the terminator.
    pub terminator: InstNote,
}

/// Per-function slice of the trace plan.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncTrace {
    pub func_id: u32,
    /// Position of the function in `module.functions`.
    pub index: usize,
    pub name: String,
    pub blocks: Vec<BlockTrace>,
}

/// The whole module's trace plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleTrace {
    pub funcs: Vec<FuncTrace>,
}

/// Eligibility: a definition whose name is not runtime-reserved.
/// Declarations are silently skipped, not an error.
pub fn is_eligible(func: &Function) -> bool {
    !func.is_declaration() && !is_reserved(&func.name)
}

/// True if this call site gets instrumented. Intrinsics, inline assembly and
/// runtime-reserved callees never do.
pub fn is_instrumented_call(callee: &Callee) -> bool {
    match callee {
        Callee::Direct(name) => !is_reserved(name),
        Callee::Indirect(_) => true,
        Callee::Intrinsic(_) | Callee::Asm(_) => false,
    }
}

/// Entry address of a block: the function pointer for `bb_id` 0 (block
/// address constants for entry blocks are illegal or degenerate in the host
/// compiler), a block-address constant for every other block.
pub fn entry_address(func_name: &str, bb_id: u32, block: BlockId) -> Address {
    if bb_id == 0 {
        Address::Function(func_name.to_string())
    } else {
        Address::BlockAddr {
            func: func_name.to_string(),
            block,
        }
    }
}

/// Walk the module and build the trace plan. Total over well-formed modules;
/// never fails.
pub fn walk_module(module: &Module) -> ModuleTrace {
    let mut funcs = Vec::new();
    let mut next_func_id = 0u32;
    for (index, func) in module.functions.iter().enumerate() {
        if !is_eligible(func) {
            continue;
        }
        let func_id = next_func_id;
        next_func_id += 1;
        funcs.push(walk_function(func, func_id, index));
    }
    ModuleTrace { funcs }
}

fn walk_function(func: &Function, func_id: u32, index: usize) -> FuncTrace {
    let forest = loops::find_loops(func);
    let bb_ids: HashMap<BlockId, u32> = func
        .blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id, i as u32))
        .collect();

    let mut next_mem_id = 0u32;
    let mut next_branch_id = 0u32;
    let mut next_call_id = 0u32;

    let blocks = func
        .blocks
        .iter()
        .enumerate()
        .map(|(i, block)| {
            let bb_id = i as u32;
            let insts = block
                .insts
                .iter()
                .map(|inst| {
                    note_inst(inst, &mut next_mem_id, &mut next_call_id)
                })
                .collect();
            let terminator =
                note_terminator(&block.terminator, &bb_ids, &mut next_branch_id);
            BlockTrace {
                bb_id,
                block: block.id,
                name: block_name(block, bb_id),
                entry: entry_address(&func.name, bb_id, block.id),
                loop_hint: forest.innermost(block.id).unwrap_or(NO_LOOP),
                header_of: forest.header_of(block.id),
                insts,
                terminator,
            }
        })
        .collect();

    FuncTrace {
        func_id,
        index,
        name: func.name.clone(),
        blocks,
    }
}

fn block_name(block: &Block, bb_id: u32) -> String {
    block
        .name
        .clone()
        .unwrap_or_else(|| format!("bb_{}", bb_id))
}

fn note_inst(inst: &Inst, next_mem_id: &mut u32, next_call_id: &mut u32) -> InstNote {
    let mut take = |counter: &mut u32| {
        let id = *counter;
        *counter += 1;
        Some(id)
    };
    let (kind, inst_id) = match inst {
        Inst::Load { .. } => (InstKind::Load, take(next_mem_id)),
        Inst::Store { .. } => (InstKind::Store, take(next_mem_id)),
        Inst::Call { callee, .. } if is_instrumented_call(callee) => {
            (InstKind::Call, take(next_call_id))
        }
        _ => (InstKind::Generic, None),
    };
    InstNote {
        kind,
        inst_id,
        targets: None,
        text: inst.to_string(),
    }
}

fn note_terminator(
    term: &Terminator,
    bb_ids: &HashMap<BlockId, u32>,
    next_branch_id: &mut u32,
) -> InstNote {
    let targets = match term {
        Terminator::Jump { target } => Some(vec![bb_ids[target]]),
        Terminator::BranchIf {
            if_true, if_false, ..
        } => Some(vec![bb_ids[if_true], bb_ids[if_false]]),
        Terminator::Return { .. } | Terminator::Unreachable => None,
    };
    let (kind, inst_id) = if targets.is_some() {
        let id = *next_branch_id;
        *next_branch_id += 1;
        (InstKind::Branch, Some(id))
    } else {
        (InstKind::Generic, None)
    };
    InstNote {
        kind,
        inst_id,
        targets,
        text: term.to_string(),
    }
}
