//! Shared helpers over the IR shape.
//!
//! Used by the analyses and by the instrumentation pass: successor lists,
//! variable-use traversal, destination/type recovery, and fresh-variable
//! allocation.

use super::types::*;
use std::collections::HashMap;

/// Returns the successor block IDs for a terminator, in successor order.
pub fn terminator_successors(term: &Terminator) -> Vec<BlockId> {
    match term {
        Terminator::Return { .. } | Terminator::Unreachable => vec![],
        Terminator::Jump { target } => vec![*target],
        Terminator::BranchIf {
            if_true, if_false, ..
        } => vec![*if_true, *if_false],
    }
}

/// Calls `f` with every variable read by an operand.
fn operand_use<F: FnMut(VarId)>(op: &Operand, f: &mut F) {
    if let Operand::Var(v) = op {
        f(*v);
    }
}

/// Calls `f` with every variable read by `inst`.
pub fn for_each_use<F: FnMut(VarId)>(inst: &Inst, mut f: F) {
    match inst {
        Inst::Const { .. } => {}
        Inst::BinOp { lhs, rhs, .. } | Inst::Cmp { lhs, rhs, .. } => {
            f(*lhs);
            f(*rhs);
        }
        Inst::Load { addr, .. } => f(*addr),
        Inst::Store { value, addr, .. } => {
            f(*value);
            f(*addr);
        }
        Inst::Call { callee, args, .. } => {
            if let Callee::Indirect(v) = callee {
                f(*v);
            }
            for arg in args {
                operand_use(arg, &mut f);
            }
        }
        Inst::Select {
            cond,
            if_true,
            if_false,
            ..
        } => {
            f(*cond);
            operand_use(if_true, &mut f);
            operand_use(if_false, &mut f);
        }
        Inst::Cast { src, .. } => f(*src),
    }
}

/// Returns the variable an instruction defines together with its type, or
/// `None` for side-effect-only instructions.
pub fn inst_dest(inst: &Inst) -> Option<(VarId, Ty)> {
    match inst {
        Inst::Const { dest, value } => Some((*dest, value.ty())),
        Inst::BinOp { dest, ty, .. } => Some((*dest, *ty)),
        Inst::Cmp { dest, .. } => Some((*dest, Ty::I1)),
        Inst::Load { dest, ty, .. } => Some((*dest, *ty)),
        Inst::Store { .. } => None,
        Inst::Call { dest, .. } => *dest,
        Inst::Select { dest, ty, .. } => Some((*dest, *ty)),
        Inst::Cast { dest, to, .. } => Some((*dest, *to)),
    }
}

/// Builds the variable-to-type map for a function body from parameters and
/// instruction destinations.
pub fn type_map(func: &Function) -> HashMap<VarId, Ty> {
    let mut types: HashMap<VarId, Ty> = func.params.iter().copied().collect();
    for block in &func.blocks {
        for inst in &block.insts {
            if let Some((dest, ty)) = inst_dest(inst) {
                types.insert(dest, ty);
            }
        }
    }
    types
}

/// First variable id not used anywhere in the function. New instructions
/// inserted by a pass allocate upward from here.
pub fn next_var_id(func: &Function) -> u32 {
    let mut max: Option<u32> = None;
    let mut note = |v: VarId| {
        max = Some(max.map_or(v.0, |m| m.max(v.0)));
    };
    for (v, _) in &func.params {
        note(*v);
    }
    for block in &func.blocks {
        for inst in &block.insts {
            if let Some((dest, _)) = inst_dest(inst) {
                note(dest);
            }
            for_each_use(inst, &mut note);
        }
        match &block.terminator {
            Terminator::Return { value: Some(v) } => note(*v),
            Terminator::BranchIf { cond, .. } => note(*cond),
            _ => {}
        }
    }
    max.map_or(0, |m| m + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ret_block(id: u32, insts: Vec<Inst>) -> Block {
        Block {
            id: BlockId(id),
            name: None,
            insts,
            terminator: Terminator::Return { value: None },
        }
    }

    #[test]
    fn successors_by_terminator() {
        assert!(terminator_successors(&Terminator::Return { value: None }).is_empty());
        assert!(terminator_successors(&Terminator::Unreachable).is_empty());
        assert_eq!(
            terminator_successors(&Terminator::Jump {
                target: BlockId(4)
            }),
            vec![BlockId(4)]
        );
        assert_eq!(
            terminator_successors(&Terminator::BranchIf {
                cond: VarId(0),
                if_true: BlockId(1),
                if_false: BlockId(2),
            }),
            vec![BlockId(1), BlockId(2)]
        );
    }

    #[test]
    fn uses_cover_operands_and_indirect_callees() {
        let call = Inst::Call {
            dest: None,
            callee: Callee::Indirect(VarId(7)),
            args: vec![
                Operand::Var(VarId(1)),
                Operand::U32(3),
                Operand::Addr(Address::Function("f".to_string())),
            ],
        };
        let mut seen = vec![];
        for_each_use(&call, |v| seen.push(v.0));
        assert_eq!(seen, vec![7, 1]);
    }

    #[test]
    fn type_map_covers_params_and_dests() {
        let func = Function {
            name: "f".to_string(),
            params: vec![(VarId(0), Ty::Ptr)],
            ret: None,
            variadic: false,
            blocks: vec![ret_block(
                0,
                vec![
                    Inst::Load {
                        dest: VarId(1),
                        ty: Ty::I64,
                        addr: VarId(0),
                    },
                    Inst::Cmp {
                        dest: VarId(2),
                        pred: CmpPred::Eq,
                        ty: Ty::I64,
                        lhs: VarId(1),
                        rhs: VarId(1),
                    },
                ],
            )],
        };
        let types = type_map(&func);
        assert_eq!(types[&VarId(0)], Ty::Ptr);
        assert_eq!(types[&VarId(1)], Ty::I64);
        assert_eq!(types[&VarId(2)], Ty::I1);
        assert_eq!(types.len(), 3);
    }

    #[test]
    fn next_var_id_scans_defs_and_uses() {
        let empty = Function {
            name: "e".to_string(),
            params: vec![],
            ret: None,
            variadic: false,
            blocks: vec![ret_block(0, vec![])],
        };
        assert_eq!(next_var_id(&empty), 0);

        let func = Function {
            name: "f".to_string(),
            params: vec![(VarId(0), Ty::I32)],
            ret: None,
            variadic: false,
            blocks: vec![Block {
                id: BlockId(0),
                name: None,
                insts: vec![Inst::Store {
                    ty: Ty::I32,
                    value: VarId(0),
                    addr: VarId(9),
                }],
                terminator: Terminator::Return { value: None },
            }],
        };
        // v9 is only ever read, but it still blocks reuse.
        assert_eq!(next_var_id(&func), 10);
    }
}
