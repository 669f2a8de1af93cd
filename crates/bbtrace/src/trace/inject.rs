//! Instrumentation injection.
//!
//! Rewrites each eligible function according to the walker's plan: one
//! `on_basic_block` call at every block's first insertion point (plus
//! `on_loop` for loop headers), `on_mem` immediately before each load and
//! store, `on_call` with marshalled arguments before each instrumented call,
//! `on_branch` before the branch terminator, and a `.bbtrace_inst` record at
//! every memory/call site. Per module it also registers a constructor and
//! destructor that bracket the run with `register_module` / `finalize`.
//!
//! Hooks observe the state *just prior to* the operation they describe: the
//! record asm goes first, then any marshalling casts, then the hook call,
//! then the original instruction.

use super::hooks::declare_hooks;
use super::pcmap;
use super::walker::{FuncTrace, InstKind, ModuleTrace};
use crate::ir::utils::{next_var_id, type_map};
use crate::ir::{
    Address, Block, BlockId, Callee, CastOp, DataField, DataGlobal, Function, InitEntry, Inst,
    Module, Operand, TargetLayout, Terminator, Ty, VarId,
};
use bbtrace_abi::{
    ArgKind, INIT_PRIORITY, SYM_FINALIZE, SYM_ON_BASIC_BLOCK, SYM_ON_BRANCH, SYM_ON_CALL,
    SYM_ON_LOOP, SYM_ON_MEM, SYM_REGISTER_MODULE,
};
use std::collections::HashMap;

/// Symbol of the private global holding the module id as a C string.
pub const MODULE_NAME_GLOBAL: &str = "__bbtrace_module_name";

/// Symbols of the generated constructor/destructor pair. The names are
/// private; only their presence and priority are part of the contract.
pub const MODULE_CTOR: &str = "__bbtrace_module_ctor";
pub const MODULE_DTOR: &str = "__bbtrace_module_dtor";

/// Apply the full instrumentation to a walked module.
pub fn inject_module(module: &mut Module, trace: &ModuleTrace) {
    declare_hooks(module);
    register_lifecycle(module);
    let layout = module.layout;
    for func in &trace.funcs {
        inject_function(&mut module.functions[func.index], layout, func);
    }
}

/// Fresh-variable allocator for one function.
struct VarAlloc {
    next: u32,
}

impl VarAlloc {
    fn fresh(&mut self) -> VarId {
        let v = VarId(self.next);
        self.next += 1;
        v
    }
}

fn hook_call(sym: &str, args: Vec<Operand>) -> Inst {
    Inst::Call {
        dest: None,
        callee: Callee::Direct(sym.to_string()),
        args,
    }
}

/// Emit the module-name global, the ctor/dtor functions and their platform
/// registrations at priority 0.
fn register_lifecycle(module: &mut Module) {
    module.globals.push(DataGlobal {
        name: MODULE_NAME_GLOBAL.to_string(),
        section: None,
        align: 1,
        internal: true,
        constant: true,
        retained: false,
        init: vec![DataField::CStr(module.id.clone())],
    });

    let ctor = lifecycle_func(
        MODULE_CTOR,
        hook_call(
            SYM_REGISTER_MODULE,
            vec![Operand::Addr(Address::Global(MODULE_NAME_GLOBAL.to_string()))],
        ),
    );
    let dtor = lifecycle_func(MODULE_DTOR, hook_call(SYM_FINALIZE, vec![]));
    module.functions.push(ctor);
    module.functions.push(dtor);
    module.ctors.push(InitEntry {
        priority: INIT_PRIORITY,
        func: MODULE_CTOR.to_string(),
    });
    module.dtors.push(InitEntry {
        priority: INIT_PRIORITY,
        func: MODULE_DTOR.to_string(),
    });
}

fn lifecycle_func(name: &str, call: Inst) -> Function {
    Function {
        name: name.to_string(),
        params: vec![],
        ret: None,
        variadic: false,
        blocks: vec![Block {
            id: BlockId(0),
            name: None,
            insts: vec![call],
            terminator: Terminator::Return { value: None },
        }],
    }
}

fn inject_function(func: &mut Function, layout: TargetLayout, plan: &FuncTrace) {
    let types = type_map(func);
    let mut vars = VarAlloc {
        next: next_var_id(func),
    };
    let fid = plan.func_id;

    for bt in &plan.blocks {
        let block = &mut func.blocks[bt.bb_id as usize];
        let originals = std::mem::take(&mut block.insts);
        let mut insts = Vec::with_capacity(originals.len() + 4);

        // Block entry hooks come before every per-instruction hook.
        insts.push(hook_call(
            SYM_ON_BASIC_BLOCK,
            vec![
                Operand::U32(fid),
                Operand::U32(bt.bb_id),
                Operand::U32(bt.loop_hint),
                Operand::Addr(bt.entry.clone()),
            ],
        ));
        if let Some(loop_id) = bt.header_of {
            insts.push(hook_call(
                SYM_ON_LOOP,
                vec![Operand::U32(fid), Operand::U32(loop_id)],
            ));
        }

        for (inst, note) in originals.into_iter().zip(&bt.insts) {
            match (note.kind, note.inst_id) {
                (InstKind::Load, Some(inst_id)) | (InstKind::Store, Some(inst_id)) => {
                    let (addr, ty, is_store) = match &inst {
                        Inst::Load { addr, ty, .. } => (*addr, *ty, false),
                        Inst::Store { addr, ty, .. } => (*addr, *ty, true),
                        other => unreachable!("memory note on {other}"),
                    };
                    insts.push(pcmap::inst_pc_record(fid, bt.bb_id, inst_id));
                    insts.push(hook_call(
                        SYM_ON_MEM,
                        vec![
                            Operand::U32(fid),
                            Operand::U32(bt.bb_id),
                            Operand::U32(inst_id),
                            Operand::Var(addr),
                            Operand::U64(layout.store_size(&ty)),
                            Operand::Bool(is_store),
                        ],
                    ));
                    insts.push(inst);
                }
                (InstKind::Call, Some(inst_id)) => {
                    insts.push(pcmap::inst_pc_record(fid, bt.bb_id, inst_id));
                    let hook = build_call_hook(
                        &inst, fid, bt.bb_id, inst_id, &types, layout, &mut insts, &mut vars,
                    );
                    insts.push(hook);
                    insts.push(inst);
                }
                _ => insts.push(inst),
            }
        }

        // Branch hook, inserted before the terminator.
        if let (InstKind::Branch, Some(inst_id)) = (bt.terminator.kind, bt.terminator.inst_id) {
            let targets = bt
                .terminator
                .targets
                .as_deref()
                .expect("branch note without targets");
            let (taken_bb, taken_addr) = match (&block.terminator, targets) {
                (Terminator::Jump { .. }, [target]) => (
                    Operand::U32(*target),
                    Operand::Addr(plan.blocks[*target as usize].entry.clone()),
                ),
                (Terminator::BranchIf { cond, .. }, [if_true, if_false]) => {
                    // Materialize the taken target with selects on the branch
                    // condition: successor 0 when true, successor 1 when false.
                    let taken_bb = vars.fresh();
                    insts.push(Inst::Select {
                        dest: taken_bb,
                        ty: Ty::I32,
                        cond: *cond,
                        if_true: Operand::U32(*if_true),
                        if_false: Operand::U32(*if_false),
                    });
                    let taken_addr = vars.fresh();
                    insts.push(Inst::Select {
                        dest: taken_addr,
                        ty: Ty::Ptr,
                        cond: *cond,
                        if_true: Operand::Addr(plan.blocks[*if_true as usize].entry.clone()),
                        if_false: Operand::Addr(plan.blocks[*if_false as usize].entry.clone()),
                    });
                    (Operand::Var(taken_bb), Operand::Var(taken_addr))
                }
                (term, targets) => unreachable!("branch note {targets:?} on {term}"),
            };
            insts.push(hook_call(
                SYM_ON_BRANCH,
                vec![
                    Operand::U32(fid),
                    Operand::U32(bt.bb_id),
                    Operand::U32(inst_id),
                    taken_bb,
                    taken_addr,
                ],
            ));
        }

        block.insts = insts;
    }
}

/// Build the `on_call` hook for an instrumented call site, pushing the
/// return-address intrinsic and any marshalling casts first.
#[allow(clippy::too_many_arguments)]
fn build_call_hook(
    call: &Inst,
    fid: u32,
    bb_id: u32,
    inst_id: u32,
    types: &HashMap<VarId, Ty>,
    layout: TargetLayout,
    insts: &mut Vec<Inst>,
    vars: &mut VarAlloc,
) -> Inst {
    let Inst::Call { callee, args, .. } = call else {
        unreachable!("call note on {call}");
    };

    let call_site = vars.fresh();
    insts.push(Inst::Call {
        dest: Some((call_site, Ty::Ptr)),
        callee: Callee::Intrinsic("returnaddress".to_string()),
        args: vec![Operand::U32(0)],
    });

    let target = match callee {
        Callee::Direct(name) => Operand::Addr(Address::Function(name.clone())),
        Callee::Indirect(ptr) => Operand::Var(*ptr),
        other => unreachable!("instrumented call with callee {other:?}"),
    };

    let mut hook_args = vec![
        Operand::U32(fid),
        Operand::U32(bb_id),
        Operand::U32(inst_id),
        Operand::Var(call_site),
        target,
        Operand::U32(args.len() as u32),
    ];
    for arg in args {
        let (kind, bitwidth, value) = marshal_arg(arg, types, layout, insts, vars);
        hook_args.push(Operand::U32(kind as u32));
        hook_args.push(Operand::U32(bitwidth));
        hook_args.push(value);
    }
    hook_call(SYM_ON_CALL, hook_args)
}

/// Normalize one call argument into a `(kind, bitwidth, value)` triple whose
/// value occupies exactly 64 bits. No sign extension is ever performed;
/// integers wider than 64 bits keep only their low 64 bits. Anything
/// unrepresentable degrades to `{kind: unknown, value: 0}`.
fn marshal_arg(
    arg: &Operand,
    types: &HashMap<VarId, Ty>,
    layout: TargetLayout,
    insts: &mut Vec<Inst>,
    vars: &mut VarAlloc,
) -> (ArgKind, u32, Operand) {
    match arg {
        Operand::Var(v) => match types.get(v) {
            Some(Ty::Ptr) => {
                let bits = layout.ptr_bits();
                let as_int = push_cast(insts, vars, CastOp::PtrToInt, *v, Ty::Int { bits });
                let wide = widen_to_64(insts, vars, as_int, bits);
                (ArgKind::Pointer, bits, Operand::Var(wide))
            }
            Some(Ty::Int { bits }) => {
                let wide = widen_to_64(insts, vars, *v, *bits);
                (ArgKind::Integer, *bits, Operand::Var(wide))
            }
            Some(Ty::F32) => {
                let as_int = push_cast(insts, vars, CastOp::Bitcast, *v, Ty::Int { bits: 32 });
                let wide = widen_to_64(insts, vars, as_int, 32);
                (ArgKind::Float, 32, Operand::Var(wide))
            }
            Some(Ty::F64) => {
                let as_int = push_cast(insts, vars, CastOp::Bitcast, *v, Ty::Int { bits: 64 });
                (ArgKind::Float, 64, Operand::Var(as_int))
            }
            Some(Ty::Agg { store_bytes }) => {
                let bits = store_bytes
                    .saturating_mul(8)
                    .clamp(1, u64::from(u32::MAX)) as u32;
                (ArgKind::Unknown, bits, Operand::U64(0))
            }
            None => (ArgKind::Unknown, 1, Operand::U64(0)),
        },
        Operand::U32(v) => (ArgKind::Integer, 32, Operand::U64(u64::from(*v))),
        Operand::U64(v) => (ArgKind::Integer, 64, Operand::U64(*v)),
        Operand::Bool(v) => (ArgKind::Integer, 1, Operand::U64(u64::from(*v))),
        // Link-time addresses are already pointer-wide relocations; they ride
        // in the value slot as-is.
        Operand::Addr(addr) => (
            ArgKind::Pointer,
            layout.ptr_bits(),
            Operand::Addr(addr.clone()),
        ),
    }
}

fn push_cast(insts: &mut Vec<Inst>, vars: &mut VarAlloc, op: CastOp, src: VarId, to: Ty) -> VarId {
    let dest = vars.fresh();
    insts.push(Inst::Cast { dest, op, src, to });
    dest
}

/// Zero-extend or truncate an integer variable into the 64-bit value slot.
fn widen_to_64(insts: &mut Vec<Inst>, vars: &mut VarAlloc, v: VarId, bits: u32) -> VarId {
    match bits.cmp(&64) {
        std::cmp::Ordering::Equal => v,
        std::cmp::Ordering::Less => push_cast(insts, vars, CastOp::ZExt, v, Ty::I64),
        std::cmp::Ordering::Greater => push_cast(insts, vars, CastOp::Trunc, v, Ty::I64),
    }
}
