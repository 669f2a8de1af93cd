//! End-to-end tests for the `bb-trace` pass.
//!
//! Each test builds a module the way a frontend would hand it to the
//! mid-end, runs the pass through the public entry points, and checks the
//! three artifacts: the rewritten IR, the static descriptor file, and the
//! binary-embedded address maps.

use bbtrace::ir::{
    Address, Block, BlockId, Callee, ConstValue, DataField, Function, Inst, Module, Operand,
    Terminator, Ty, VarId,
};
use bbtrace::trace::descriptor::descriptor_path;
use bbtrace::trace::pcmap::PC_MAP_GLOBAL;
use bbtrace::{instrument_with_mode, PassStatus, TraceMode};
use bbtrace_abi::{
    ArgKind, NO_LOOP, SYM_ON_BASIC_BLOCK, SYM_ON_BRANCH, SYM_ON_CALL, SYM_ON_LOOP, SYM_ON_MEM,
};
use serde_json::Value;
use std::fs;
use std::path::Path;

// ── Module builders ──────────────────────────────────────────────────────────

fn block(id: u32, insts: Vec<Inst>, terminator: Terminator) -> Block {
    Block {
        id: BlockId(id),
        name: None,
        insts,
        terminator,
    }
}

fn define(name: &str, params: Vec<(VarId, Ty)>, blocks: Vec<Block>) -> Function {
    Function {
        name: name.to_string(),
        params,
        ret: None,
        variadic: false,
        blocks,
    }
}

fn load(dest: u32, ty: Ty, addr: u32) -> Inst {
    Inst::Load {
        dest: VarId(dest),
        ty,
        addr: VarId(addr),
    }
}

fn store(ty: Ty, value: u32, addr: u32) -> Inst {
    Inst::Store {
        ty,
        value: VarId(value),
        addr: VarId(addr),
    }
}

fn ret() -> Terminator {
    Terminator::Return { value: None }
}

fn module_in(dir: &Path, functions: Vec<Function>) -> Module {
    let mut module = Module::new(dir.join("demo.c").to_str().unwrap());
    module.functions = functions;
    module
}

/// Scenario A fixture: one straight-line function with two loads, one store
/// and a return.
fn straight_line(dir: &Path) -> Module {
    module_in(
        dir,
        vec![define(
            "f",
            vec![(VarId(0), Ty::Ptr)],
            vec![block(
                0,
                vec![
                    load(1, Ty::I32, 0),
                    load(2, Ty::I64, 0),
                    store(Ty::I32, 1, 0),
                ],
                ret(),
            )],
        )],
    )
}

// ── Artifact readers ─────────────────────────────────────────────────────────

fn descriptor_records(module: &Module) -> Vec<Value> {
    let content = fs::read_to_string(descriptor_path(&module.id)).expect("descriptor missing");
    content
        .lines()
        .map(|line| serde_json::from_str(line).expect("malformed descriptor line"))
        .collect()
}

/// `(func_id, bb_id, address)` triples from the `.bbtrace_map` global.
fn pc_map_entries(module: &Module) -> Vec<(u32, u32, Address)> {
    let global = module.global(PC_MAP_GLOBAL).expect("pc map missing");
    assert_eq!(global.section.as_deref(), Some(".bbtrace_map"));
    assert_eq!(global.align, module.layout.ptr_bytes);
    assert!(global.retained, "map must survive link-time dead stripping");
    global
        .init
        .chunks(3)
        .map(|entry| match entry {
            [DataField::U32(f), DataField::U32(b), DataField::Ptr(addr)] => (*f, *b, addr.clone()),
            other => panic!("malformed pc map entry: {other:?}"),
        })
        .collect()
}

/// Argument lists of every direct call to `sym` in one block, in order.
fn hook_calls<'a>(block: &'a Block, sym: &str) -> Vec<&'a [Operand]> {
    block
        .insts
        .iter()
        .filter_map(|inst| match inst {
            Inst::Call {
                callee: Callee::Direct(name),
                args,
                ..
            } if name == sym => Some(args.as_slice()),
            _ => None,
        })
        .collect()
}

/// Templates of the `.bbtrace_inst` record blobs injected into a function,
/// in insertion order.
fn inst_pc_records(func: &Function) -> Vec<String> {
    func.blocks
        .iter()
        .flat_map(|b| &b.insts)
        .filter_map(|inst| match inst {
            Inst::Call {
                callee: Callee::Asm(asm),
                ..
            } if asm.template.contains(".bbtrace_inst") => Some(asm.template.clone()),
            _ => None,
        })
        .collect()
}

// ── Scenario A: single straight-line function ────────────────────────────────

#[test]
fn straight_line_function_gets_dense_memory_ids() {
    let dir = tempfile::tempdir().unwrap();
    let mut module = straight_line(dir.path());
    let status = instrument_with_mode(&mut module, TraceMode::Full).unwrap();
    assert_eq!(status, PassStatus::Modified);

    let records = descriptor_records(&module);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record["func_id"], 0);
    assert_eq!(record["bb_id"], 0);
    let insts = record["insts"].as_array().unwrap();
    assert_eq!(insts.len(), 4);
    assert_eq!(insts[0]["kind"], "load");
    assert_eq!(insts[0]["inst_id"], 0);
    assert_eq!(insts[1]["kind"], "load");
    assert_eq!(insts[1]["inst_id"], 1);
    assert_eq!(insts[2]["kind"], "store");
    assert_eq!(insts[2]["inst_id"], 2);
    assert_eq!(insts[3]["kind"], "generic");
    assert!(insts[3].get("inst_id").is_none());

    assert_eq!(
        pc_map_entries(&module),
        vec![(0, 0, Address::Function("f".to_string()))]
    );

    let func = module.function("f").unwrap();
    let records = inst_pc_records(func);
    assert_eq!(records.len(), 3);
    for (i, template) in records.iter().enumerate() {
        assert!(
            template.contains(&format!(".long 0\n.long 0\n.long {i}\n.long 0\n")),
            "record {i}: {template}"
        );
    }

    // Three memory hooks, sizes in bytes of the accessed types, stores
    // flagged.
    let mem = hook_calls(&func.blocks[0], SYM_ON_MEM);
    assert_eq!(mem.len(), 3);
    assert_eq!(mem[0][4], Operand::U64(4));
    assert_eq!(mem[0][5], Operand::Bool(false));
    assert_eq!(mem[1][4], Operand::U64(8));
    assert_eq!(mem[2][4], Operand::U64(4));
    assert_eq!(mem[2][5], Operand::Bool(true));
}

// ── Scenario B: conditional branch ───────────────────────────────────────────

#[test]
fn conditional_branch_records_taken_target() {
    let dir = tempfile::tempdir().unwrap();
    let mut module = module_in(
        dir.path(),
        vec![define(
            "g",
            vec![(VarId(0), Ty::I1)],
            vec![
                block(
                    0,
                    vec![],
                    Terminator::BranchIf {
                        cond: VarId(0),
                        if_true: BlockId(1),
                        if_false: BlockId(2),
                    },
                ),
                block(1, vec![], ret()),
                block(2, vec![], ret()),
            ],
        )],
    );
    instrument_with_mode(&mut module, TraceMode::Full).unwrap();

    let records = descriptor_records(&module);
    let branch = records[0]["insts"].as_array().unwrap().last().cloned().unwrap();
    assert_eq!(branch["kind"], "branch");
    assert_eq!(branch["inst_id"], 0);
    assert_eq!(branch["targets"], serde_json::json!([1, 2]));

    assert_eq!(
        pc_map_entries(&module),
        vec![
            (0, 0, Address::Function("g".to_string())),
            (
                0,
                1,
                Address::BlockAddr {
                    func: "g".to_string(),
                    block: BlockId(1),
                }
            ),
            (
                0,
                2,
                Address::BlockAddr {
                    func: "g".to_string(),
                    block: BlockId(2),
                }
            ),
        ]
    );

    // The hook reads both selects; the selects choose successor 0 on true.
    let entry = &module.function("g").unwrap().blocks[0];
    let branch_hooks = hook_calls(entry, SYM_ON_BRANCH);
    assert_eq!(branch_hooks.len(), 1);
    let args = branch_hooks[0];
    assert_eq!(args[..3], [Operand::U32(0), Operand::U32(0), Operand::U32(0)]);
    let selects: Vec<&Inst> = entry
        .insts
        .iter()
        .filter(|i| matches!(i, Inst::Select { .. }))
        .collect();
    assert_eq!(selects.len(), 2);
    let Inst::Select {
        dest,
        if_true,
        if_false,
        ..
    } = selects[0]
    else {
        unreachable!()
    };
    assert_eq!(args[3], Operand::Var(*dest));
    assert_eq!(*if_true, Operand::U32(1));
    assert_eq!(*if_false, Operand::U32(2));
}

// ── Scenario C: loop ─────────────────────────────────────────────────────────

#[test]
fn loop_header_gets_loop_hook_and_hints_propagate() {
    let dir = tempfile::tempdir().unwrap();
    // block_0 → block_1 (header) → block_2 → {block_1, block_3}
    let mut module = module_in(
        dir.path(),
        vec![define(
            "f",
            vec![(VarId(0), Ty::I1)],
            vec![
                block(0, vec![], Terminator::Jump { target: BlockId(1) }),
                block(1, vec![], Terminator::Jump { target: BlockId(2) }),
                block(
                    2,
                    vec![],
                    Terminator::BranchIf {
                        cond: VarId(0),
                        if_true: BlockId(1),
                        if_false: BlockId(3),
                    },
                ),
                block(3, vec![], ret()),
            ],
        )],
    );
    instrument_with_mode(&mut module, TraceMode::Full).unwrap();
    let func = module.function("f").unwrap();

    // Only the header carries on_loop, right after the block hook.
    for (i, b) in func.blocks.iter().enumerate() {
        let loops = hook_calls(b, SYM_ON_LOOP);
        if i == 1 {
            assert_eq!(loops, vec![&[Operand::U32(0), Operand::U32(0)][..]]);
            assert!(matches!(
                &b.insts[1],
                Inst::Call { callee: Callee::Direct(name), .. } if name == SYM_ON_LOOP
            ));
        } else {
            assert!(loops.is_empty(), "block {i} must not get on_loop");
        }
    }

    // Loop hint: 0 inside the loop, sentinel outside.
    let hints: Vec<Operand> = func
        .blocks
        .iter()
        .map(|b| hook_calls(b, SYM_ON_BASIC_BLOCK)[0][2].clone())
        .collect();
    assert_eq!(
        hints,
        vec![
            Operand::U32(NO_LOOP),
            Operand::U32(0),
            Operand::U32(0),
            Operand::U32(NO_LOOP),
        ]
    );
}

// ── Scenario D: call with mixed arguments ────────────────────────────────────

#[test]
fn call_hook_describes_each_argument() {
    let dir = tempfile::tempdir().unwrap();
    let mut module = module_in(
        dir.path(),
        vec![define(
            "caller",
            vec![(VarId(0), Ty::Ptr)],
            vec![block(
                0,
                vec![
                    Inst::Const {
                        dest: VarId(1),
                        value: ConstValue::Int {
                            bits: 32,
                            value: 42,
                        },
                    },
                    Inst::Const {
                        dest: VarId(2),
                        value: ConstValue::F64(3.14),
                    },
                    Inst::Call {
                        dest: None,
                        callee: Callee::Direct("h".to_string()),
                        args: vec![
                            Operand::Var(VarId(0)),
                            Operand::Var(VarId(1)),
                            Operand::Var(VarId(2)),
                        ],
                    },
                ],
                ret(),
            )],
        )],
    );
    instrument_with_mode(&mut module, TraceMode::Full).unwrap();
    let func = module.function("caller").unwrap();

    let calls = hook_calls(&func.blocks[0], SYM_ON_CALL);
    assert_eq!(calls.len(), 1);
    let args = calls[0];
    assert_eq!(args[4], Operand::Addr(Address::Function("h".to_string())));
    assert_eq!(args[5], Operand::U32(3));
    let kinds: Vec<&Operand> = args[6..].iter().step_by(3).collect();
    let widths: Vec<&Operand> = args[7..].iter().step_by(3).collect();
    assert_eq!(
        kinds,
        vec![
            &Operand::U32(ArgKind::Pointer as u32),
            &Operand::U32(ArgKind::Integer as u32),
            &Operand::U32(ArgKind::Float as u32),
        ]
    );
    assert_eq!(
        widths,
        vec![
            &Operand::U32(64),
            &Operand::U32(32),
            &Operand::U32(64),
        ]
    );

    // Exactly one inst-PC record, for this call site.
    assert_eq!(inst_pc_records(func).len(), 1);
}

// ── Scenario E: runtime-reserved call is ignored ─────────────────────────────

#[test]
fn reserved_call_is_left_alone_but_still_described() {
    let dir = tempfile::tempdir().unwrap();
    let mut module = module_in(
        dir.path(),
        vec![define(
            "f",
            vec![],
            vec![block(
                0,
                vec![Inst::Call {
                    dest: None,
                    callee: Callee::Direct("__bbtrace_helper".to_string()),
                    args: vec![],
                }],
                ret(),
            )],
        )],
    );
    instrument_with_mode(&mut module, TraceMode::Full).unwrap();

    let records = descriptor_records(&module);
    let call_record = &records[0]["insts"].as_array().unwrap()[0];
    assert_eq!(call_record["kind"], "generic");
    assert!(call_record.get("inst_id").is_none());

    let func = module.function("f").unwrap();
    assert!(hook_calls(&func.blocks[0], SYM_ON_CALL).is_empty());
    assert!(inst_pc_records(func).is_empty());
}

// ── Scenario F: static-only mode ─────────────────────────────────────────────

#[test]
fn static_only_matches_instrumented_artifacts_without_rewriting() {
    let full_dir = tempfile::tempdir().unwrap();
    let witness_dir = tempfile::tempdir().unwrap();

    let mut full = straight_line(full_dir.path());
    instrument_with_mode(&mut full, TraceMode::Full).unwrap();

    let mut witness = straight_line(witness_dir.path());
    let before = witness.clone();
    let status = instrument_with_mode(&mut witness, TraceMode::StaticOnly).unwrap();
    assert_eq!(status, PassStatus::Modified);

    // No ctor/dtor, no hooks, no declarations, no inst-PC records.
    assert!(witness.ctors.is_empty() && witness.dtors.is_empty());
    assert_eq!(witness.functions, before.functions);
    assert!(inst_pc_records(witness.function("f").unwrap()).is_empty());

    // Descriptor bytes and map contents identical to the instrumented build.
    let full_desc = fs::read(descriptor_path(&full.id)).unwrap();
    let witness_desc = fs::read(descriptor_path(&witness.id)).unwrap();
    assert_eq!(full_desc, witness_desc);
    assert_eq!(pc_map_entries(&full), pc_map_entries(&witness));
}

// ── Universal invariants ─────────────────────────────────────────────────────

/// Multi-function fixture with a declaration and a reserved function mixed
/// in.
fn mixed_module(dir: &Path) -> Module {
    module_in(
        dir,
        vec![
            define(
                "alpha",
                vec![(VarId(0), Ty::Ptr)],
                vec![
                    block(
                        0,
                        vec![load(1, Ty::I32, 0)],
                        Terminator::Jump { target: BlockId(1) },
                    ),
                    block(
                        1,
                        vec![store(Ty::I32, 1, 0)],
                        ret(),
                    ),
                ],
            ),
            Function::declaration("external", vec![Ty::Ptr], None),
            define(
                "__bbtrace_shim",
                vec![],
                vec![block(0, vec![], ret())],
            ),
            define(
                "beta",
                vec![(VarId(0), Ty::Ptr)],
                vec![block(
                    0,
                    vec![
                        Inst::Call {
                            dest: None,
                            callee: Callee::Direct("alpha".to_string()),
                            args: vec![Operand::Var(VarId(0))],
                        },
                        load(1, Ty::I64, 0),
                    ],
                    ret(),
                )],
            ),
        ],
    )
}

#[test]
fn descriptor_and_map_enumerate_every_eligible_block_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut module = mixed_module(dir.path());
    instrument_with_mode(&mut module, TraceMode::Full).unwrap();

    let records = descriptor_records(&module);
    let descriptor_keys: Vec<(u32, u32)> = records
        .iter()
        .map(|r| {
            (
                r["func_id"].as_u64().unwrap() as u32,
                r["bb_id"].as_u64().unwrap() as u32,
            )
        })
        .collect();
    let map_keys: Vec<(u32, u32)> = pc_map_entries(&module)
        .iter()
        .map(|(f, b, _)| (*f, *b))
        .collect();

    // alpha = func 0 (two blocks), beta = func 1; the declaration and the
    // reserved function never appear.
    assert_eq!(descriptor_keys, vec![(0, 0), (0, 1), (1, 0)]);
    assert_eq!(map_keys, descriptor_keys);
    let names: Vec<&str> = records
        .iter()
        .map(|r| r["func_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alpha", "alpha", "beta"]);
}

#[test]
fn entry_blocks_use_the_function_pointer_and_only_they_do() {
    let dir = tempfile::tempdir().unwrap();
    let mut module = mixed_module(dir.path());
    instrument_with_mode(&mut module, TraceMode::Full).unwrap();

    for (_, bb_id, addr) in pc_map_entries(&module) {
        match addr {
            Address::Function(_) => assert_eq!(bb_id, 0),
            Address::BlockAddr { .. } => assert_ne!(bb_id, 0),
            Address::Global(name) => panic!("unexpected global address {name}"),
        }
    }
}

#[test]
fn inst_pc_record_count_matches_instrumented_sites() {
    let dir = tempfile::tempdir().unwrap();
    let mut module = mixed_module(dir.path());
    instrument_with_mode(&mut module, TraceMode::Full).unwrap();

    // alpha: one load + one store; beta: one call + one load.
    let alpha = inst_pc_records(module.function("alpha").unwrap()).len();
    let beta = inst_pc_records(module.function("beta").unwrap()).len();
    assert_eq!(alpha, 2);
    assert_eq!(beta, 2);
}

#[test]
fn rerunning_the_pass_on_the_same_input_is_bytewise_identical() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let mut first = mixed_module(dir_a.path());
    let mut second = mixed_module(dir_b.path());
    instrument_with_mode(&mut first, TraceMode::Full).unwrap();
    instrument_with_mode(&mut second, TraceMode::Full).unwrap();

    let desc_a = fs::read(descriptor_path(&first.id)).unwrap();
    let desc_b = fs::read(descriptor_path(&second.id)).unwrap();
    assert_eq!(desc_a, desc_b);

    // The rewritten modules differ only in their ids (paths).
    second.id = first.id.clone();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn every_map_key_resolves_to_a_descriptor_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut module = mixed_module(dir.path());
    instrument_with_mode(&mut module, TraceMode::Full).unwrap();

    let records = descriptor_records(&module);
    for (func_id, bb_id, _) in pc_map_entries(&module) {
        assert!(
            records
                .iter()
                .any(|r| r["func_id"] == func_id && r["bb_id"] == bb_id),
            "({func_id}, {bb_id}) missing from descriptor"
        );
    }
}
