//! Binary-embedded address maps.
//!
//! Two loader-visible artifacts end up in the final image:
//!
//! - `.bbtrace_map`: one constant array with a `(func_id, bb_id, address)`
//!   triple per eligible block, appended to the module as a private retained
//!   global. Profilers attribute a PC to its block by interval containment.
//! - `.bbtrace_inst`: one record per instrumented load/store/call, pushed via
//!   inline assembly at the instrumentation site. The asm contributes the
//!   record to the section and defines a local label at the insertion PC, so
//!   the record's address field survives later code motion attached to the
//!   instruction it describes.

use super::walker::ModuleTrace;
use crate::ir::{Callee, DataField, DataGlobal, InlineAsm, Inst, Module, TargetLayout};
use bbtrace_abi::{SECTION_INST_PC, SECTION_PC_MAP};

/// Symbol of the per-module PC-map array.
pub const PC_MAP_GLOBAL: &str = "__bbtrace_pc_map";

/// Build the `.bbtrace_map` global for a walked module.
pub fn pc_map_global(layout: &TargetLayout, trace: &ModuleTrace) -> DataGlobal {
    let mut init = Vec::new();
    for func in &trace.funcs {
        for block in &func.blocks {
            init.push(DataField::U32(func.func_id));
            init.push(DataField::U32(block.bb_id));
            init.push(DataField::Ptr(block.entry.clone()));
        }
    }
    DataGlobal {
        name: PC_MAP_GLOBAL.to_string(),
        section: Some(SECTION_PC_MAP.to_string()),
        align: layout.ptr_bytes,
        internal: true,
        constant: true,
        retained: true,
        init,
    }
}

/// Append the `.bbtrace_map` global to the module. Emitted in both pass
/// modes so the witness build carries the same map as the instrumented one.
pub fn append_pc_map(module: &mut Module, trace: &ModuleTrace) {
    let global = pc_map_global(&module.layout, trace);
    module.globals.push(global);
}

/// Inline assembly that pushes one `.bbtrace_inst` record and pins the local
/// label to the insertion PC. Uses the GAS numeric-label pattern: `1f` inside
/// the pushed data resolves to the `1:` defined back in the text section.
pub fn inst_pc_asm(func_id: u32, bb_id: u32, inst_id: u32) -> InlineAsm {
    let template = format!(
        ".pushsection {section},\"a\",@progbits\n\
         .balign 8\n\
         .long {func_id}\n\
         .long {bb_id}\n\
         .long {inst_id}\n\
         .long 0\n\
         .quad 1f\n\
         .popsection\n\
         1:",
        section = SECTION_INST_PC,
    );
    InlineAsm {
        template,
        sideeffect: true,
    }
}

/// The record as an IR instruction, ready to insert at the instrumentation
/// site.
pub fn inst_pc_record(func_id: u32, bb_id: u32, inst_id: u32) -> Inst {
    Inst::Call {
        dest: None,
        callee: Callee::Asm(inst_pc_asm(func_id, bb_id, inst_id)),
        args: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Address, BlockId};
    use crate::trace::walker::{BlockTrace, FuncTrace, InstNote};
    use bbtrace_abi::NO_LOOP;

    fn block_trace(bb_id: u32, entry: Address) -> BlockTrace {
        BlockTrace {
            bb_id,
            block: BlockId(bb_id),
            name: format!("bb_{bb_id}"),
            entry,
            loop_hint: NO_LOOP,
            header_of: None,
            insts: vec![],
            terminator: InstNote {
                kind: crate::trace::walker::InstKind::Generic,
                inst_id: None,
                targets: None,
                text: "ret void".to_string(),
            },
        }
    }

    #[test]
    fn map_global_has_one_triple_per_block() {
        let trace = ModuleTrace {
            funcs: vec![FuncTrace {
                func_id: 0,
                index: 0,
                name: "f".to_string(),
                blocks: vec![
                    block_trace(0, Address::Function("f".to_string())),
                    block_trace(
                        1,
                        Address::BlockAddr {
                            func: "f".to_string(),
                            block: BlockId(1),
                        },
                    ),
                ],
            }],
        };
        let layout = TargetLayout::default();
        let global = pc_map_global(&layout, &trace);
        assert_eq!(global.section.as_deref(), Some(".bbtrace_map"));
        assert_eq!(global.align, 8);
        assert!(global.internal && global.constant && global.retained);
        assert_eq!(global.init.len(), 6);
        assert_eq!(global.init[0], DataField::U32(0));
        assert_eq!(global.init[1], DataField::U32(0));
        assert_eq!(
            global.init[2],
            DataField::Ptr(Address::Function("f".to_string()))
        );
        assert_eq!(global.init[4], DataField::U32(1));
    }

    #[test]
    fn map_alignment_follows_pointer_size() {
        let layout = TargetLayout { ptr_bytes: 4 };
        let global = pc_map_global(&layout, &ModuleTrace::default());
        assert_eq!(global.align, 4);
        assert!(global.init.is_empty());
    }

    #[test]
    fn record_asm_carries_ids_and_section() {
        let asm = inst_pc_asm(2, 5, 9);
        assert!(asm.sideeffect);
        assert!(asm.template.starts_with(".pushsection .bbtrace_inst"));
        assert!(asm.template.contains(".long 2\n.long 5\n.long 9\n.long 0\n"));
        assert!(asm.template.contains(".quad 1f"));
        assert!(asm.template.ends_with(".popsection\n1:"));
    }

    #[test]
    fn record_instruction_is_uninstrumentable() {
        // The record must never feed back into the walker's call class.
        let inst = inst_pc_record(0, 0, 0);
        match inst {
            Inst::Call { callee, .. } => {
                assert!(!crate::trace::walker::is_instrumented_call(&callee));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }
}
