//! External declarations for the runtime hook ABI.
//!
//! The hooks are resolved by the event-logger runtime at link time; the pass
//! only has to declare them. Signatures mirror the contract documented in
//! `bbtrace-abi`.

use crate::ir::{Function, Module, Ty};
use bbtrace_abi::{
    SYM_FINALIZE, SYM_ON_BASIC_BLOCK, SYM_ON_BRANCH, SYM_ON_CALL, SYM_ON_LOOP, SYM_ON_MEM,
    SYM_REGISTER_MODULE,
};

/// Build the declaration list for every hook the injector can emit.
pub fn hook_declarations() -> Vec<Function> {
    let mut decls = vec![
        Function::declaration(SYM_REGISTER_MODULE, vec![Ty::Ptr], None),
        Function::declaration(SYM_FINALIZE, vec![], None),
        Function::declaration(
            SYM_ON_BASIC_BLOCK,
            vec![Ty::I32, Ty::I32, Ty::I32, Ty::Ptr],
            None,
        ),
        Function::declaration(SYM_ON_LOOP, vec![Ty::I32, Ty::I32], None),
        Function::declaration(
            SYM_ON_MEM,
            vec![Ty::I32, Ty::I32, Ty::I32, Ty::Ptr, Ty::I64, Ty::I1],
            None,
        ),
        Function::declaration(
            SYM_ON_BRANCH,
            vec![Ty::I32, Ty::I32, Ty::I32, Ty::I32, Ty::Ptr],
            None,
        ),
    ];
    // The call hook takes (kind, bitwidth, value) triples after the fixed
    // prefix; its signature is variadic.
    let mut on_call = Function::declaration(
        SYM_ON_CALL,
        vec![Ty::I32, Ty::I32, Ty::I32, Ty::Ptr, Ty::Ptr, Ty::I32],
        None,
    );
    on_call.variadic = true;
    decls.push(on_call);
    decls
}

/// Append any hook declarations the module does not already carry.
pub fn declare_hooks(module: &mut Module) {
    for decl in hook_declarations() {
        if module.function(&decl.name).is_none() {
            module.functions.push(decl);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbtrace_abi::is_reserved;

    #[test]
    fn all_hooks_are_reserved_declarations() {
        for decl in hook_declarations() {
            assert!(decl.is_declaration());
            assert!(is_reserved(&decl.name));
            assert!(decl.ret.is_none());
        }
    }

    #[test]
    fn only_the_call_hook_is_variadic() {
        for decl in hook_declarations() {
            assert_eq!(decl.variadic, decl.name == SYM_ON_CALL, "{}", decl.name);
        }
    }

    #[test]
    fn declare_hooks_is_idempotent() {
        let mut module = Module::new("m.c");
        declare_hooks(&mut module);
        let count = module.functions.len();
        assert_eq!(count, 7);
        declare_hooks(&mut module);
        assert_eq!(module.functions.len(), count);
    }
}
