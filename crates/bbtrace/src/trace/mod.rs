//! The `bb-trace` module transform.
//!
//! One invocation walks the module, allocates the dense ids, injects the
//! runtime hooks (unless running static-only), writes the static descriptor
//! file, and appends the `.bbtrace_map` constant. The rewritten module is
//! handed back to the pipeline otherwise unchanged.
//!
//! Sub-modules, leaves first:
//! - [`walker`]: id allocation and the per-module trace plan
//! - [`hooks`]: external declarations for the runtime ABI
//! - [`inject`]: IR rewriting (hook calls, marshalling, ctor/dtor)
//! - [`descriptor`]: the `.bbinfo.jsonl` static descriptor
//! - [`pcmap`]: the `.bbtrace_map` global and `.bbtrace_inst` records

pub mod descriptor;
pub mod hooks;
pub mod inject;
pub mod pcmap;
pub mod walker;

use crate::ir::Module;
use anyhow::{bail, Result};
use std::sync::OnceLock;
use tracing::debug;

/// Name the pass registers under in the pipeline parser.
pub const PASS_NAME: &str = "bb-trace";

/// Environment variable selecting static-only mode.
pub const ENV_STATIC_ONLY: &str = "BBTRACE_STATIC_ONLY";

/// What a pass reports back to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    Unchanged,
    Modified,
}

/// Operating mode of the injector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceMode {
    /// Full IR mutation and hook emission.
    Full,
    /// No calls inserted; id allocation and static artifact emission only.
    /// Produces the witness build whose symbol layout matches the
    /// instrumented build except for the call bodies.
    StaticOnly,
}

impl TraceMode {
    /// Mode from the process environment, read once and memoized.
    pub fn from_env() -> TraceMode {
        static MODE: OnceLock<TraceMode> = OnceLock::new();
        *MODE.get_or_init(|| TraceMode::parse(std::env::var(ENV_STATIC_ONLY).ok().as_deref()))
    }

    /// Static-only iff the value's first character is one of `1 T t Y y`.
    pub fn parse(value: Option<&str>) -> TraceMode {
        match value.and_then(|v| v.chars().next()) {
            Some('1' | 'T' | 't' | 'Y' | 'y') => TraceMode::StaticOnly,
            _ => TraceMode::Full,
        }
    }
}

/// Run the `bb-trace` pass in the mode selected by the environment.
pub fn run(module: &mut Module) -> Result<PassStatus> {
    run_with_mode(module, TraceMode::from_env())
}

/// Run the `bb-trace` pass in an explicit mode.
pub fn run_with_mode(module: &mut Module, mode: TraceMode) -> Result<PassStatus> {
    let trace = walker::walk_module(module);
    debug!(module = %module.id, functions = trace.funcs.len(), ?mode, "bb-trace walked module");
    if mode == TraceMode::Full {
        inject::inject_module(module, &trace);
    }
    let module_id = module.id.clone();
    descriptor::emit(&module_id, &trace)?;
    pcmap::append_pc_map(module, &trace);
    Ok(PassStatus::Modified)
}

/// Run a single pass by its registered name.
pub fn run_pass(name: &str, module: &mut Module) -> Result<PassStatus> {
    match name {
        PASS_NAME => run(module),
        other => bail!("unknown pass '{other}'"),
    }
}

/// Parse and run a comma-separated pass pipeline.
pub fn run_pipeline(pipeline: &str, module: &mut Module) -> Result<PassStatus> {
    let mut status = PassStatus::Unchanged;
    for name in pipeline.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if run_pass(name, module)? == PassStatus::Modified {
            status = PassStatus::Modified;
        }
    }
    Ok(status)
}
