//! bbtrace — basic-block trace instrumentation for a compiler mid-end.
//!
//! This crate rewrites modules late in a compiler pipeline so a downstream
//! cycle-level simulator (or any PC-based profiler) can align observed
//! program counters back to the IR blocks and instructions that produced
//! them. One pass invocation:
//!
//! - assigns dense `(func_id, bb_id)` pairs to every eligible function and
//!   block and dense per-class `inst_id`s to memory, branch and call sites,
//! - injects calls to the `__bbtrace_` runtime hook ABI that emit a
//!   time-ordered event stream during execution,
//! - writes a static descriptor file (`*.bbinfo.jsonl`) describing every
//!   block and instruction,
//! - embeds the `.bbtrace_map` block address map and `.bbtrace_inst`
//!   per-instruction PC records into the module so runtime PCs reverse to
//!   `(func_id, bb_id, inst_id)` tuples after linking.
//!
//! Setting `BBTRACE_STATIC_ONLY=1` switches to the static-only mode: the
//! same ids and static artifacts, no IR mutation, giving a witness build
//! whose symbol layout matches the instrumented one except for the hook
//! bodies.

pub mod analysis;
pub mod ir;
pub mod trace;

// Re-export key types for convenience
pub use anyhow::{Context, Result};
pub use trace::{run_pass, run_pipeline, PassStatus, TraceMode, PASS_NAME};

/// Instrument a module in place, honoring the process environment for the
/// mode selection.
///
/// This is the main entry point; it is what the pipeline parser dispatches
/// to for the pass name `bb-trace`.
///
/// # Example
/// ```no_run
/// use bbtrace::ir::Module;
///
/// let bytes = std::fs::read("module.json").unwrap();
/// let mut module: Module = serde_json::from_slice(&bytes).unwrap();
/// let status = bbtrace::instrument(&mut module).unwrap();
/// assert_eq!(status, bbtrace::PassStatus::Modified);
/// ```
pub fn instrument(module: &mut ir::Module) -> Result<PassStatus> {
    trace::run(module)
}

/// Instrument a module in place with an explicit mode, bypassing the
/// environment. Embedders and tests use this to pin the mode.
pub fn instrument_with_mode(module: &mut ir::Module, mode: TraceMode) -> Result<PassStatus> {
    trace::run_with_mode(module, mode)
}
