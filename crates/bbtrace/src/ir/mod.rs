//! Intermediate representation of the host compiler's modules.
//!
//! The `bb-trace` pass runs late in a compiler mid-end, after optimization,
//! over functions already lowered to basic blocks with explicit terminators.
//! This module defines that IR: enough instruction variety to describe real
//! post-optimization code, plus the link-time constructs the pass emits into
//! modules (data globals with named sections, global ctor/dtor registration,
//! block-address and function-address relocations).
//!
//! All types serialize with serde so modules can be moved in and out of the
//! driver as JSON.

mod types;
pub use types::*;

mod display;

pub mod utils;
