//! `bbtrace-abi` — the contract between the `bb-trace` instrumentation pass,
//! the hook runtime that instrumented binaries link against, and post-link
//! tools that read the embedded address maps.
//!
//! This crate is `#![no_std]`. It defines:
//! - the runtime-reserved symbol prefix and the hook symbol names,
//! - the names of the loader-visible sections the pass emits,
//! - the argument-kind code space used by the variadic call hook,
//! - the record layouts of `.bbtrace_map` and `.bbtrace_inst` entries,
//!   with decoders for section readers.
//!
//! The hook runtime itself (the event logger) is a separate project; it only
//! has to resolve the symbols declared here with C linkage.

#![no_std]

/// Prefix of every runtime-reserved symbol.
///
/// No eligible user function may start with this prefix; the pass skips such
/// functions entirely and never instruments calls to them.
pub const RUNTIME_PREFIX: &str = "__bbtrace_";

/// True if `name` lives in the runtime-reserved namespace.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RUNTIME_PREFIX)
}

// ── Hook symbols ─────────────────────────────────────────────────────────────
//
// All hooks have C linkage and return void. Hooks may be called from any
// thread of the instrumented program, including from signal handlers; the
// pass provides no locking. For a given thread, hook calls arrive in
// instruction execution order relative to the instructions they describe.

/// `__bbtrace_register_module(module_name: *const c_char)` — called once per
/// module from a global constructor at priority 0.
pub const SYM_REGISTER_MODULE: &str = "__bbtrace_register_module";

/// `__bbtrace_finalize()` — called from a global destructor at priority 0.
pub const SYM_FINALIZE: &str = "__bbtrace_finalize";

/// `__bbtrace_on_basic_block(func_id: u32, bb_id: u32, loop_hint: u32,
/// bb_addr: *const c_void)` — first call in every instrumented block.
/// `loop_hint` is the innermost enclosing loop id, or [`NO_LOOP`].
pub const SYM_ON_BASIC_BLOCK: &str = "__bbtrace_on_basic_block";

/// `__bbtrace_on_loop(func_id: u32, loop_id: u32)` — emitted at loop headers,
/// immediately after the block hook.
pub const SYM_ON_LOOP: &str = "__bbtrace_on_loop";

/// `__bbtrace_on_mem(func_id: u32, bb_id: u32, inst_id: u32,
/// addr: *const c_void, size: u64, is_store: bool)` — emitted immediately
/// before each load and store; `addr`/`size` describe the access about to
/// execute.
pub const SYM_ON_MEM: &str = "__bbtrace_on_mem";

/// `__bbtrace_on_branch(func_id: u32, bb_id: u32, inst_id: u32,
/// taken_bb: u32, taken_addr: *const c_void)` — emitted before the branch
/// terminator with the target that will be taken.
pub const SYM_ON_BRANCH: &str = "__bbtrace_on_branch";

/// `__bbtrace_on_call(func_id: u32, bb_id: u32, inst_id: u32,
/// call_site: *const c_void, target: *const c_void, num_args: u32,
/// ...[kind: u32, bitwidth: u32, value: u64])` — variadic; one
/// `(kind, bitwidth, value)` triple per call argument, in order.
///
/// `call_site` is the value of the depth-0 return-address intrinsic at the
/// call site. Whether that is the address of the call instruction or the
/// address after it is platform-dependent; consumers aligning PCs must be
/// prepared to subtract the call-instruction length themselves.
///
/// The `value` slot always occupies 64 bits. Integers wider than 64 bits are
/// truncated to their low 64 bits; `bitwidth` still records the original
/// width. No sign extension is ever performed.
pub const SYM_ON_CALL: &str = "__bbtrace_on_call";

// ── Sections ─────────────────────────────────────────────────────────────────

/// Section holding one [`PcMapEntry`] per eligible basic block.
pub const SECTION_PC_MAP: &str = ".bbtrace_map";

/// Section holding one [`InstPcRecord`] per instrumented load, store and
/// call, pushed via inline assembly at the instrumentation site.
pub const SECTION_INST_PC: &str = ".bbtrace_inst";

/// Loop-hint sentinel for blocks outside any natural loop.
pub const NO_LOOP: u32 = u32::MAX;

/// Global constructor/destructor priority used for module registration.
pub const INIT_PRIORITY: u32 = 0;

// ── Call-argument kinds ──────────────────────────────────────────────────────

/// Kind code carried in each marshalled call-argument triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ArgKind {
    /// Integer value, zero-extended or truncated into the 64-bit slot.
    Integer = 0,
    /// Pointer, converted to an integer of its address-space width first.
    Pointer = 1,
    /// Float, bitcast to a same-width integer first.
    Float = 2,
    /// Anything the marshaller cannot represent; the value slot is zero.
    Unknown = 3,
}

impl ArgKind {
    /// Decode a kind code from the wire representation.
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0 => Some(ArgKind::Integer),
            1 => Some(ArgKind::Pointer),
            2 => Some(ArgKind::Float),
            3 => Some(ArgKind::Unknown),
            _ => None,
        }
    }
}

// ── Record layouts ───────────────────────────────────────────────────────────

/// One `.bbtrace_map` entry: maps a block to its entry address in the final
/// image.
///
/// On-disk layout is two little-endian `u32`s followed by one pointer-sized
/// address. For the entry block of a function the address is the function
/// symbol itself; for every other block it is the block-address constant.
/// The in-memory struct uses `u64` for the address so 32-bit images can be
/// decoded on any host; `#[repr(C)]` matches the emitted layout exactly on
/// 64-bit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct PcMapEntry {
    pub func_id: u32,
    pub bb_id: u32,
    pub addr: u64,
}

impl PcMapEntry {
    /// Encoded size of one entry for a given pointer width.
    pub const fn encoded_size(ptr_bytes: u32) -> usize {
        8 + ptr_bytes as usize
    }

    /// Decode one entry from the front of `bytes` (little-endian).
    pub fn from_le_bytes(bytes: &[u8], ptr_bytes: u32) -> Option<Self> {
        if ptr_bytes != 4 && ptr_bytes != 8 {
            return None;
        }
        if bytes.len() < Self::encoded_size(ptr_bytes) {
            return None;
        }
        let func_id = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let bb_id = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let addr = if ptr_bytes == 4 {
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as u64
        } else {
            u64::from_le_bytes([
                bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14],
                bytes[15],
            ])
        };
        Some(PcMapEntry {
            func_id,
            bb_id,
            addr,
        })
    }
}

/// One `.bbtrace_inst` record: maps `(func_id, bb_id, inst_id)` to the
/// post-link program counter of the instrumented instruction.
///
/// The layout is fixed regardless of pointer width: four little-endian
/// `u32`s followed by a 64-bit label address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct InstPcRecord {
    pub func_id: u32,
    pub bb_id: u32,
    pub inst_id: u32,
    /// Always zero; reserved for future use.
    pub reserved: u32,
    pub label_pc: u64,
}

impl InstPcRecord {
    /// Encoded size of one record.
    pub const ENCODED_SIZE: usize = 24;

    /// Decode one record from the front of `bytes` (little-endian).
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::ENCODED_SIZE {
            return None;
        }
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Some(InstPcRecord {
            func_id: word(0),
            bb_id: word(4),
            inst_id: word(8),
            reserved: word(12),
            label_pc: u64::from_le_bytes([
                bytes[16], bytes[17], bytes[18], bytes[19], bytes[20], bytes[21], bytes[22],
                bytes[23],
            ]),
        })
    }
}
