//! IR type definitions.
//!
//! Functions hold basic blocks in layout order; each block is a straight-line
//! instruction sequence closed by exactly one terminator. Values are numbered
//! variables (v0, v1, ...) with types carried on the defining instruction, so
//! a variable's type is recoverable by a single scan (see
//! [`utils::type_map`](super::utils::type_map)).

use serde::{Deserialize, Serialize};

/// Unique identifier for a variable within a function.
/// Variables are numbered sequentially: v0, v1, v2, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarId(pub u32);

/// Unique identifier for a basic block within a function.
///
/// Block ids are creation-order handles used by terminators; they are not the
/// dense `bb_id`s the trace pass assigns (those follow layout order and are
/// recomputed on every pass invocation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// Value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ty {
    /// Arbitrary-width integer (i1, i8, i32, i128, ...).
    Int { bits: u32 },
    F32,
    F64,
    /// Pointer in the default address space; width comes from [`TargetLayout`].
    Ptr,
    /// Aggregate or vector type opaque to this pass; only its store size
    /// matters here.
    Agg { store_bytes: u64 },
}

impl Ty {
    pub const I1: Ty = Ty::Int { bits: 1 };
    pub const I32: Ty = Ty::Int { bits: 32 };
    pub const I64: Ty = Ty::Int { bits: 64 };

    pub fn is_ptr(&self) -> bool {
        matches!(self, Ty::Ptr)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Ty::F32 | Ty::F64)
    }

    /// Integer width in bits, if this is an integer type.
    pub fn int_bits(&self) -> Option<u32> {
        match self {
            Ty::Int { bits } => Some(*bits),
            _ => None,
        }
    }
}

/// Target data layout facts the pass depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetLayout {
    /// Pointer size in bytes (8 on the usual 64-bit hosts).
    pub ptr_bytes: u32,
}

impl Default for TargetLayout {
    fn default() -> Self {
        TargetLayout { ptr_bytes: 8 }
    }
}

impl TargetLayout {
    pub fn ptr_bits(&self) -> u32 {
        self.ptr_bytes * 8
    }

    /// Store size of a type in bytes (the number of bytes a load or store of
    /// this type touches).
    pub fn store_size(&self, ty: &Ty) -> u64 {
        match ty {
            Ty::Int { bits } => u64::from(bits.div_ceil(8)),
            Ty::F32 => 4,
            Ty::F64 => 8,
            Ty::Ptr => u64::from(self.ptr_bytes),
            Ty::Agg { store_bytes } => *store_bytes,
        }
    }
}

/// A typed constant value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    /// Integer constant; `value` holds the low 64 bits.
    Int { bits: u32, value: u64 },
    F32(f32),
    F64(f64),
    /// The null pointer.
    NullPtr,
}

impl ConstValue {
    /// Returns the type of this constant.
    pub fn ty(&self) -> Ty {
        match self {
            ConstValue::Int { bits, .. } => Ty::Int { bits: *bits },
            ConstValue::F32(_) => Ty::F32,
            ConstValue::F64(_) => Ty::F64,
            ConstValue::NullPtr => Ty::Ptr,
        }
    }
}

/// A link-time address: resolved by the linker, not computed at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Address {
    /// Address of a function symbol.
    Function(String),
    /// Block-address constant of a named non-entry basic block.
    ///
    /// INVARIANT: never constructed for a function's entry block; the entry
    /// block's address is the function symbol itself.
    BlockAddr { func: String, block: BlockId },
    /// Address of a data global.
    Global(String),
}

/// An instruction operand: a variable, an immediate, or a relocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Var(VarId),
    U32(u32),
    U64(u64),
    Bool(bool),
    Addr(Address),
}

/// Binary integer operations (the generic instruction surface this pass
/// never touches, kept small).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

/// Integer comparison predicates; result type is always i1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpPred {
    Eq,
    Ne,
    Ult,
    Ule,
    Slt,
    Sle,
}

/// Value conversions the pass materializes during argument marshalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastOp {
    /// Pointer to integer of the address-space width.
    PtrToInt,
    /// Zero extension to a wider integer. Never sign-extends.
    ZExt,
    /// Truncation to a narrower integer.
    Trunc,
    /// Same-width reinterpretation (float to integer here).
    Bitcast,
}

/// An inline assembly callee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineAsm {
    pub template: String,
    pub sideeffect: bool,
}

/// What a call instruction targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Callee {
    /// Direct call to a named symbol (defined in this module or external).
    Direct(String),
    /// Indirect call through a pointer-typed variable.
    Indirect(VarId),
    /// Compiler intrinsic (e.g. `returnaddress`). Never instrumented.
    Intrinsic(String),
    /// Inline assembly. Never instrumented.
    Asm(InlineAsm),
}

/// A single IR instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Inst {
    /// Define a variable from a constant value.
    Const { dest: VarId, value: ConstValue },

    /// Binary operation (dest = lhs op rhs).
    BinOp {
        dest: VarId,
        op: BinOp,
        ty: Ty,
        lhs: VarId,
        rhs: VarId,
    },

    /// Integer comparison (dest: i1 = lhs pred rhs).
    Cmp {
        dest: VarId,
        pred: CmpPred,
        ty: Ty,
        lhs: VarId,
        rhs: VarId,
    },

    /// Memory load (dest = *addr).
    Load { dest: VarId, ty: Ty, addr: VarId },

    /// Memory store (*addr = value). `ty` is the type of the value operand.
    Store { ty: Ty, value: VarId, addr: VarId },

    /// Function call. `dest` carries the result variable and its type for
    /// non-void callees.
    Call {
        dest: Option<(VarId, Ty)>,
        callee: Callee,
        args: Vec<Operand>,
    },

    /// Conditional select (dest = cond ? if_true : if_false).
    Select {
        dest: VarId,
        ty: Ty,
        cond: VarId,
        if_true: Operand,
        if_false: Operand,
    },

    /// Value conversion.
    Cast {
        dest: VarId,
        op: CastOp,
        src: VarId,
        to: Ty,
    },
}

/// How control flow exits a basic block.
///
/// Multi-way switches are lowered to `BranchIf` chains before this pass runs;
/// every branch here has one or two successors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    /// Return from function.
    Return { value: Option<VarId> },

    /// Unconditional jump to target block.
    Jump { target: BlockId },

    /// Conditional branch; `if_true` is successor 0, `if_false` successor 1.
    BranchIf {
        cond: VarId,
        if_true: BlockId,
        if_false: BlockId,
    },

    /// Unreachable (trap).
    Unreachable,
}

/// A basic block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    /// Source-level label, if the frontend kept one.
    pub name: Option<String>,
    pub insts: Vec<Inst>,
    pub terminator: Terminator,
}

/// A function definition or declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<(VarId, Ty)>,
    /// Return type (None for void).
    pub ret: Option<Ty>,
    /// Whether the signature is variadic.
    pub variadic: bool,
    /// Basic blocks in layout order; the first block is the entry block.
    /// Empty for declarations.
    pub blocks: Vec<Block>,
}

impl Function {
    /// True if this function has no body.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Build an external declaration. Parameter variables are synthesized
    /// since declarations carry types only.
    pub fn declaration(name: impl Into<String>, params: Vec<Ty>, ret: Option<Ty>) -> Function {
        Function {
            name: name.into(),
            params: params
                .into_iter()
                .enumerate()
                .map(|(i, ty)| (VarId(i as u32), ty))
                .collect(),
            ret,
            variadic: false,
            blocks: Vec::new(),
        }
    }

    /// The entry block, if this function has a body.
    pub fn entry(&self) -> Option<&Block> {
        self.blocks.first()
    }
}

/// One field of a data global's initializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataField {
    U32(u32),
    U64(u64),
    /// Pointer-sized relocation.
    Ptr(Address),
    /// Null-terminated string constant.
    CStr(String),
}

/// A module-level data global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataGlobal {
    pub name: String,
    /// Section placement; `None` leaves the choice to the compiler.
    pub section: Option<String>,
    /// Alignment in bytes.
    pub align: u32,
    /// Private (module-local) linkage.
    pub internal: bool,
    pub constant: bool,
    /// Survives link-time dead stripping (marked so the linker keeps it).
    pub retained: bool,
    pub init: Vec<DataField>,
}

/// A global constructor or destructor registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitEntry {
    pub priority: u32,
    /// Symbol of the no-argument function to run.
    pub func: String,
}

/// A complete module: the unit the pass consumes and rewrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Stable module identifier (a path); its basename names the static
    /// descriptor file.
    pub id: String,
    pub layout: TargetLayout,
    /// Functions in declaration order.
    pub functions: Vec<Function>,
    pub globals: Vec<DataGlobal>,
    /// Platform global-constructor registrations.
    pub ctors: Vec<InitEntry>,
    /// Platform global-destructor registrations.
    pub dtors: Vec<InitEntry>,
}

impl Module {
    /// Create an empty module with the default (64-bit) layout.
    pub fn new(id: impl Into<String>) -> Module {
        Module {
            id: id.into(),
            layout: TargetLayout::default(),
            functions: Vec::new(),
            globals: Vec::new(),
            ctors: Vec::new(),
            dtors: Vec::new(),
        }
    }

    /// Look up a function by symbol name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Look up a data global by symbol name.
    pub fn global(&self, name: &str) -> Option<&DataGlobal> {
        self.globals.iter().find(|g| g.name == name)
    }
}
