//! Textual form of the IR.
//!
//! The static descriptor reproduces each instruction's printed form verbatim,
//! so this rendering is part of the pass's output contract: stable, compact,
//! one line per instruction.

use super::types::*;
use std::fmt;

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block_{}", self.0)
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Int { bits } => write!(f, "i{}", bits),
            Ty::F32 => write!(f, "f32"),
            Ty::F64 => write!(f, "f64"),
            Ty::Ptr => write!(f, "ptr"),
            Ty::Agg { store_bytes } => write!(f, "agg{}", store_bytes),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int { bits, value } => write!(f, "i{} {}", bits, value),
            ConstValue::F32(v) => write!(f, "f32 {}", v),
            ConstValue::F64(v) => write!(f, "f64 {}", v),
            ConstValue::NullPtr => write!(f, "ptr null"),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Function(name) | Address::Global(name) => write!(f, "@{}", name),
            Address::BlockAddr { func, block } => {
                write!(f, "blockaddress(@{}, {})", func, block)
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(v) => write!(f, "{}", v),
            Operand::U32(v) => write!(f, "{}", v),
            Operand::U64(v) => write!(f, "{}", v),
            Operand::Bool(v) => write!(f, "{}", v),
            Operand::Addr(a) => write!(f, "{}", a),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
            BinOp::AShr => "ashr",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for CmpPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::Ult => "ult",
            CmpPred::Ule => "ule",
            CmpPred::Slt => "slt",
            CmpPred::Sle => "sle",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CastOp::PtrToInt => "ptrtoint",
            CastOp::ZExt => "zext",
            CastOp::Trunc => "trunc",
            CastOp::Bitcast => "bitcast",
        };
        write!(f, "{}", s)
    }
}

/// Render a call's callee. Split out because intrinsics and inline asm have
/// their own spellings.
fn fmt_callee(callee: &Callee, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match callee {
        Callee::Direct(name) => write!(f, "@{}", name),
        Callee::Indirect(v) => write!(f, "{}", v),
        Callee::Intrinsic(name) => write!(f, "@intrinsic.{}", name),
        Callee::Asm(asm) => {
            if asm.sideeffect {
                write!(f, "asm sideeffect {:?}", asm.template)
            } else {
                write!(f, "asm {:?}", asm.template)
            }
        }
    }
}

fn fmt_args(args: &[Operand], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "(")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    write!(f, ")")
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Const { dest, value } => write!(f, "{} = const {}", dest, value),
            Inst::BinOp {
                dest,
                op,
                ty,
                lhs,
                rhs,
            } => write!(f, "{} = {} {} {}, {}", dest, op, ty, lhs, rhs),
            Inst::Cmp {
                dest,
                pred,
                ty,
                lhs,
                rhs,
            } => write!(f, "{} = icmp {} {} {}, {}", dest, pred, ty, lhs, rhs),
            Inst::Load { dest, ty, addr } => write!(f, "{} = load {}, ptr {}", dest, ty, addr),
            Inst::Store { ty, value, addr } => write!(f, "store {} {}, ptr {}", ty, value, addr),
            Inst::Call { dest, callee, args } => {
                if let Some((dest, ty)) = dest {
                    write!(f, "{} = call {} ", dest, ty)?;
                } else {
                    write!(f, "call ")?;
                }
                fmt_callee(callee, f)?;
                fmt_args(args, f)
            }
            Inst::Select {
                dest,
                ty,
                cond,
                if_true,
                if_false,
            } => write!(f, "{} = select {} {}, {}, {}", dest, ty, cond, if_true, if_false),
            Inst::Cast { dest, op, src, to } => write!(f, "{} = {} {} to {}", dest, op, src, to),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Return { value: Some(v) } => write!(f, "ret {}", v),
            Terminator::Return { value: None } => write!(f, "ret void"),
            Terminator::Jump { target } => write!(f, "br {}", target),
            Terminator::BranchIf {
                cond,
                if_true,
                if_false,
            } => write!(f, "br {}, {}, {}", cond, if_true, if_false),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}
