//! Instruction metadata the middle-end needs.
//!
//! This is not an instruction database: only the facts the register-allocation
//! pass consumes are kept — the generic operand-use template, whether the
//! instruction has fixed register/memory semantics, the single-register
//! special case, and the jump classification.

use crate::ir::node::InstId;
use crate::ra::cfg::JumpKind;

macro_rules! define_insts {
    ($($name:ident),* $(,)?) => {
        /// Opcodes understood by the x86/x86-64 backend.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum X64Inst {
            $($name),*
        }

        impl X64Inst {
            const ALL: &'static [X64Inst] = &[$(X64Inst::$name),*];

            /// Decode a raw opcode id; `None` for undefined ids.
            pub fn from_id(id: InstId) -> Option<X64Inst> {
                Self::ALL.get(id.0 as usize).copied()
            }

            pub fn id(self) -> InstId {
                InstId(self as u16)
            }
        }

        impl From<X64Inst> for InstId {
            fn from(inst: X64Inst) -> InstId {
                inst.id()
            }
        }
    };
}

define_insts! {
    // Moves and address arithmetic.
    Mov, Movsx, Movzx, Lea,
    // Integer ALU.
    Add, Adc, Sub, Sbb, And, Or, Xor, Not, Neg, Inc, Dec, Cmp, Test,
    Xchg, Xadd, Imul, Mul, Div, Idiv, Mulx,
    // Stack.
    Push, Pop,
    // Shifts and rotates.
    Rcl, Rcr, Rol, Ror, Sal, Sar, Shl, Shr, Shld, Shrd,
    // Sign/zero extension of the accumulator.
    Cbw, Cwde, Cdqe, Cdq, Cwd, Cqo,
    // Deprecated BCD arithmetic.
    Aaa, Aad, Aam, Aas, Daa, Das,
    // System and misc.
    Cpuid, Cmpxchg, Cmpxchg8b, Cmpxchg16b, Lahf, Sahf,
    Rdtsc, Rdtscp, Xsave, Xsave64, Xrstor, Xrstor64, Xsaveopt, Xsaveopt64,
    Xgetbv, Xsetbv, Enter, Leave, Monitor, Mwait, Nop,
    // Port and string I/O.
    In, Ins, Out, Outs, Cmps, Lods, Movs, Scas, Stos,
    // Jumps.
    Jmp, Jo, Jno, Jb, Jae, Je, Jne, Jbe, Ja, Js, Jns, Jp, Jnp, Jl, Jge, Jle, Jg,
    Jecxz, Loop, Loope, Loopne,
    // SSE/AVX subset with register pins.
    Maskmovq, Maskmovdqu, Vmaskmovdqu,
    Blendvpd, Blendvps, Pblendvb, Sha256rnds2,
    Pcmpestri, Vpcmpestri, Pcmpistri, Vpcmpistri,
    Pcmpestrm, Vpcmpestrm, Pcmpistrm, Vpcmpistrm,
    // Plain SSE ALU.
    Movd, Movq, Movaps, Movups, Addps, Addpd, Paddd, Pand, Por, Pxor,
}

/// Generic operand-use template when no fixed registers are involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseKind {
    /// All operands read.
    R,
    /// First operand written, rest read.
    W,
    /// First operand read-write, rest read.
    X,
    /// First two operands read-write, rest read.
    XX,
}

/// Behavior when every operand is the same single register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleRegCase {
    None,
    /// `and x, x` leaves x unchanged; the use degrades to read-only.
    ReadOnly,
    /// `xor x, x` zeroes x regardless; the use degrades to write-only.
    WriteOnly,
}

/// Per-opcode facts consumed by the pass.
#[derive(Debug, Clone, Copy)]
pub struct CommonData {
    pub use_kind: UseKind,
    /// Operand roles depend on fixed registers or operand shape; consult the
    /// read/write table case by case.
    pub fixed_rm: bool,
    pub single_reg: SingleRegCase,
    pub jump: JumpKind,
}

impl CommonData {
    const fn new(use_kind: UseKind) -> CommonData {
        CommonData {
            use_kind,
            fixed_rm: false,
            single_reg: SingleRegCase::None,
            jump: JumpKind::None,
        }
    }

    const fn fixed(self) -> CommonData {
        CommonData {
            fixed_rm: true,
            ..self
        }
    }

    const fn single_reg(self, case: SingleRegCase) -> CommonData {
        CommonData {
            single_reg: case,
            ..self
        }
    }

    const fn jump(self, jump: JumpKind) -> CommonData {
        CommonData { jump, ..self }
    }
}

/// Metadata of one opcode.
pub fn info(inst: X64Inst) -> CommonData {
    use UseKind::*;
    use X64Inst::*;

    match inst {
        Mov | Movsx | Movzx | Lea | Movd | Movq | Movaps | Movups => CommonData::new(W),

        Add | Adc | Not | Neg | Inc | Dec | Addps | Addpd | Paddd => CommonData::new(X),
        Sub | Sbb => CommonData::new(X).single_reg(SingleRegCase::WriteOnly),
        Xor | Pxor => CommonData::new(X).single_reg(SingleRegCase::WriteOnly),
        And | Or | Pand | Por => CommonData::new(X).single_reg(SingleRegCase::ReadOnly),

        Cmp | Test | Nop => CommonData::new(R),
        Xchg | Xadd => CommonData::new(XX),

        Imul | Mul | Div | Idiv | Mulx => CommonData::new(X).fixed(),

        Push | Pop => CommonData::new(R).fixed(),

        Rcl | Rcr | Rol | Ror | Sal | Sar | Shl | Shr | Shld | Shrd => {
            CommonData::new(X).fixed()
        }

        Cbw | Cwde | Cdqe | Cdq | Cwd | Cqo => CommonData::new(X).fixed(),
        Aaa | Aad | Aam | Aas | Daa | Das => CommonData::new(X).fixed(),

        Cpuid | Cmpxchg | Cmpxchg8b | Cmpxchg16b | Lahf | Sahf | Rdtsc | Rdtscp | Xsave
        | Xsave64 | Xrstor | Xrstor64 | Xsaveopt | Xsaveopt64 | Xgetbv | Xsetbv | Enter
        | Leave | Monitor | Mwait => CommonData::new(X).fixed(),

        In | Ins | Out | Outs | Cmps | Lods | Movs | Scas | Stos => CommonData::new(X).fixed(),

        Jmp => CommonData::new(R).jump(JumpKind::Direct),
        Jo | Jno | Jb | Jae | Je | Jne | Jbe | Ja | Js | Jns | Jp | Jnp | Jl | Jge | Jle
        | Jg => CommonData::new(R).jump(JumpKind::Conditional),
        Jecxz | Loop | Loope | Loopne => {
            CommonData::new(R).fixed().jump(JumpKind::Conditional)
        }

        Maskmovq | Maskmovdqu | Vmaskmovdqu | Blendvpd | Blendvps | Pblendvb | Sha256rnds2
        | Pcmpestri | Vpcmpestri | Pcmpistri | Vpcmpistri | Pcmpestrm | Vpcmpestrm
        | Pcmpistrm | Vpcmpistrm => CommonData::new(X).fixed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trip() {
        let id = X64Inst::Cpuid.id();
        assert_eq!(X64Inst::from_id(id), Some(X64Inst::Cpuid));
        assert_eq!(X64Inst::from_id(InstId(u16::MAX)), None);
    }

    #[test]
    fn test_jump_classification() {
        assert_eq!(info(X64Inst::Jmp).jump, JumpKind::Direct);
        assert_eq!(info(X64Inst::Jne).jump, JumpKind::Conditional);
        assert_eq!(info(X64Inst::Loop).jump, JumpKind::Conditional);
        assert_eq!(info(X64Inst::Add).jump, JumpKind::None);
    }

    #[test]
    fn test_single_reg_cases() {
        assert_eq!(info(X64Inst::Xor).single_reg, SingleRegCase::WriteOnly);
        assert_eq!(info(X64Inst::And).single_reg, SingleRegCase::ReadOnly);
        assert_eq!(info(X64Inst::Add).single_reg, SingleRegCase::None);
    }
}
