//! Operand read/write table for x86/x86-64.
//!
//! For each opcode, answers per operand slot: the register role and any fixed
//! input/output physical id. Generic instructions follow the shared R/W/X/XX
//! templates; everything with architectural register pins is enumerated case
//! by case.

use crate::ir::node::Operand;
use crate::ra::tied::TiedReg;

use super::inst_db::{CommonData, UseKind, X64Inst};

/// General-purpose register ids.
pub mod gp {
    pub const AX: u8 = 0;
    pub const CX: u8 = 1;
    pub const DX: u8 = 2;
    pub const BX: u8 = 3;
    pub const SP: u8 = 4;
    pub const BP: u8 = 5;
    pub const SI: u8 = 6;
    pub const DI: u8 = 7;
}

/// Maximum operand slots the table describes.
pub const MAX_RW_OPS: usize = 6;

/// Role and fixed pins of one operand slot.
#[derive(Debug, Clone, Copy)]
pub struct OpRw {
    pub flags: u16,
    pub r_phys: Option<u8>,
    pub w_phys: Option<u8>,
}

const ANY: Option<u8> = None;
const AX: Option<u8> = Some(gp::AX);
const BX: Option<u8> = Some(gp::BX);
const CX: Option<u8> = Some(gp::CX);
const DX: Option<u8> = Some(gp::DX);
const SI: Option<u8> = Some(gp::SI);
const DI: Option<u8> = Some(gp::DI);
/// First register of the vector file; slot kind decides the file.
const V0: Option<u8> = Some(0);

const fn r(id: Option<u8>) -> OpRw {
    OpRw {
        flags: TiedReg::R,
        r_phys: id,
        w_phys: None,
    }
}

const fn w(id: Option<u8>) -> OpRw {
    OpRw {
        flags: TiedReg::W,
        r_phys: None,
        w_phys: id,
    }
}

const fn x(id: Option<u8>) -> OpRw {
    OpRw {
        flags: TiedReg::X,
        r_phys: id,
        w_phys: id,
    }
}

const fn none() -> OpRw {
    OpRw {
        flags: 0,
        r_phys: None,
        w_phys: None,
    }
}

const RWI_R: [OpRw; MAX_RW_OPS] = [r(ANY); MAX_RW_OPS];
const RWI_W: [OpRw; MAX_RW_OPS] = [w(ANY), r(ANY), r(ANY), r(ANY), r(ANY), r(ANY)];
const RWI_X: [OpRw; MAX_RW_OPS] = [x(ANY), r(ANY), r(ANY), r(ANY), r(ANY), r(ANY)];
const RWI_XX: [OpRw; MAX_RW_OPS] = [x(ANY), x(ANY), r(ANY), r(ANY), r(ANY), r(ANY)];

fn seq(list: &[OpRw]) -> [OpRw; MAX_RW_OPS] {
    let mut out = [none(); MAX_RW_OPS];
    out[..list.len()].copy_from_slice(list);
    out
}

fn is_reg(op: Option<&Operand>) -> bool {
    matches!(op, Some(Operand::Reg(_)))
}

fn is_reg_or_mem(op: Option<&Operand>) -> bool {
    matches!(op, Some(Operand::Reg(_)) | Some(Operand::Mem(_)))
}

fn widening_mul(op_count: usize) -> [OpRw; MAX_RW_OPS] {
    if op_count == 2 {
        seq(&[x(AX), r(ANY)])
    } else {
        seq(&[w(DX), x(AX), r(ANY)])
    }
}

/// Per-slot roles of `inst` given its operand vector.
///
/// Returns `None` for instructions the compiler cannot describe.
pub fn lookup(
    inst: X64Inst,
    data: &CommonData,
    ops: &[Operand],
) -> Option<[OpRw; MAX_RW_OPS]> {
    if !data.fixed_rm {
        return Some(match data.use_kind {
            UseKind::R => RWI_R,
            UseKind::W => RWI_W,
            UseKind::X => RWI_X,
            UseKind::XX => RWI_XX,
        });
    }

    use X64Inst::*;
    let op_count = ops.len();

    Some(match inst {
        Aaa | Aad | Aam | Aas | Daa | Das => seq(&[x(AX)]),

        Cpuid => seq(&[x(AX), w(BX), x(CX), w(DX)]),

        Cbw | Cdqe | Cwde => seq(&[x(AX)]),
        Cdq | Cwd | Cqo => seq(&[w(DX), r(AX)]),

        Cmpxchg => seq(&[x(ANY), r(ANY), x(AX)]),
        Cmpxchg8b | Cmpxchg16b => seq(&[none(), x(DX), x(AX), r(CX), r(BX)]),

        Div | Idiv => {
            if op_count == 2 {
                seq(&[x(AX), r(ANY)])
            } else {
                seq(&[x(DX), x(AX), r(ANY)])
            }
        }

        Imul => {
            // Two-operand and immediate forms behave like plain ALU ops; the
            // widening form shares MUL's AX/DX pins.
            if op_count == 2 {
                RWI_X
            } else if op_count == 3
                && !(is_reg(ops.first()) && is_reg(ops.get(1)) && is_reg_or_mem(ops.get(2)))
            {
                RWI_X
            } else {
                widening_mul(op_count)
            }
        }
        Mul => widening_mul(op_count),

        Mulx => seq(&[w(ANY), w(ANY), r(ANY), r(DX)]),

        Jecxz | Loop | Loope | Loopne => seq(&[r(CX)]),

        Lahf => seq(&[w(AX)]),
        Sahf => seq(&[r(AX)]),

        Monitor | Mwait => return None,

        Push => RWI_R,
        Pop => RWI_W,

        Rcl | Rcr | Rol | Ror | Sal | Sar | Shl | Shr => {
            // Shift by CL only when the count operand is a register.
            if is_reg(ops.get(1)) {
                seq(&[x(ANY), r(CX)])
            } else {
                RWI_X
            }
        }
        Shld | Shrd => {
            if is_reg(ops.get(2)) {
                seq(&[x(ANY), r(ANY), r(CX)])
            } else {
                RWI_X
            }
        }

        Rdtsc | Rdtscp => seq(&[w(DX), w(AX), w(CX)]),

        Xrstor | Xrstor64 | Xsave | Xsave64 | Xsaveopt | Xsaveopt64 => {
            seq(&[w(ANY), r(DX), r(AX)])
        }
        Xgetbv => seq(&[w(DX), w(AX), r(CX)]),
        Xsetbv => seq(&[r(DX), r(AX), r(CX)]),

        In => seq(&[w(AX), r(DX)]),
        Ins => seq(&[x(DI), r(DX)]),
        Out => seq(&[r(DX), r(AX)]),
        Outs => seq(&[r(DX), x(SI)]),

        Cmps => seq(&[x(SI), x(DI)]),
        Lods => seq(&[w(AX), x(SI)]),
        Movs => seq(&[x(DI), x(SI)]),
        Scas => seq(&[x(DI), r(AX)]),
        Stos => seq(&[x(DI), r(AX)]),

        Maskmovq | Maskmovdqu | Vmaskmovdqu => seq(&[r(ANY), r(ANY), r(DI)]),

        Blendvpd | Blendvps | Pblendvb | Sha256rnds2 => seq(&[w(ANY), r(ANY), r(V0)]),

        Pcmpestri | Vpcmpestri => seq(&[r(ANY), r(ANY), none(), w(CX)]),
        Pcmpistri | Vpcmpistri => seq(&[r(ANY), r(ANY), none(), w(CX), r(AX), r(DX)]),
        Pcmpestrm | Vpcmpestrm => seq(&[r(ANY), r(ANY), none(), w(V0)]),
        Pcmpistrm | Vpcmpistrm => seq(&[r(ANY), r(ANY), none(), w(V0), r(AX), r(DX)]),

        _ => RWI_X,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::vreg::VirtId;
    use crate::x64::inst_db::info;

    #[test]
    fn test_generic_templates() {
        let mov = info(X64Inst::Mov);
        let rw = lookup(X64Inst::Mov, &mov, &[]).unwrap();
        assert_eq!(rw[0].flags, TiedReg::W);
        assert_eq!(rw[1].flags, TiedReg::R);

        let add = info(X64Inst::Add);
        let rw = lookup(X64Inst::Add, &add, &[]).unwrap();
        assert_eq!(rw[0].flags, TiedReg::X);
    }

    #[test]
    fn test_div_forms() {
        let data = info(X64Inst::Div);
        let ops2 = [Operand::Reg(VirtId(0)), Operand::Reg(VirtId(1))];
        let rw = lookup(X64Inst::Div, &data, &ops2).unwrap();
        assert_eq!(rw[0].r_phys, Some(gp::AX));
        assert_eq!(rw[0].w_phys, Some(gp::AX));

        let ops3 = [
            Operand::Reg(VirtId(0)),
            Operand::Reg(VirtId(1)),
            Operand::Reg(VirtId(2)),
        ];
        let rw = lookup(X64Inst::Div, &data, &ops3).unwrap();
        assert_eq!(rw[0].r_phys, Some(gp::DX));
        assert_eq!(rw[1].r_phys, Some(gp::AX));
        assert_eq!(rw[2].r_phys, None);
    }

    #[test]
    fn test_shift_by_cl_only_for_register_count() {
        let data = info(X64Inst::Shl);
        let by_reg = [Operand::Reg(VirtId(0)), Operand::Reg(VirtId(1))];
        let rw = lookup(X64Inst::Shl, &data, &by_reg).unwrap();
        assert_eq!(rw[1].r_phys, Some(gp::CX));

        let by_imm = [Operand::Reg(VirtId(0)), Operand::Imm(3)];
        let rw = lookup(X64Inst::Shl, &data, &by_imm).unwrap();
        assert_eq!(rw[1].r_phys, None);
    }

    #[test]
    fn test_monitor_unsupported() {
        let data = info(X64Inst::Monitor);
        assert!(lookup(X64Inst::Monitor, &data, &[]).is_none());
    }
}
