//! x86/x86-64 architecture hook for the middle-end.
//!
//! `on_init` publishes the register files (counts and globally allocable
//! masks) on the pass; `on_inst` feeds every instruction through the operand
//! read/write table into the tied builder, handles the extra {k}/REP
//! register, applies the single-register special cases, and describes call
//! and return sites with their System V pins.

use crate::core::bits::RegStats;
use crate::core::error::{Error, PassResult};
use crate::ir::node::{MemOperand, NodeId, NodeKind, NodeList, Operand};
use crate::ir::vreg::{RegKind, VirtId, VirtRegMap};
use crate::ra::block::{BlockFlags, BlockId};
use crate::ra::cfg::{JumpKind, Machine};
use crate::ra::pass::RaPass;
use crate::ra::tied::{RaTiedBuilder, TiedReg};

use super::inst_db::{info, SingleRegCase, X64Inst};
use super::op_rw::{gp, lookup, MAX_RW_OPS};

/// Target architecture of the machine hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    /// 32-bit x86.
    X86,
    /// 64-bit x86-64.
    X64,
}

/// System V argument registers, in assignment order.
const GP_ARG_REGS: [u8; 6] = [gp::DI, gp::SI, gp::DX, gp::CX, 8, 9];
const VEC_ARG_REGS: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

/// System V return registers.
const GP_RET_REGS: [u8; 2] = [gp::AX, gp::DX];
const VEC_RET_REGS: [u8; 2] = [0, 1];

/// Caller-saved general-purpose registers.
const GP_CALLER_SAVED: u32 = (1 << gp::AX)
    | (1 << gp::CX)
    | (1 << gp::DX)
    | (1 << gp::SI)
    | (1 << gp::DI)
    | (1 << 8)
    | (1 << 9)
    | (1 << 10)
    | (1 << 11);

fn bits(count: u32) -> u32 {
    if count >= 32 {
        !0
    } else {
        (1u32 << count) - 1
    }
}

fn ret_reg(kind: RegKind, index: usize) -> u8 {
    match kind {
        RegKind::Vec => VEC_RET_REGS[index],
        _ => GP_RET_REGS[index],
    }
}

/// The x86/x86-64 implementation of the [`Machine`] hooks.
pub struct X64Machine {
    arch: Arch,
}

impl X64Machine {
    pub fn new(arch: Arch) -> Self {
        Self { arch }
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    fn add_reg_use(
        &self,
        pass: &mut RaPass<'_>,
        vregs: &mut VirtRegMap,
        tb: &mut RaTiedBuilder,
        vid: VirtId,
        flags: u16,
        r_phys: Option<u8>,
        w_phys: Option<u8>,
    ) -> PassResult<()> {
        let kind = vregs.get(vid).ok_or(Error::InvalidVirtId)?.kind();
        let allocable = pass.allocable_regs.get(kind);
        tb.add(pass, vregs, vid, flags, allocable, r_phys, w_phys)
    }

    /// Base and index of a memory operand are plain reads.
    fn add_mem_use(
        &self,
        pass: &mut RaPass<'_>,
        vregs: &mut VirtRegMap,
        tb: &mut RaTiedBuilder,
        mem: &MemOperand,
    ) -> PassResult<()> {
        if let Some(base) = mem.base {
            self.add_reg_use(pass, vregs, tb, base, TiedReg::R, None, None)?;
        }
        if let Some(index) = mem.index {
            self.add_reg_use(pass, vregs, tb, index, TiedReg::R, None, None)?;
        }
        Ok(())
    }

    fn on_plain_inst(
        &mut self,
        pass: &mut RaPass<'_>,
        body: &NodeList,
        vregs: &mut VirtRegMap,
        node: NodeId,
        block: BlockId,
        stats: &mut RegStats,
    ) -> PassResult<JumpKind> {
        let inst_data = match &body.node(node).kind {
            NodeKind::Inst(data) => data,
            _ => return Err(Error::InvalidState),
        };

        let inst = X64Inst::from_id(inst_data.inst).ok_or(Error::InvalidInstruction)?;
        let common = info(inst);

        let mut tb = RaTiedBuilder::new();
        let op_count = inst_data.ops.len();
        let mut single_reg_ops = 0usize;

        if op_count > 0 {
            let rw = lookup(inst, &common, &inst_data.ops).ok_or(Error::InvalidInstruction)?;
            if op_count > MAX_RW_OPS {
                return Err(Error::InvalidInstruction);
            }

            for (index, op) in inst_data.ops.iter().enumerate() {
                match op {
                    Operand::Reg(vid) => {
                        let slot = rw[index];
                        self.add_reg_use(
                            pass,
                            vregs,
                            &mut tb,
                            *vid,
                            slot.flags,
                            slot.r_phys,
                            slot.w_phys,
                        )?;
                        if single_reg_ops == index {
                            single_reg_ops += 1;
                        }
                    }
                    Operand::Mem(mem) => {
                        self.add_mem_use(pass, vregs, &mut tb, mem)?;
                    }
                    _ => {}
                }
            }
        }

        // Extra register: AVX-512 {k} selector or a REP count.
        if let Some(extra) = inst_data.extra_reg {
            let kind = vregs.get(extra).ok_or(Error::InvalidVirtId)?.kind();
            if kind == RegKind::Mask {
                let allocable = pass.allocable_regs.get(kind);
                tb.add(pass, vregs, extra, TiedReg::R, allocable, None, None)?;
                single_reg_ops = 0;
            } else {
                // REP {cx} counter, read and written.
                tb.add(
                    pass,
                    vregs,
                    extra,
                    TiedReg::X,
                    1 << gp::CX,
                    Some(gp::CX),
                    Some(gp::CX),
                )?;
            }
        }

        // Instructions where all operands collapsed into one register.
        if single_reg_ops == op_count && tb.total() == 1 {
            match common.single_reg {
                SingleRegCase::None => {}
                SingleRegCase::ReadOnly => {
                    tb.entries_mut()[0].flags &= !TiedReg::W;
                }
                SingleRegCase::WriteOnly => {
                    tb.entries_mut()[0].flags &= !TiedReg::R;
                }
            }
        }

        tb.store_to(pass, vregs, node, block)?;
        stats.combine(tb.reg_stats);
        Ok(common.jump)
    }

    fn on_func_ret(
        &mut self,
        pass: &mut RaPass<'_>,
        body: &NodeList,
        vregs: &mut VirtRegMap,
        node: NodeId,
        block: BlockId,
        stats: &mut RegStats,
    ) -> PassResult<JumpKind> {
        let ret_data = match &body.node(node).kind {
            NodeKind::FuncRet(data) => data,
            _ => return Err(Error::InvalidState),
        };

        let mut tb = RaTiedBuilder::new();
        for (index, op) in ret_data.ops.iter().enumerate().take(GP_RET_REGS.len()) {
            match op {
                Operand::Reg(vid) => {
                    let kind = vregs.get(*vid).ok_or(Error::InvalidVirtId)?.kind();
                    let fixed = ret_reg(kind, index);
                    tb.add(
                        pass,
                        vregs,
                        *vid,
                        TiedReg::R | TiedReg::FUNC_RET,
                        1 << fixed,
                        Some(fixed),
                        None,
                    )?;
                }
                Operand::Mem(mem) => {
                    self.add_mem_use(pass, vregs, &mut tb, mem)?;
                }
                _ => {}
            }
        }

        tb.store_to(pass, vregs, node, block)?;
        stats.combine(tb.reg_stats);
        Ok(JumpKind::Return)
    }

    fn on_func_call(
        &mut self,
        pass: &mut RaPass<'_>,
        body: &NodeList,
        vregs: &mut VirtRegMap,
        node: NodeId,
        block: BlockId,
        stats: &mut RegStats,
    ) -> PassResult<JumpKind> {
        let call_data = match &body.node(node).kind {
            NodeKind::FuncCall(data) => data.clone(),
            _ => return Err(Error::InvalidState),
        };

        let mut tb = RaTiedBuilder::new();

        match &call_data.target {
            Operand::Reg(vid) => {
                self.add_reg_use(pass, vregs, &mut tb, *vid, TiedReg::R, None, None)?;
            }
            Operand::Mem(mem) => {
                self.add_mem_use(pass, vregs, &mut tb, mem)?;
            }
            _ => {}
        }

        let mut gp_cursor = 0usize;
        let mut vec_cursor = 0usize;
        for arg in &call_data.args {
            match arg {
                Operand::Reg(vid) => {
                    let kind = vregs.get(*vid).ok_or(Error::InvalidVirtId)?.kind();
                    let assigned = match kind {
                        RegKind::Vec => {
                            let reg = VEC_ARG_REGS.get(vec_cursor).copied();
                            vec_cursor += 1;
                            reg
                        }
                        _ => {
                            let reg = GP_ARG_REGS.get(gp_cursor).copied();
                            gp_cursor += 1;
                            reg
                        }
                    };
                    match assigned {
                        Some(reg) => {
                            tb.add(
                                pass,
                                vregs,
                                *vid,
                                TiedReg::R | TiedReg::FUNC_ARG,
                                1 << reg,
                                Some(reg),
                                None,
                            )?;
                        }
                        // Out of argument registers; passed on the stack.
                        None => {
                            self.add_reg_use(pass, vregs, &mut tb, *vid, TiedReg::R, None, None)?;
                        }
                    }
                }
                Operand::Mem(mem) => {
                    self.add_mem_use(pass, vregs, &mut tb, mem)?;
                }
                _ => {}
            }
        }

        for (index, ret) in call_data.rets.iter().enumerate() {
            if let Some(vid) = ret {
                let kind = vregs.get(*vid).ok_or(Error::InvalidVirtId)?.kind();
                let fixed = ret_reg(kind, index);
                tb.add(
                    pass,
                    vregs,
                    *vid,
                    TiedReg::W | TiedReg::FUNC_RET,
                    1 << fixed,
                    None,
                    Some(fixed),
                )?;
            }
        }

        tb.clobbered.or(RegKind::Gp, GP_CALLER_SAVED);
        tb.clobbered
            .or(RegKind::Vec, bits(self.vec_reg_count()));
        tb.reg_stats.make_clobbered(RegKind::Gp);
        tb.reg_stats.make_clobbered(RegKind::Vec);

        let clobbered = tb.clobbered;
        tb.store_to(pass, vregs, node, block)?;
        pass.clobbered_regs.combine(&clobbered);
        pass.block_mut(block).add_flags(BlockFlags::HAS_FUNC_CALLS);
        stats.combine(tb.reg_stats);
        Ok(JumpKind::None)
    }

    fn vec_reg_count(&self) -> u32 {
        match self.arch {
            Arch::X86 => 8,
            Arch::X64 => 16,
        }
    }
}

impl<'arena> Machine<'arena> for X64Machine {
    fn on_init(&mut self, pass: &mut RaPass<'arena>, body: &NodeList, func: NodeId) {
        let preserved_fp = body
            .func_data(func)
            .map(|data| data.frame.preserved_fp)
            .unwrap_or(false);

        let gp_total: u32 = match self.arch {
            Arch::X86 => 8,
            Arch::X64 => 16,
        };
        let vec_total = self.vec_reg_count();

        let mut gp_allocable = bits(gp_total) & !(1 << gp::SP);
        let mut gp_count = gp_total - 1;
        if preserved_fp {
            gp_allocable &= !(1 << gp::BP);
            gp_count -= 1;
        }

        pass.arch_reg_count.set(RegKind::Gp, gp_count);
        pass.arch_reg_count.set(RegKind::Vec, vec_total);
        pass.arch_reg_count.set(RegKind::Mask, 7);
        pass.arch_reg_count.set(RegKind::Mm, 8);

        pass.allocable_regs.set(RegKind::Gp, gp_allocable);
        pass.allocable_regs.set(RegKind::Vec, bits(vec_total));
        // k0 is not a write target.
        pass.allocable_regs.set(RegKind::Mask, bits(8) & !1);
        pass.allocable_regs.set(RegKind::Mm, bits(8));
    }

    fn on_done(&mut self, _pass: &mut RaPass<'arena>) {}

    fn on_inst(
        &mut self,
        pass: &mut RaPass<'arena>,
        body: &NodeList,
        vregs: &mut VirtRegMap,
        node: NodeId,
        block: BlockId,
        stats: &mut RegStats,
    ) -> PassResult<JumpKind> {
        match &body.node(node).kind {
            NodeKind::Inst(_) => self.on_plain_inst(pass, body, vregs, node, block, stats),
            NodeKind::FuncRet(_) => self.on_func_ret(pass, body, vregs, node, block, stats),
            NodeKind::FuncCall(_) => self.on_func_call(pass, body, vregs, node, block, stats),
            _ => Err(Error::InvalidState),
        }
    }
}
