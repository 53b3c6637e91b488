//! AArch64 backend, stubbed.
//!
//! The hooks exist so the pass can be wired up, but instruction description
//! is not implemented yet; any instruction reports [`Error::InvalidArch`].

use crate::core::bits::RegStats;
use crate::core::error::{Error, PassResult};
use crate::ir::node::{NodeId, NodeList};
use crate::ir::vreg::VirtRegMap;
use crate::ra::block::BlockId;
use crate::ra::cfg::{JumpKind, Machine};
use crate::ra::pass::RaPass;

/// Placeholder AArch64 machine hook.
#[derive(Debug, Default)]
pub struct A64Machine;

impl A64Machine {
    pub fn new() -> Self {
        Self
    }
}

impl<'arena> Machine<'arena> for A64Machine {
    fn on_init(&mut self, _pass: &mut RaPass<'arena>, _body: &NodeList, _func: NodeId) {}

    fn on_done(&mut self, _pass: &mut RaPass<'arena>) {}

    fn on_inst(
        &mut self,
        _pass: &mut RaPass<'arena>,
        _body: &NodeList,
        _vregs: &mut VirtRegMap,
        _node: NodeId,
        _block: BlockId,
        _stats: &mut RegStats,
    ) -> PassResult<JumpKind> {
        Err(Error::InvalidArch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FuncBuilder;
    use crate::ir::node::{Operand, Signature};
    use crate::ir::vreg::RegKind;
    use crate::x64::inst_db::X64Inst;
    use bumpalo::Bump;

    #[test]
    fn test_stub_reports_invalid_arch() {
        let mut fb = FuncBuilder::new();
        fb.add_func(Signature::default()).unwrap();
        let v0 = fb.new_vreg(RegKind::Gp, 8, "v0");
        fb.inst(X64Inst::Mov, &[Operand::Reg(v0), Operand::Imm(1)]);
        fb.end_func().unwrap();

        let arena = Bump::new();
        let mut pass = RaPass::new(&arena);
        let func = fb.func().unwrap();
        let (body, vregs) = fb.parts_mut();
        let result = pass.run(&mut A64Machine::new(), body, vregs, func);
        assert_eq!(result, Err(Error::InvalidArch));
    }
}
