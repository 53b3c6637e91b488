//! Client-facing function builder.
//!
//! `FuncBuilder` owns the node stream and the virtual-register table and
//! exposes the emit surface: open a function, create registers and labels,
//! append instructions, and close the function with its end sentinel. The
//! middle-end then runs over the finished stream; nodes and registers outlive
//! the pass, analysis data does not.

use smallvec::SmallVec;

use super::node::{
    CallData, FrameInfo, FuncData, InstData, InstId, LabelId, NodeId, NodeKind, NodeList, Operand,
    RetData, SentinelKind, Signature,
};
use super::vreg::{RegKind, VirtId, VirtRegMap};
use crate::core::error::{Error, PassResult};

/// Builds one function's node stream.
#[derive(Debug, Default)]
pub struct FuncBuilder {
    body: NodeList,
    vregs: VirtRegMap,
    func: Option<NodeId>,
}

impl FuncBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a function. Must be the first node of the stream.
    pub fn add_func(&mut self, signature: Signature) -> PassResult<NodeId> {
        if self.body.first().is_some() || self.func.is_some() {
            return Err(Error::InvalidState);
        }
        let exit_label = self.body.new_label();
        let args = vec![None; signature.args.len()];
        let func = self.body.append(NodeKind::FuncEntry(FuncData {
            signature,
            frame: FrameInfo::default(),
            args,
            exit_label,
            end: None,
            finished: false,
        }));
        self.func = Some(func);
        Ok(func)
    }

    /// Close the current function with its end sentinel.
    pub fn end_func(&mut self) -> PassResult<NodeId> {
        let func = self.func.ok_or(Error::InvalidState)?;
        let end = self.body.append(NodeKind::Sentinel(SentinelKind::FuncEnd));
        let data = self.body.func_data_mut(func).ok_or(Error::InvalidState)?;
        if data.finished {
            return Err(Error::InvalidState);
        }
        data.end = Some(end);
        data.finished = true;
        Ok(end)
    }

    /// Create a virtual register.
    pub fn new_vreg(&mut self, kind: RegKind, size: u32, name: &str) -> VirtId {
        self.vregs.new_reg(kind, size, name)
    }

    /// Bind function argument `index` to a virtual register.
    pub fn set_arg(&mut self, index: usize, vreg: VirtId) -> PassResult<()> {
        let func = self.func.ok_or(Error::InvalidState)?;
        let data = self.body.func_data_mut(func).ok_or(Error::InvalidState)?;
        let slot = data.args.get_mut(index).ok_or(Error::InvalidState)?;
        *slot = Some(vreg);
        Ok(())
    }

    /// Reserve a label for later binding.
    pub fn new_label(&mut self) -> LabelId {
        self.body.new_label()
    }

    /// Bind a label at the current end of the stream.
    pub fn bind(&mut self, label: LabelId) -> NodeId {
        self.body.bind_label(label)
    }

    /// Append an instruction node.
    pub fn inst(&mut self, inst: impl Into<InstId>, ops: &[Operand]) -> NodeId {
        self.body.append(NodeKind::Inst(InstData {
            inst: inst.into(),
            options: 0,
            extra_reg: None,
            ops: SmallVec::from_slice(ops),
        }))
    }

    /// Append an instruction with the extra register (REP count or {k} mask).
    pub fn inst_extra(
        &mut self,
        inst: impl Into<InstId>,
        extra_reg: VirtId,
        ops: &[Operand],
    ) -> NodeId {
        self.body.append(NodeKind::Inst(InstData {
            inst: inst.into(),
            options: 0,
            extra_reg: Some(extra_reg),
            ops: SmallVec::from_slice(ops),
        }))
    }

    /// Append a function-return node.
    pub fn ret(&mut self, ops: &[Operand]) -> NodeId {
        self.body.append(NodeKind::FuncRet(RetData {
            ops: SmallVec::from_slice(ops),
        }))
    }

    /// Append a function-call node.
    pub fn call(
        &mut self,
        target: Operand,
        args: &[Operand],
        rets: [Option<VirtId>; 2],
    ) -> NodeId {
        self.body.append(NodeKind::FuncCall(CallData {
            target,
            args: SmallVec::from_slice(args),
            rets,
        }))
    }

    /// Append an alignment directive.
    pub fn align(&mut self, alignment: u32) -> NodeId {
        self.body.append(NodeKind::Align { alignment })
    }

    /// Append a comment node.
    pub fn comment(&mut self, text: &str) -> NodeId {
        self.body.append(NodeKind::Comment {
            text: text.to_string(),
        })
    }

    /// Append an embedded data node.
    pub fn embed(&mut self, bytes: &[u8]) -> NodeId {
        self.body.append(NodeKind::Data {
            bytes: bytes.to_vec(),
        })
    }

    /// The function entry node, once opened.
    pub fn func(&self) -> Option<NodeId> {
        self.func
    }

    pub fn body(&self) -> &NodeList {
        &self.body
    }

    pub fn vregs(&self) -> &VirtRegMap {
        &self.vregs
    }

    /// Mutable access to the stream and register table together, as the pass
    /// needs them.
    pub fn parts_mut(&mut self) -> (&mut NodeList, &mut VirtRegMap) {
        (&mut self.body, &mut self.vregs)
    }

    /// Configure the function frame.
    pub fn set_preserved_fp(&mut self, preserved: bool) -> PassResult<()> {
        let func = self.func.ok_or(Error::InvalidState)?;
        let data = self.body.func_data_mut(func).ok_or(Error::InvalidState)?;
        data.frame.preserved_fp = preserved;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_straight_line() {
        let mut fb = FuncBuilder::new();
        let func = fb.add_func(Signature::default()).unwrap();
        let v0 = fb.new_vreg(RegKind::Gp, 8, "v0");
        fb.inst(InstId(0), &[Operand::Reg(v0), Operand::Imm(1)]);
        fb.ret(&[Operand::Reg(v0)]);
        let end = fb.end_func().unwrap();

        let data = fb.body().func_data(func).unwrap();
        assert!(data.finished);
        assert_eq!(data.end, Some(end));

        let kinds: Vec<bool> = fb
            .body()
            .iter()
            .map(|id| fb.body().node(id).acts_as_inst())
            .collect();
        assert_eq!(kinds, vec![false, true, true, false]);
    }

    #[test]
    fn test_func_must_be_first() {
        let mut fb = FuncBuilder::new();
        fb.align(16);
        assert_eq!(fb.add_func(Signature::default()), Err(Error::InvalidState));
    }

    #[test]
    fn test_arg_binding() {
        let mut fb = FuncBuilder::new();
        fb.add_func(Signature {
            args: vec![RegKind::Gp],
            rets: vec![RegKind::Gp],
        })
        .unwrap();
        let v0 = fb.new_vreg(RegKind::Gp, 8, "a");
        fb.set_arg(0, v0).unwrap();
        assert_eq!(fb.set_arg(1, v0), Err(Error::InvalidState));

        let func = fb.func().unwrap();
        assert_eq!(fb.body().func_data(func).unwrap().args[0], Some(v0));
    }
}
