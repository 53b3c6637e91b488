//! Basic blocks and loops as the pass sees them.

use core::cell::Cell;

use crate::core::bits::{LiveBits, RegStats};
use crate::ir::node::NodeId;

/// Index of a block within one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a loop within one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopId(pub u32);

impl LoopId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Block flag bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockFlags(u32);

impl BlockFlags {
    /// Block has been closed by the CFG walk.
    pub const CONSTRUCTED: BlockFlags = BlockFlags(0x01);
    /// Executed at most once (initialization code).
    pub const SINGLE_PASS: BlockFlags = BlockFlags(0x02);
    /// Liveness fixpoint has visited this block at least once.
    pub const HAS_LIVENESS: BlockFlags = BlockFlags(0x04);
    /// Block contains precolored (fixed) registers.
    pub const HAS_FIXED_REGS: BlockFlags = BlockFlags(0x10);
    /// Block contains function calls.
    pub const HAS_FUNC_CALLS: BlockFlags = BlockFlags(0x20);

    pub const fn contains(self, other: BlockFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Post-order index value meaning "not reached by the POV walk".
pub const POV_UNASSIGNED: u32 = u32::MAX;

/// One basic block.
#[derive(Debug)]
pub struct RaBlock {
    id: BlockId,
    flags: BlockFlags,
    /// First node of the block, inclusive.
    pub first: Option<NodeId>,
    /// Last node of the block, inclusive.
    pub last: Option<NodeId>,
    /// Execution weight; each containing loop adds one.
    pub weight: u32,
    /// Index in the post-order view, [`POV_UNASSIGNED`] until computed.
    pub pov_order: u32,
    /// Register statistics merged from the block's instructions.
    pub reg_stats: RegStats,
    /// Visitor mark used by dominance queries.
    pub timestamp: Cell<u64>,
    /// Innermost loop containing this block.
    pub loop_id: Option<LoopId>,
    /// Immediate dominator.
    pub idom: Option<BlockId>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
    pub live_in: LiveBits,
    pub live_out: LiveBits,
    pub live_gen: LiveBits,
    pub live_kill: LiveBits,
}

impl RaBlock {
    pub fn new(id: BlockId, initial_node: Option<NodeId>) -> Self {
        Self {
            id,
            flags: BlockFlags::default(),
            first: initial_node,
            last: initial_node,
            weight: 0,
            pov_order: POV_UNASSIGNED,
            reg_stats: RegStats::new(),
            timestamp: Cell::new(0),
            loop_id: None,
            idom: None,
            predecessors: Vec::new(),
            successors: Vec::new(),
            live_in: LiveBits::new(),
            live_out: LiveBits::new(),
            live_gen: LiveBits::new(),
            live_kill: LiveBits::new(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn flags(&self) -> BlockFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: BlockFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn add_flags(&mut self, flags: BlockFlags) {
        self.flags.0 |= flags.0;
    }

    pub fn is_constructed(&self) -> bool {
        self.has_flag(BlockFlags::CONSTRUCTED)
    }

    /// Close the block and fold in the statistics gathered while walking it.
    pub fn make_constructed(&mut self, stats: RegStats) {
        self.flags.0 |= BlockFlags::CONSTRUCTED.0;
        self.reg_stats.combine(stats);
    }

    pub fn is_entry(&self) -> bool {
        self.predecessors.is_empty()
    }

    pub fn is_exit(&self) -> bool {
        self.successors.is_empty()
    }

    /// Size all four liveness sets to the pass's work-register count.
    pub fn resize_live_bits(&mut self, len: usize) {
        self.live_in.resize(len);
        self.live_out.resize(len);
        self.live_gen.resize(len);
        self.live_kill.resize(len);
    }
}

/// One natural loop.
#[derive(Debug)]
pub struct RaLoop {
    pub id: LoopId,
    /// Loop header block.
    pub header: BlockId,
    /// Enclosing loop, if nested.
    pub parent: Option<LoopId>,
    /// Member blocks, header included.
    pub blocks: Vec<BlockId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::vreg::RegKind;

    #[test]
    fn test_flags_and_construction() {
        let mut block = RaBlock::new(BlockId(0), None);
        assert!(!block.is_constructed());

        let mut stats = RegStats::new();
        stats.make_used(RegKind::Gp);
        block.make_constructed(stats);
        assert!(block.is_constructed());
        assert!(block.reg_stats.has_used(RegKind::Gp));

        block.add_flags(BlockFlags::HAS_FIXED_REGS);
        assert!(block.has_flag(BlockFlags::HAS_FIXED_REGS));
        assert!(!block.has_flag(BlockFlags::HAS_FUNC_CALLS));
    }

    #[test]
    fn test_resize_live_bits() {
        let mut block = RaBlock::new(BlockId(1), None);
        block.resize_live_bits(72);
        assert_eq!(block.live_in.len(), 72);
        assert_eq!(block.live_kill.len(), 72);
    }
}
