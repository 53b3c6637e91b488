//! The function pass: pass-wide state and the analysis steps.
//!
//! `RaPass` owns everything the middle-end computes for one function: the
//! blocks and their edges, the post-order view, the dominator tree, loops,
//! work registers, and the per-instruction [`RaData`]. `run` drives the steps
//! in order — CFG, POV, dominators, loops, liveness — and guarantees cleanup
//! of the virtual-register scratch state on every exit path.

use core::cell::Cell;
use core::mem;

use bumpalo::Bump;
use log::{debug, trace};

use crate::core::bits::{LiveBits, RegCount, RegMask};
use crate::core::error::{Error, PassResult};
use crate::core::session::{PassStats, PassZone};
use crate::ir::node::{LabelId, NodeId, NodeList};
use crate::ir::vreg::{RegKind, VirtId, VirtRegMap, WorkId, MAX_REG_KINDS};

use super::block::{BlockFlags, BlockId, LoopId, RaBlock, RaLoop};
use super::cfg::{construct_cfg, Machine};
use super::tied::RaData;

/// Half-open interval of node positions where a work register is live.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LiveSpan {
    pub start: u32,
    pub end: u32,
}

/// Pass-scoped handle for a virtual register.
///
/// The work id is the register's bit index in every liveness set of the
/// current pass. Work registers do not outlive the pass.
#[derive(Debug)]
pub struct WorkReg {
    work_id: WorkId,
    virt_id: VirtId,
    kind: RegKind,
    /// Per-node live-in bits, filled by the allocator.
    pub live_in: LiveBits,
    /// Per-node live-out bits, filled by the allocator.
    pub live_out: LiveBits,
    /// Live spans, filled by the allocator.
    pub live_range: Vec<LiveSpan>,
    /// Nodes that mention this register.
    pub refs: Vec<NodeId>,
}

impl WorkReg {
    pub fn work_id(&self) -> WorkId {
        self.work_id
    }

    pub fn virt_id(&self) -> VirtId {
        self.virt_id
    }

    pub fn kind(&self) -> RegKind {
        self.kind
    }
}

/// Per-function analysis pass.
pub struct RaPass<'arena> {
    zone: PassZone<'arena>,

    blocks: Vec<RaBlock>,
    /// Blocks containing the function's end; usually one.
    exits: Vec<BlockId>,
    /// Post-order view of the reachable blocks.
    pov: Vec<BlockId>,
    loops: Vec<RaLoop>,

    work_regs: Vec<WorkReg>,
    work_regs_of_kind: [Vec<WorkId>; MAX_REG_KINDS],

    /// Label id -> block starting at that label.
    label_blocks: Vec<Option<BlockId>>,
    /// Node index -> analysis data of that instruction.
    ra_data: Vec<Option<RaData<'arena>>>,

    /// Machine register count per kind, set by the architecture hook.
    pub arch_reg_count: RegCount,
    /// Globally allocable registers, set by the architecture hook.
    pub allocable_regs: RegMask,
    /// Registers clobbered anywhere in the function.
    pub clobbered_regs: RegMask,

    nodes_count: u32,
    timestamp_generator: Cell<u64>,
    stats: PassStats,
}

impl<'arena> RaPass<'arena> {
    /// Borrow `arena` as the pass zone.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            zone: PassZone::new(arena),
            blocks: Vec::new(),
            exits: Vec::new(),
            pov: Vec::new(),
            loops: Vec::new(),
            work_regs: Vec::new(),
            work_regs_of_kind: Default::default(),
            label_blocks: Vec::new(),
            ra_data: Vec::new(),
            arch_reg_count: RegCount::new(),
            allocable_regs: RegMask::new(),
            clobbered_regs: RegMask::new(),
            nodes_count: 0,
            timestamp_generator: Cell::new(0),
            stats: PassStats::default(),
        }
    }

    pub fn zone(&self) -> PassZone<'arena> {
        self.zone
    }

    pub fn blocks(&self) -> &[RaBlock] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> &RaBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut RaBlock {
        &mut self.blocks[id.index()]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Entry block; the first block created by the CFG walk.
    pub fn entry_block(&self) -> Option<BlockId> {
        if self.blocks.is_empty() {
            None
        } else {
            Some(BlockId(0))
        }
    }

    pub fn exits(&self) -> &[BlockId] {
        &self.exits
    }

    pub fn pov(&self) -> &[BlockId] {
        &self.pov
    }

    pub fn loops(&self) -> &[RaLoop] {
        &self.loops
    }

    pub fn work_regs(&self) -> &[WorkReg] {
        &self.work_regs
    }

    pub fn work_reg_count(&self) -> usize {
        self.work_regs.len()
    }

    pub fn work_regs_of_kind(&self, kind: RegKind) -> &[WorkId] {
        &self.work_regs_of_kind[kind.index()]
    }

    /// Analysis data of an instruction node, once the CFG walk stored it.
    pub fn ra_data(&self, node: NodeId) -> Option<&RaData<'arena>> {
        self.ra_data.get(node.index()).and_then(|d| d.as_ref())
    }

    pub fn set_ra_data(&mut self, node: NodeId, data: RaData<'arena>) {
        let index = node.index();
        if index >= self.ra_data.len() {
            self.ra_data.resize(index + 1, None);
        }
        self.ra_data[index] = Some(data);
    }

    /// Count of nodes positioned by the CFG walk.
    pub fn nodes_count(&self) -> u32 {
        self.nodes_count
    }

    pub(crate) fn set_nodes_count(&mut self, count: u32) {
        self.nodes_count = count;
        self.stats.nodes_visited = count;
    }

    pub fn stats(&self) -> PassStats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut PassStats {
        &mut self.stats
    }

    // ------------------------------------------------------------------
    // Work registers
    // ------------------------------------------------------------------

    /// Ensure `vid` has a work register in this pass.
    pub fn add_to_work_regs(&mut self, vregs: &mut VirtRegMap, vid: VirtId) -> PassResult<()> {
        let vreg = vregs.get_mut(vid).ok_or(Error::InvalidVirtId)?;
        if vreg.scratch.work.is_some() {
            return Ok(());
        }
        let kind = vreg.kind();
        let work_id = WorkId(self.work_regs.len() as u32);
        vreg.scratch.work = Some(work_id);

        self.work_regs.push(WorkReg {
            work_id,
            virt_id: vid,
            kind,
            live_in: LiveBits::new(),
            live_out: LiveBits::new(),
            live_range: Vec::new(),
            refs: Vec::new(),
        });
        self.work_regs_of_kind[kind.index()].push(work_id);
        Ok(())
    }

    /// Record that `node` mentions the given work register.
    pub(crate) fn record_work_ref(&mut self, work: WorkId, node: NodeId) {
        self.work_regs[work.index()].refs.push(node);
    }

    // ------------------------------------------------------------------
    // Blocks and edges
    // ------------------------------------------------------------------

    /// Create a block, optionally anchored at `initial_node`.
    pub fn new_block(&mut self, initial_node: Option<NodeId>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(RaBlock::new(id, initial_node));
        id
    }

    pub fn label_block(&self, label: LabelId) -> Option<BlockId> {
        self.label_blocks.get(label.index()).copied().flatten()
    }

    pub(crate) fn set_label_block(&mut self, label: LabelId, block: BlockId) {
        let index = label.index();
        if index >= self.label_blocks.len() {
            self.label_blocks.resize(index + 1, None);
        }
        self.label_blocks[index] = Some(block);
    }

    /// Resolve the block a jump target label belongs to, creating one if
    /// needed.
    ///
    /// Walks backwards over adjacent labels and non-emitting nodes: if any
    /// neighboring label already has a block, that block is reused and
    /// retroactively assigned to every label in between, so a run of
    /// consecutive labels resolves to a single block without ever merging
    /// across code.
    pub fn new_block_or_merge_with(
        &mut self,
        body: &NodeList,
        label_node: NodeId,
    ) -> PassResult<BlockId> {
        let label = body.node(label_node).label().ok_or(Error::InvalidState)?;
        if let Some(block) = self.label_block(label) {
            return Ok(block);
        }

        let mut pending: Vec<NodeId> = Vec::new();
        let mut found: Option<BlockId> = None;
        let mut cursor = body.node(label_node).prev();
        while let Some(id) = cursor {
            let node = body.node(id);
            if let Some(neighbor) = node.label() {
                if let Some(block) = self.label_block(neighbor) {
                    found = Some(block);
                    break;
                }
                pending.push(id);
            } else if !(node.is_informative() || node.has_no_effect()) {
                break;
            }
            cursor = node.prev();
        }

        let block = match found {
            Some(block) => block,
            None => self.new_block(None),
        };

        self.set_label_block(label, block);
        let mut earliest = label_node;
        for &pending_node in &pending {
            if let Some(pending_label) = body.node(pending_node).label() {
                self.set_label_block(pending_label, block);
            }
            earliest = pending_node;
        }

        let blk = self.block_mut(block);
        if blk.first.is_none() {
            blk.first = Some(earliest);
            blk.last = Some(label_node);
        }
        Ok(block)
    }

    /// Connect `pred -> succ` on both sides. Idempotent.
    pub fn append_successor(&mut self, pred: BlockId, succ: BlockId) {
        if self.blocks[pred.index()].successors.contains(&succ) {
            return;
        }
        debug_assert!(!self.blocks[succ.index()].predecessors.contains(&pred));
        self.blocks[pred.index()].successors.push(succ);
        self.blocks[succ.index()].predecessors.push(pred);
    }

    /// Like [`append_successor`](Self::append_successor), but installs the
    /// edge at position zero on both sides.
    pub fn prepend_successor(&mut self, pred: BlockId, succ: BlockId) {
        if self.blocks[pred.index()].successors.contains(&succ) {
            return;
        }
        debug_assert!(!self.blocks[succ.index()].predecessors.contains(&pred));
        self.blocks[pred.index()].successors.insert(0, succ);
        self.blocks[succ.index()].predecessors.insert(0, pred);
    }

    // ------------------------------------------------------------------
    // Dominance
    // ------------------------------------------------------------------

    fn next_timestamp(&self) -> u64 {
        let ts = self.timestamp_generator.get() + 1;
        self.timestamp_generator.set(ts);
        ts
    }

    /// Whether `a` dominates `b`, with `a == b` counting as false.
    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return false;
        }
        let entry = BlockId(0);
        if a == entry {
            return true;
        }
        if b == entry {
            return false;
        }

        let mut cursor = self.block(b).idom;
        while let Some(idom) = cursor {
            if idom == a {
                return true;
            }
            if idom == entry {
                return false;
            }
            cursor = self.block(idom).idom;
        }
        false
    }

    /// Whether `a` dominates `b`, with `a == b` counting as true.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        a == b || self.strictly_dominates(a, b)
    }

    /// Nearest common dominator of `a` and `b`.
    ///
    /// Marks `a`'s dominator chain with a fresh timestamp, then scans `b`'s
    /// chain for the first marked block; no per-query allocation.
    pub fn nearest_common_dominator(&self, a: BlockId, b: BlockId) -> BlockId {
        if a == b {
            return a;
        }
        if self.strictly_dominates(a, b) {
            return a;
        }
        if self.strictly_dominates(b, a) {
            return b;
        }

        let entry = BlockId(0);
        let timestamp = self.next_timestamp();

        let mut cursor = self.block(a).idom;
        while let Some(block) = cursor {
            if block == entry {
                break;
            }
            self.block(block).timestamp.set(timestamp);
            cursor = self.block(block).idom;
        }

        let mut cursor = self.block(b).idom;
        while let Some(block) = cursor {
            if block == entry {
                break;
            }
            if self.block(block).timestamp.get() == timestamp {
                return block;
            }
            cursor = self.block(block).idom;
        }
        entry
    }

    // ------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------

    /// STEP 2: build the post-order view of the reachable blocks.
    pub fn construct_pov(&mut self) -> PassResult<()> {
        debug!("pass: construct POV over {} blocks", self.blocks.len());
        if self.blocks.is_empty() {
            return Ok(());
        }

        let count = self.blocks.len();
        self.pov.reserve(count);

        let mut visited = LiveBits::with_len(count);
        let mut stack: Vec<(BlockId, usize)> = Vec::new();
        let mut current = BlockId(0);
        let mut next_succ = 0usize;
        visited.set(0, true);

        loop {
            loop {
                if next_succ >= self.block(current).successors.len() {
                    break;
                }
                let child = self.block(current).successors[next_succ];
                next_succ += 1;
                if visited.get(child.index()) {
                    continue;
                }
                visited.set(child.index(), true);
                stack.push((current, next_succ));
                current = child;
                next_succ = 0;
            }

            self.blocks[current.index()].pov_order = self.pov.len() as u32;
            self.pov.push(current);
            match stack.pop() {
                Some((block, index)) => {
                    current = block;
                    next_succ = index;
                }
                None => break,
            }
        }
        Ok(())
    }

    fn intersect(&self, x: BlockId, y: BlockId) -> BlockId {
        let mut b1 = x;
        let mut b2 = y;
        while b1 != b2 {
            while self.block(b2).pov_order > self.block(b1).pov_order {
                b1 = self.block(b1).idom.expect("idom set during intersection");
            }
            while self.block(b1).pov_order > self.block(b2).pov_order {
                b2 = self.block(b2).idom.expect("idom set during intersection");
            }
        }
        b1
    }

    /// STEP 3: iterative immediate dominators over reverse postorder.
    pub fn construct_dom(&mut self) -> PassResult<()> {
        debug!("pass: construct DOM");
        if self.blocks.is_empty() {
            return Ok(());
        }

        let entry = BlockId(0);
        self.blocks[entry.index()].idom = Some(entry);

        let mut changed = true;
        let mut sweeps = 0u32;
        while changed {
            sweeps += 1;
            changed = false;

            for pov_index in (0..self.pov.len()).rev() {
                let block = self.pov[pov_index];
                if block == entry {
                    continue;
                }

                let mut new_idom: Option<BlockId> = None;
                for pred_index in 0..self.block(block).predecessors.len() {
                    let pred = self.block(block).predecessors[pred_index];
                    if self.block(pred).idom.is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(cur) => self.intersect(cur, pred),
                    });
                }

                if let Some(new_idom) = new_idom {
                    if self.block(block).idom != Some(new_idom) {
                        trace!("pass: idom of #{} -> #{}", block.0, new_idom.0);
                        self.blocks[block.index()].idom = Some(new_idom);
                        changed = true;
                    }
                }
            }
        }

        self.stats.dom_sweeps = sweeps;
        debug!("pass: DOM done ({sweeps} sweeps)");
        Ok(())
    }

    /// STEP 4: natural loops from back edges.
    ///
    /// An edge `p -> h` where `h` dominates `p` is a back edge; the loop body
    /// is everything that reaches `p` without passing `h`. Blocks keep their
    /// innermost loop, and each containing loop adds one to a block's weight.
    pub fn construct_loops(&mut self) -> PassResult<()> {
        debug!("pass: construct loops");

        let mut headers: Vec<BlockId> = Vec::new();
        let mut latches: Vec<(BlockId, BlockId)> = Vec::new();
        for &block in &self.pov {
            for &succ in &self.blocks[block.index()].successors {
                if self.dominates(succ, block) {
                    latches.push((succ, block));
                    if !headers.contains(&succ) {
                        headers.push(succ);
                    }
                }
            }
        }

        // Outermost first: outer headers come earlier in reverse postorder,
        // i.e. have a higher post-order index.
        headers.sort_by(|a, b| {
            self.block(*b)
                .pov_order
                .cmp(&self.block(*a).pov_order)
        });

        for header in headers {
            let loop_id = LoopId(self.loops.len() as u32);
            let parent = self.block(header).loop_id;

            let mut visited = LiveBits::with_len(self.blocks.len());
            visited.set(header.index(), true);
            let mut members = vec![header];
            let mut stack: Vec<BlockId> = latches
                .iter()
                .filter(|&&(h, _)| h == header)
                .map(|&(_, latch)| latch)
                .collect();

            while let Some(block) = stack.pop() {
                if visited.get(block.index()) {
                    continue;
                }
                visited.set(block.index(), true);
                members.push(block);
                for &pred in &self.blocks[block.index()].predecessors {
                    stack.push(pred);
                }
            }

            for &member in &members {
                let block = &mut self.blocks[member.index()];
                block.loop_id = Some(loop_id);
                block.weight += 1;
            }

            trace!("pass: loop #{} header #{} ({} blocks)", loop_id.0, header.0, members.len());
            self.loops.push(RaLoop {
                id: loop_id,
                header,
                parent,
                blocks: members,
            });
        }
        Ok(())
    }

    /// STEP 5: liveness.
    ///
    /// Phase 1 derives GEN/KILL per block from the tied arrays, walking each
    /// block's instructions last to first, and snapshots the running live set
    /// onto each instruction before applying its own effects. Phase 2 runs
    /// the IN/OUT fixpoint on a work-list.
    pub fn construct_liveness(&mut self, body: &NodeList) -> PassResult<()> {
        let num_work_regs = self.work_regs.len();
        debug!(
            "pass: construct liveness ({} blocks, {num_work_regs} work registers)",
            self.blocks.len()
        );
        if num_work_regs == 0 {
            return Ok(());
        }

        let mut work_list: Vec<BlockId> = Vec::new();
        let mut live = LiveBits::with_len(num_work_regs);

        // Phase 1: GEN / KILL, reverse postorder.
        for pov_index in (0..self.pov.len()).rev() {
            let block = self.pov[pov_index];
            self.blocks[block.index()].resize_live_bits(num_work_regs);
            work_list.push(block);
            live.clear_all();

            let stop = self.block(block).first.ok_or(Error::InvalidState)?;
            let mut node = self.block(block).last.ok_or(Error::InvalidState)?;
            loop {
                if body.node(node).acts_as_inst() {
                    let tied = self
                        .ra_data(node)
                        .ok_or(Error::InvalidState)?
                        .tied;

                    let snapshot = self.zone.alloc_slice_copy(live.words())?;
                    if let Some(data) = self.ra_data[node.index()].as_mut() {
                        data.live_out = Some(snapshot);
                    }

                    for tied_reg in tied {
                        let work_index = tied_reg.work.index();
                        let blk = &mut self.blocks[block.index()];
                        if tied_reg.is_write_only() {
                            blk.live_kill.set(work_index, true);
                            live.set(work_index, false);
                        } else {
                            blk.live_kill.set(work_index, false);
                            blk.live_gen.set(work_index, true);
                            live.set(work_index, true);
                        }
                    }
                }

                if node == stop {
                    break;
                }
                node = body.node(node).prev().ok_or(Error::InvalidState)?;
            }
        }

        // Phase 2: IN / OUT fixpoint.
        let mut visits = 0u32;
        while let Some(block) = work_list.pop() {
            visits += 1;

            let first_visit = !self.block(block).has_flag(BlockFlags::HAS_LIVENESS);
            if first_visit {
                self.blocks[block.index()].add_flags(BlockFlags::HAS_LIVENESS);
            }
            let mut changed = first_visit;

            let mut out = mem::take(&mut self.blocks[block.index()].live_out);
            for succ_index in 0..self.block(block).successors.len() {
                let succ = self.block(block).successors[succ_index];
                changed |= out.or_assign(&self.block(succ).live_in);
            }
            self.blocks[block.index()].live_out = out;

            if changed {
                let mut live_in = mem::take(&mut self.blocks[block.index()].live_in);
                let blk = &self.blocks[block.index()];
                let changed = live_in.assign_live_in(&blk.live_out, &blk.live_gen, &blk.live_kill);
                self.blocks[block.index()].live_in = live_in;

                if changed {
                    for pred_index in 0..self.block(block).predecessors.len() {
                        let pred = self.block(block).predecessors[pred_index];
                        if self.block(pred).has_flag(BlockFlags::HAS_LIVENESS) {
                            work_list.push(pred);
                        }
                    }
                }
            }
        }

        self.stats.liveness_visits = visits;
        debug!("pass: liveness done ({visits} visits)");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Orchestration
    // ------------------------------------------------------------------

    /// Run all steps over one function.
    ///
    /// The architecture hook is initialized first and torn down on every exit
    /// path; virtual-register scratch fields are cleared on entry and exit.
    /// On error all pass state is discarded; on success it stays available
    /// for the downstream allocator.
    pub fn run<M: Machine<'arena>>(
        &mut self,
        machine: &mut M,
        body: &mut NodeList,
        vregs: &mut VirtRegMap,
        func: NodeId,
    ) -> PassResult<()> {
        self.clear();
        self.ra_data = vec![None; body.node_count()];
        self.label_blocks = vec![None; body.label_count()];
        vregs.reset_scratch();

        machine.on_init(self, body, func);
        let result = self.run_steps(machine, body, vregs, func);
        machine.on_done(self);

        vregs.reset_scratch();
        if result.is_err() {
            self.clear();
        }
        result
    }

    fn run_steps<M: Machine<'arena>>(
        &mut self,
        machine: &mut M,
        body: &mut NodeList,
        vregs: &mut VirtRegMap,
        func: NodeId,
    ) -> PassResult<()> {
        construct_cfg(self, machine, body, vregs, func)?;
        self.construct_pov()?;
        self.construct_dom()?;
        self.construct_loops()?;
        self.construct_liveness(body)?;
        Ok(())
    }

    /// Discard all pass state.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.exits.clear();
        self.pov.clear();
        self.loops.clear();
        self.work_regs.clear();
        for list in &mut self.work_regs_of_kind {
            list.clear();
        }
        self.label_blocks.clear();
        self.ra_data.clear();
        self.arch_reg_count.reset();
        self.allocable_regs.reset();
        self.clobbered_regs.reset();
        self.nodes_count = 0;
        self.timestamp_generator.set(0);
        self.stats.reset();
    }

    pub(crate) fn push_exit(&mut self, block: BlockId) {
        self.exits.push(block);
    }

    /// Render one block's liveness sets, for diagnostics.
    pub fn format_block_liveness(&self, block: BlockId) -> String {
        let blk = self.block(block);
        let fmt = |bits: &LiveBits| {
            let ids: Vec<String> = bits.iter_ones().map(|i| format!("w{i}")).collect();
            ids.join(", ")
        };
        format!(
            "IN [{}] OUT [{}] GEN [{}] KILL [{}]",
            fmt(&blk.live_in),
            fmt(&blk.live_out),
            fmt(&blk.live_gen),
            fmt(&blk.live_kill)
        )
    }
}
