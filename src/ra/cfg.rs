//! CFG construction: a single forward walk over the node stream.
//!
//! The walk assigns node positions, groups nodes into blocks, wires
//! predecessor/successor edges, and deletes instruction nodes that can never
//! execute. Architecture specifics stay behind the [`Machine`] trait: its
//! `on_inst` hook describes each instruction's register uses to the tied
//! builder and classifies it as a jump.

use log::{debug, trace};

use crate::core::bits::RegStats;
use crate::core::error::{Error, PassResult};
use crate::ir::node::{NodeId, NodeKind, NodeList};
use crate::ir::vreg::VirtRegMap;

use super::block::BlockId;
use super::pass::RaPass;

/// Control-flow classification of an instruction-like node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    /// Falls through.
    None,
    /// Unconditional jump; the following code is unreachable.
    Direct,
    /// Conditional jump with a taken edge and a fall-through edge.
    Conditional,
    /// Function return.
    Return,
}

/// Architecture hooks consumed by the middle-end.
pub trait Machine<'arena> {
    /// Called once per function before any step runs; sets register counts
    /// and globally allocable masks on the pass.
    fn on_init(&mut self, pass: &mut RaPass<'arena>, body: &NodeList, func: NodeId);

    /// Called after the steps finish, on success and on error alike.
    fn on_done(&mut self, pass: &mut RaPass<'arena>);

    /// Describe one instruction-like node: build its tied-register array,
    /// store it on the node, merge its statistics into `stats`, and classify
    /// the jump.
    fn on_inst(
        &mut self,
        pass: &mut RaPass<'arena>,
        body: &NodeList,
        vregs: &mut VirtRegMap,
        node: NodeId,
        block: BlockId,
        stats: &mut RegStats,
    ) -> PassResult<JumpKind>;
}

/// STEP 1: build the CFG and remove unreachable instructions.
pub fn construct_cfg<'arena, M: Machine<'arena>>(
    pass: &mut RaPass<'arena>,
    machine: &mut M,
    body: &mut NodeList,
    vregs: &mut VirtRegMap,
    func: NodeId,
) -> PassResult<()> {
    debug!("pass: construct CFG");

    if body.first() != Some(func) {
        return Err(Error::InvalidState);
    }
    let end = {
        let data = body.func_data(func).ok_or(Error::InvalidState)?;
        if !data.finished {
            return Err(Error::InvalidState);
        }
        data.end.ok_or(Error::InvalidState)?
    };

    // The entry block starts at the function node itself.
    let mut current: Option<BlockId> = Some(pass.new_block(Some(func)));
    let mut has_code = false;
    let mut block_index = 0usize;
    let mut position = 0u32;
    let mut stats = RegStats::new();
    let mut node = func;

    loop {
        'walk: loop {
            position += 1;
            body.node_mut(node).position = position;

            if let Some(label) = body.node(node).label() {
                match current {
                    None => {
                        // Unreachable region; a label makes code reachable
                        // again.
                        if let Some(block) = pass.label_block(label) {
                            current = Some(block);
                            if pass.block(block).is_constructed() {
                                break 'walk;
                            }
                            has_code = false;
                            stats = RegStats::new();
                        } else {
                            let block = pass.new_block(Some(node));
                            pass.set_label_block(label, block);
                            current = Some(block);
                            has_code = false;
                            stats = RegStats::new();
                        }
                    }
                    Some(cur) => {
                        // The label ends the current block.
                        let prev = body.node(node).prev().ok_or(Error::InvalidState)?;
                        pass.block_mut(cur).last = Some(prev);
                        pass.block_mut(cur).make_constructed(stats);

                        match pass.label_block(label) {
                            Some(successor) if successor == cur => {
                                // Adjacent labels resolving to one block; any
                                // code in between would be a stream error.
                                if has_code {
                                    return Err(Error::InvalidState);
                                }
                            }
                            Some(successor) => {
                                pass.append_successor(cur, successor);
                                trace!("pass: block #{} falls into #{}", cur.0, successor.0);
                                current = Some(successor);
                                has_code = false;
                                stats = RegStats::new();
                            }
                            None => {
                                if has_code {
                                    let successor = pass.new_block(Some(node));
                                    pass.set_label_block(label, successor);
                                    pass.append_successor(cur, successor);
                                    current = Some(successor);
                                    has_code = false;
                                    stats = RegStats::new();
                                } else {
                                    // Block has no code yet; the label joins it.
                                    pass.set_label_block(label, cur);
                                }
                            }
                        }
                    }
                }
            } else if body.node(node).acts_as_inst() {
                let cur = match current {
                    Some(cur) => cur,
                    None => {
                        // Unreachable instruction; delete it now, the
                        // assembler could never encode its virtual registers.
                        let next = body.node(node).next();
                        body.remove(node);
                        pass.stats_mut().nodes_removed += 1;
                        position -= 1;
                        node = next.ok_or(Error::InvalidState)?;
                        continue 'walk;
                    }
                };

                has_code = true;
                let jump = machine.on_inst(pass, body, vregs, node, cur, &mut stats)?;

                if jump == JumpKind::Direct || jump == JumpKind::Conditional {
                    // The final operand must be the target label, which also
                    // covers explicit-register forms of jecxz and friends.
                    let target = match &body.node(node).kind {
                        NodeKind::Inst(inst) => inst.ops.last().and_then(|op| op.as_label()),
                        _ => None,
                    }
                    .ok_or(Error::InvalidState)?;
                    let label_node = body.label_node(target).ok_or(Error::InvalidState)?;
                    let jump_successor = pass.new_block_or_merge_with(body, label_node)?;

                    pass.block_mut(cur).last = Some(node);
                    pass.block_mut(cur).make_constructed(stats);
                    pass.append_successor(cur, jump_successor);

                    if jump == JumpKind::Direct {
                        // Fall-through is unreachable.
                        trace!("pass: block #{} jumps to #{}", cur.0, jump_successor.0);
                        current = None;
                    } else {
                        let next = body.node(node).next().ok_or(Error::InvalidState)?;
                        let flow_successor = if let Some(flow_label) = body.node(next).label() {
                            match pass.label_block(flow_label) {
                                Some(block) => block,
                                None => {
                                    let block = pass.new_block(Some(next));
                                    pass.set_label_block(flow_label, block);
                                    block
                                }
                            }
                        } else {
                            pass.new_block(Some(next))
                        };

                        // The taken edge went in first and sits at successor
                        // position 0; the fall-through lands at position 1.
                        pass.append_successor(cur, flow_successor);
                        trace!(
                            "pass: block #{} branches to #{}, falls into #{}",
                            cur.0,
                            jump_successor.0,
                            flow_successor.0
                        );

                        current = Some(flow_successor);
                        has_code = false;
                        stats = RegStats::new();
                        node = next;

                        if pass.block(flow_successor).is_constructed() {
                            break 'walk;
                        }
                        continue 'walk;
                    }
                }
            } else {
                match &body.node(node).kind {
                    NodeKind::Sentinel(_) if node == end => {
                        if let Some(cur) = current {
                            pass.block_mut(cur).last = Some(node);
                            pass.block_mut(cur).make_constructed(stats);
                            pass.push_exit(cur);
                        }
                        break 'walk;
                    }
                    NodeKind::FuncEntry(_) if node != func => {
                        // Only one function per stream.
                        return Err(Error::InvalidState);
                    }
                    // Everything else is transparent to control flow.
                    _ => {}
                }
            }

            // A function stream always ends with its sentinel; running off
            // the list means the stream is corrupted.
            node = body.node(node).next().ok_or(Error::InvalidState)?;
        }

        // The current block is done; pick up the next block that was created
        // but never walked, or finish.
        loop {
            block_index += 1;
            if block_index >= pass.block_count() {
                pass.set_nodes_count(position);
                debug!(
                    "pass: CFG done ({} blocks, {} nodes)",
                    pass.block_count(),
                    position
                );
                return Ok(());
            }
            if !pass.block(BlockId(block_index as u32)).is_constructed() {
                break;
            }
        }

        let resumed = BlockId(block_index as u32);
        node = pass.block(resumed).last.ok_or(Error::InvalidState)?;
        current = Some(resumed);
        has_code = false;
        stats = RegStats::new();
    }
}
