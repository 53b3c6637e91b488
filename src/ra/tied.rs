//! Tied registers: the per-instruction operand descriptor.
//!
//! One tied entry bundles everything the allocator needs to know about one
//! virtual register at one instruction: its read/write role, the physical
//! registers it may be allocated to, and any fixed input/output pins. The
//! builder collects entries for one instruction at a time, merging repeated
//! mentions of the same virtual register, and stores the finalized array on
//! the instruction's [`RaData`].

use crate::core::bits::{BitWord, RegCount, RegMask};
use crate::core::bits::RegStats;
use crate::core::error::{Error, PassResult};
use crate::ir::node::NodeId;
use crate::ir::vreg::{RegKind, VirtId, VirtRegMap, WorkId, MAX_REG_KINDS};

use super::block::{BlockFlags, BlockId};
use super::pass::RaPass;

/// One virtual register's use at one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiedReg {
    /// The virtual register.
    pub vreg: VirtId,
    /// Its work register in the current pass; the bit index in liveness sets.
    pub work: WorkId,
    /// Register kind, cached for kind-grouped storage.
    pub kind: RegKind,
    /// Role flags, see the associated constants.
    pub flags: u16,
    /// Mask of physical registers allocable at this site.
    pub allocable: u32,
    /// How many operand slots of the instruction mention this register.
    pub ref_count: u8,
    /// Fixed input register, `None` = any.
    pub r_phys: Option<u8>,
    /// Fixed output register, `None` = any.
    pub w_phys: Option<u8>,
}

impl TiedReg {
    /// Register read.
    pub const R: u16 = 0x0001;
    /// Register write.
    pub const W: u16 = 0x0002;
    /// Register read-write.
    pub const X: u16 = 0x0003;
    /// Use can be satisfied by a memory read.
    pub const R_MEM: u16 = 0x0004;
    /// Use can be satisfied by a memory write.
    pub const W_MEM: u16 = 0x0008;
    /// Use can be satisfied by a memory read-write.
    pub const X_MEM: u16 = 0x000C;
    /// Function argument passed in a register.
    pub const FUNC_ARG: u16 = 0x0010;
    /// Function return value in a register.
    pub const FUNC_RET: u16 = 0x0020;
    /// Write that must not coalesce with any reader at the same site.
    pub const W_EXCLUSIVE: u16 = 0x0080;

    pub const EMPTY: TiedReg = TiedReg {
        vreg: VirtId(0),
        work: WorkId(0),
        kind: RegKind::Gp,
        flags: 0,
        allocable: 0,
        ref_count: 0,
        r_phys: None,
        w_phys: None,
    };

    pub fn is_read_only(&self) -> bool {
        self.flags & Self::X == Self::R
    }

    pub fn is_write_only(&self) -> bool {
        self.flags & Self::X == Self::W
    }

    pub fn is_read_write(&self) -> bool {
        self.flags & Self::X == Self::X
    }
}

/// Analysis data attached to one instruction node.
///
/// The tied array is grouped by register kind; `tied_index`/`tied_count`
/// locate each kind's slice. The live-out snapshot is filled by the liveness
/// step.
#[derive(Debug, Clone, Copy)]
pub struct RaData<'arena> {
    /// Tied entries, grouped by kind.
    pub tied: &'arena [TiedReg],
    /// Start index of each kind's group.
    pub tied_index: RegCount,
    /// Entry count per kind.
    pub tied_count: RegCount,
    /// Fixed input registers required by this instruction.
    pub in_regs: RegMask,
    /// Fixed output registers produced by this instruction.
    pub out_regs: RegMask,
    /// Registers clobbered if this is a call site.
    pub clobbered: RegMask,
    /// Work registers live across this instruction; words of a bit set
    /// indexed by [`WorkId`].
    pub live_out: Option<&'arena [BitWord]>,
}

impl<'arena> RaData<'arena> {
    pub fn tied_total(&self) -> usize {
        self.tied.len()
    }

    /// Tied entries of one register kind.
    pub fn tied_of_kind(&self, kind: RegKind) -> &'arena [TiedReg] {
        let start = self.tied_index.get(kind) as usize;
        let count = self.tied_count.get(kind) as usize;
        &self.tied[start..start + count]
    }

    /// Find the tied entry of a virtual register, if it is mentioned here.
    pub fn find_tied(&self, vreg: VirtId) -> Option<&'arena TiedReg> {
        self.tied.iter().find(|t| t.vreg == vreg)
    }
}

/// Working-buffer capacity of the tied builder; bounds the registers one
/// instruction can mention.
pub const TIED_CAPACITY: usize = 80;

/// Collects the tied entries of one instruction.
///
/// Transient: create one per instruction, `add` every register mention, then
/// `store_to` the node. `store_to` clears the per-register back-pointers the
/// builder installed, so the next instruction starts clean.
pub struct RaTiedBuilder {
    /// Statistics to merge into the current block.
    pub reg_stats: RegStats,
    /// Registers clobbered by this instruction (call sites).
    pub clobbered: RegMask,
    count: RegCount,
    total: usize,
    entries: [TiedReg; TIED_CAPACITY],
}

impl RaTiedBuilder {
    pub fn new() -> Self {
        Self {
            reg_stats: RegStats::new(),
            clobbered: RegMask::new(),
            count: RegCount::new(),
            total: 0,
            entries: [TiedReg::EMPTY; TIED_CAPACITY],
        }
    }

    /// Number of distinct virtual registers collected so far.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Entries collected so far, in insertion order.
    pub fn entries(&self) -> &[TiedReg] {
        &self.entries[..self.total]
    }

    /// Mutable view used by single-register-case fixups.
    pub fn entries_mut(&mut self) -> &mut [TiedReg] {
        &mut self.entries[..self.total]
    }

    /// Record one mention of `vid` with the given role and constraints.
    ///
    /// A repeated mention merges: flags are OR-ed, the allocable mask is
    /// AND-ed, and fixed ids reconcile. Two distinct fixed outputs on the
    /// same register cannot be honored and fail with `OverlappedRegs`.
    pub fn add(
        &mut self,
        pass: &mut RaPass<'_>,
        vregs: &mut VirtRegMap,
        vid: VirtId,
        flags: u16,
        allocable: u32,
        r_phys: Option<u8>,
        w_phys: Option<u8>,
    ) -> PassResult<()> {
        let (kind, tied_slot) = {
            let vreg = vregs.get(vid).ok_or(Error::InvalidVirtId)?;
            (vreg.kind(), vreg.scratch.tied)
        };

        self.reg_stats.make_used(kind);
        if r_phys.is_some() || w_phys.is_some() {
            self.reg_stats.make_precolored(kind);
        }

        match tied_slot {
            None => {
                if self.total >= TIED_CAPACITY {
                    return Err(Error::InvalidState);
                }
                pass.add_to_work_regs(vregs, vid)?;
                let vreg = vregs.get_mut(vid).ok_or(Error::InvalidVirtId)?;
                let work = vreg.scratch.work.ok_or(Error::InvalidState)?;
                vreg.scratch.tied = Some(self.total as u8);

                self.entries[self.total] = TiedReg {
                    vreg: vid,
                    work,
                    kind,
                    flags,
                    allocable,
                    ref_count: 1,
                    r_phys,
                    w_phys,
                };
                self.count.add(kind, 1);
                self.total += 1;
            }
            Some(slot) => {
                let entry = &mut self.entries[slot as usize];
                debug_assert_eq!(entry.vreg, vid);

                if let Some(w) = w_phys {
                    match entry.w_phys {
                        Some(existing) if existing != w => return Err(Error::OverlappedRegs),
                        _ => entry.w_phys = Some(w),
                    }
                }
                if entry.r_phys.is_none() {
                    entry.r_phys = r_phys;
                }

                entry.ref_count += 1;
                entry.flags |= flags;
                entry.allocable &= allocable;
            }
        }
        Ok(())
    }

    /// Finalize the collected entries onto `node`.
    ///
    /// Entries are copied into the zone grouped by kind, every involved
    /// virtual register's builder back-pointer is cleared, and the block is
    /// marked when any entry carries a fixed register.
    pub fn store_to<'arena>(
        &self,
        pass: &mut RaPass<'arena>,
        vregs: &mut VirtRegMap,
        node: NodeId,
        block: BlockId,
    ) -> PassResult<()> {
        let index = RegCount::indexes_from(&self.count);
        let mut cursors = [0usize; MAX_REG_KINDS];
        for kind in RegKind::ALL {
            cursors[kind.index()] = index.get(kind) as usize;
        }

        let mut grouped = [TiedReg::EMPTY; TIED_CAPACITY];
        let mut in_regs = RegMask::new();
        let mut out_regs = RegMask::new();
        let mut has_fixed = false;

        for tied in self.entries() {
            if let Some(r) = tied.r_phys {
                in_regs.or(tied.kind, 1 << r);
                has_fixed = true;
            }
            if let Some(w) = tied.w_phys {
                out_regs.or(tied.kind, 1 << w);
                has_fixed = true;
            }

            let cursor = &mut cursors[tied.kind.index()];
            grouped[*cursor] = *tied;
            *cursor += 1;

            if let Some(vreg) = vregs.get_mut(tied.vreg) {
                vreg.scratch.tied = None;
            }
            pass.record_work_ref(tied.work, node);
        }

        let tied = pass.zone().alloc_slice_copy(&grouped[..self.total])?;
        if has_fixed {
            pass.block_mut(block).add_flags(BlockFlags::HAS_FIXED_REGS);
        }

        pass.set_ra_data(
            node,
            RaData {
                tied,
                tied_index: index,
                tied_count: self.count,
                in_regs,
                out_regs,
                clobbered: self.clobbered,
                live_out: None,
            },
        );
        Ok(())
    }
}

impl Default for RaTiedBuilder {
    fn default() -> Self {
        Self::new()
    }
}
