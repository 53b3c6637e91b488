//! Virtual registers and the per-function register table.
//!
//! A virtual register is a kind+size placeholder for a value; the allocator
//! later maps it to a physical register or a stack slot. The table is dense:
//! `VirtId` is the index of the register within the function.
//!
//! Registers outlive a pass, but the allocator-transient fields grouped in
//! [`VirtRegScratch`] do not: the pass resets them wholesale on entry and on
//! every exit path, so no stale back-pointer can leak between passes.

/// Index of a virtual register within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtId(pub u32);

impl VirtId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Number of register kinds the middle-end tracks.
pub const MAX_REG_KINDS: usize = 4;

/// Register kind, selecting a physical register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegKind {
    /// General purpose.
    Gp = 0,
    /// Vector (XMM/YMM/ZMM class).
    Vec = 1,
    /// Predicate / mask registers.
    Mask = 2,
    /// Legacy MMX.
    Mm = 3,
}

impl RegKind {
    pub fn index(self) -> usize {
        self as usize
    }

    pub const ALL: [RegKind; MAX_REG_KINDS] = [RegKind::Gp, RegKind::Vec, RegKind::Mask, RegKind::Mm];
}

/// Allocation state of a virtual register, maintained by the allocator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RegState {
    /// Not allocated, not used.
    #[default]
    None,
    /// Currently held in a physical register.
    Reg,
    /// Spilled or homed in memory.
    Mem,
}

/// Index of a home stack slot assigned by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSlotId(pub u32);

/// Index of a work register inside one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkId(pub u32);

impl WorkId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Allocator-transient fields of a virtual register.
///
/// Valid only while a pass runs. `tied` points at the tied-builder entry for
/// the instruction currently being described, `work` at the pass-scoped work
/// register; both are back-pointers that exist to avoid per-mention lookups.
#[derive(Debug, Default, Clone, Copy)]
pub struct VirtRegScratch {
    /// Physical register currently assigned, if any.
    pub phys_id: Option<u8>,
    /// Allocation state.
    pub state: RegState,
    /// Mask of every physical register this value has been homed in.
    pub home_mask: u32,
    /// Home stack slot, assigned by the allocator.
    pub stack_slot: Option<StackSlotId>,
    /// Index of this register's entry in the active tied builder.
    pub tied: Option<u8>,
    /// Work register of the current pass.
    pub work: Option<WorkId>,
}

impl VirtRegScratch {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One virtual register.
#[derive(Debug)]
pub struct VirtReg {
    id: VirtId,
    kind: RegKind,
    size: u32,
    alignment: u32,
    type_id: u8,
    priority: u8,
    name: String,
    /// Pinned to one physical register, never reallocated.
    pub is_fixed: bool,
    /// Only ever used as stack memory.
    pub is_stack: bool,
    /// Constant recreatable by a single instruction; spilling is wasteful.
    pub is_materialized: bool,
    /// Spill when the value goes out of scope.
    pub save_on_unuse: bool,
    /// Pass-transient state, see [`VirtRegScratch`].
    pub scratch: VirtRegScratch,
}

impl VirtReg {
    pub fn id(&self) -> VirtId {
        self.id
    }

    pub fn kind(&self) -> RegKind {
        self.kind
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    pub fn type_id(&self) -> u8 {
        self.type_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: u8) {
        self.priority = priority;
    }
}

/// Dense per-function table of virtual registers.
#[derive(Debug, Default)]
pub struct VirtRegMap {
    regs: Vec<VirtReg>,
}

impl VirtRegMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new virtual register and return its id.
    pub fn new_reg(&mut self, kind: RegKind, size: u32, name: &str) -> VirtId {
        let id = VirtId(self.regs.len() as u32);
        self.regs.push(VirtReg {
            id,
            kind,
            size,
            alignment: size.max(1),
            type_id: 0,
            priority: 0,
            name: name.to_string(),
            is_fixed: false,
            is_stack: false,
            is_materialized: false,
            save_on_unuse: false,
            scratch: VirtRegScratch::default(),
        });
        id
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn get(&self, id: VirtId) -> Option<&VirtReg> {
        self.regs.get(id.index())
    }

    pub fn get_mut(&mut self, id: VirtId) -> Option<&mut VirtReg> {
        self.regs.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtReg> {
        self.regs.iter()
    }

    /// Wipe every register's transient state. Called when a pass starts and
    /// again on every pass exit.
    pub fn reset_scratch(&mut self) {
        for reg in &mut self.regs {
            reg.scratch.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_ids() {
        let mut map = VirtRegMap::new();
        let a = map.new_reg(RegKind::Gp, 8, "a");
        let b = map.new_reg(RegKind::Vec, 16, "b");
        assert_eq!(a, VirtId(0));
        assert_eq!(b, VirtId(1));
        assert_eq!(map.get(b).unwrap().kind(), RegKind::Vec);
        assert!(map.get(VirtId(2)).is_none());
    }

    #[test]
    fn test_scratch_reset() {
        let mut map = VirtRegMap::new();
        let a = map.new_reg(RegKind::Gp, 8, "a");

        let reg = map.get_mut(a).unwrap();
        reg.scratch.work = Some(WorkId(3));
        reg.scratch.tied = Some(1);
        reg.scratch.stack_slot = Some(StackSlotId(0));
        reg.scratch.phys_id = Some(0);

        map.reset_scratch();
        let scratch = &map.get(a).unwrap().scratch;
        assert!(scratch.work.is_none());
        assert!(scratch.tied.is_none());
        assert!(scratch.stack_slot.is_none());
        assert!(scratch.phys_id.is_none());
        assert_eq!(scratch.state, RegState::None);
        assert_eq!(scratch.home_mask, 0);
    }
}
