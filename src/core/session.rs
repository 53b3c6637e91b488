//! Arena-backed allocation for one function pass.
//!
//! Every analysis structure the pass produces lives in a zone borrowed for the
//! duration of `RaPass::run`. The zone is a thin wrapper over [`bumpalo::Bump`]
//! that turns allocation failure into [`Error::NoHeapMemory`] instead of
//! aborting; the caller owns the `Bump` and resets it between functions, which
//! reclaims everything in O(1) without running destructors.

use core::alloc::Layout;
use core::ptr;
use core::slice;

use bumpalo::Bump;

use super::error::{Error, PassResult};

/// Zone handle borrowed by the pass.
///
/// Cheap to copy; all allocations share the lifetime of the underlying arena,
/// which must outlive the pass that fills it.
#[derive(Clone, Copy)]
pub struct PassZone<'arena> {
    arena: &'arena Bump,
}

impl<'arena> PassZone<'arena> {
    /// Borrow an arena for one function pass.
    pub fn new(arena: &'arena Bump) -> Self {
        Self { arena }
    }

    /// Allocate a single value in the zone.
    pub fn alloc<T>(&self, value: T) -> PassResult<&'arena mut T> {
        self.arena.try_alloc(value).map_err(|_| Error::NoHeapMemory)
    }

    /// Copy a slice into the zone and return the zone-owned copy.
    pub fn alloc_slice_copy<T: Copy>(&self, src: &[T]) -> PassResult<&'arena [T]> {
        if src.is_empty() {
            return Ok(&[]);
        }
        let layout = Layout::for_value(src);
        let dst = self
            .arena
            .try_alloc_layout(layout)
            .map_err(|_| Error::NoHeapMemory)?;
        // The arena handed us a fresh, properly aligned allocation of the
        // slice's exact layout; T: Copy so a raw byte copy is a valid value.
        unsafe {
            let dst = dst.as_ptr() as *mut T;
            ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
            Ok(slice::from_raw_parts(dst, src.len()))
        }
    }

    /// Bytes currently allocated from the underlying arena.
    pub fn allocated_bytes(&self) -> usize {
        self.arena.allocated_bytes()
    }
}

/// Counters collected while a pass runs, for diagnostics only.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassStats {
    /// Nodes assigned a position by the CFG walk.
    pub nodes_visited: u32,
    /// Unreachable instruction nodes deleted from the stream.
    pub nodes_removed: u32,
    /// Sweeps the dominator fixpoint needed.
    pub dom_sweeps: u32,
    /// Blocks popped by the liveness work-list.
    pub liveness_visits: u32,
}

impl PassStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_value() {
        let arena = Bump::new();
        let zone = PassZone::new(&arena);
        let v = zone.alloc(42u32).unwrap();
        assert_eq!(*v, 42);
    }

    #[test]
    fn test_alloc_slice_copy() {
        let arena = Bump::new();
        let zone = PassZone::new(&arena);

        let s = zone.alloc_slice_copy(&[1u64, 2, 3]).unwrap();
        assert_eq!(s, &[1, 2, 3]);

        let empty: &[u64] = zone.alloc_slice_copy(&[]).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_slice_is_independent_copy() {
        let arena = Bump::new();
        let zone = PassZone::new(&arena);

        let mut src = vec![7u32, 8];
        let copy = zone.alloc_slice_copy(&src).unwrap();
        src[0] = 99;
        assert_eq!(copy, &[7, 8]);
    }
}
