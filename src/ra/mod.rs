//! The register-allocation middle-end.
//!
//! Data flow: node stream -> [`cfg`] (blocks + tied arrays on instructions)
//! -> post-order view -> dominators -> loops -> liveness. The downstream
//! allocator consumes the blocks, the per-instruction [`tied::RaData`], and
//! the dominance queries; everything here is scoped to one function pass.

pub mod block;
pub mod cfg;
pub mod pass;
pub mod tied;

pub use block::{BlockFlags, BlockId, LoopId, RaBlock, RaLoop, POV_UNASSIGNED};
pub use cfg::{construct_cfg, JumpKind, Machine};
pub use pass::{LiveSpan, RaPass, WorkReg};
pub use tied::{RaData, RaTiedBuilder, TiedReg, TIED_CAPACITY};
