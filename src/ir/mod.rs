//! The client-facing intermediate representation.
//!
//! - [`node`]: the linked node stream and node payloads.
//! - [`vreg`]: virtual registers and the per-function table.
//! - [`builder`]: the emit surface used to construct functions.

pub mod builder;
pub mod node;
pub mod vreg;

pub use builder::FuncBuilder;
pub use node::{
    CallData, FrameInfo, FuncData, InstData, InstId, LabelId, MemOperand, Node, NodeFlags, NodeId,
    NodeKind, NodeList, Operand, RetData, SentinelKind, Signature,
};
pub use vreg::{RegKind, RegState, StackSlotId, VirtId, VirtReg, VirtRegMap, WorkId, MAX_REG_KINDS};
