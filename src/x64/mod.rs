//! x86/x86-64 backend of the middle-end.
//!
//! - [`inst_db`]: the opcode subset and per-opcode facts the pass consumes.
//! - [`op_rw`]: the operand read/write table with fixed-register cases.
//! - [`machine`]: the [`crate::ra::Machine`] implementation.

pub mod inst_db;
pub mod machine;
pub mod op_rw;

pub use inst_db::{info, CommonData, SingleRegCase, UseKind, X64Inst};
pub use machine::{Arch, X64Machine};
pub use op_rw::{gp, lookup, OpRw, MAX_RW_OPS};
