//! jitforge — run-time machine-code generation, compiler middle-end.
//!
//! Client code builds a function in an intermediate representation over an
//! unbounded pool of virtual registers; this crate turns that linear node
//! stream into the data structures a register allocator consumes: a
//! control-flow graph with unreachable code removed, a post-order view,
//! immediate dominators, natural loops, and per-block/per-instruction
//! liveness.
//!
//! # Usage
//!
//! ```
//! use bumpalo::Bump;
//! use jitforge::ir::{FuncBuilder, Operand, RegKind, Signature};
//! use jitforge::ra::RaPass;
//! use jitforge::x64::{Arch, X64Inst, X64Machine};
//!
//! let mut fb = FuncBuilder::new();
//! let func = fb.add_func(Signature::default()).unwrap();
//! let v0 = fb.new_vreg(RegKind::Gp, 8, "v0");
//! fb.inst(X64Inst::Mov, &[Operand::Reg(v0), Operand::Imm(1)]);
//! fb.inst(X64Inst::Add, &[Operand::Reg(v0), Operand::Imm(2)]);
//! fb.ret(&[Operand::Reg(v0)]);
//! fb.end_func().unwrap();
//!
//! let arena = Bump::new();
//! let mut pass = RaPass::new(&arena);
//! let mut machine = X64Machine::new(Arch::X64);
//! let (body, vregs) = fb.parts_mut();
//! pass.run(&mut machine, body, vregs, func).unwrap();
//! assert_eq!(pass.block_count(), 1);
//! ```
//!
//! # Architecture
//!
//! - [`core`]: zone allocation, bit sets, error codes.
//! - [`ir`]: the node stream, virtual registers, and the function builder.
//! - [`ra`]: the pass — CFG construction, post-order view, dominators,
//!   loops, liveness, and the tied-register data.
//! - [`x64`]: the x86/x86-64 operand tables and machine hook.
//! - [`a64`]: the AArch64 hook, stubbed.
//!
//! The pass borrows a [`bumpalo::Bump`] for everything it produces; dropping
//! the pass and resetting the arena reclaims a function's analysis data in
//! one step. Different functions may be compiled concurrently as long as each
//! has its own builder, pass, and arena; there is no global mutable state.

pub mod a64;
pub mod core;
pub mod ir;
pub mod ra;
pub mod x64;

pub use crate::core::{Error, PassResult, PassZone};
pub use ir::{FuncBuilder, NodeId, NodeList, Operand, RegKind, Signature, VirtId, VirtRegMap};
pub use ra::{BlockId, JumpKind, Machine, RaData, RaPass, TiedReg};
pub use x64::{Arch, X64Inst, X64Machine};
