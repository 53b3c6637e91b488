//! Error codes surfaced by the register-allocation middle-end.
//!
//! Two taxa: programmatic errors describe malformed input, `NoHeapMemory` is
//! the only resource error. The first non-`Ok` value aborts the current pass;
//! the pass still performs its cleanup before returning.

use thiserror::Error;

/// Failure codes of a function pass.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The pass zone could not satisfy an allocation.
    #[error("pass zone out of memory")]
    NoHeapMemory,

    /// The selected architecture has no working middle-end.
    #[error("architecture not supported")]
    InvalidArch,

    /// An instruction the operand read/write table cannot describe.
    #[error("instruction not supported by the compiler")]
    InvalidInstruction,

    /// An operand references a virtual register outside the function's table.
    #[error("invalid virtual register id")]
    InvalidVirtId,

    /// Malformed node stream (missing end sentinel, misplaced function entry,
    /// jump without a label operand, adjacent labels separated by code).
    #[error("invalid state in node stream")]
    InvalidState,

    /// Two operand sites pinned the same virtual register to different fixed
    /// output registers within one instruction.
    #[error("overlapping fixed register constraints")]
    OverlappedRegs,
}

/// Result alias used throughout the pass.
pub type PassResult<T> = Result<T, Error>;
