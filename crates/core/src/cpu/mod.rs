//! 65816 instruction decoding.
//!
//! [`decode`] is a pure function of `(bytes, offset, context)`. The
//! [`ProcessorContext`] it returns is the state the next sequential
//! instruction must be decoded with.

mod context;
mod decoder;
mod format;
mod opcodes;

pub use context::{ProcessorContext, FLAG_C, FLAG_M, FLAG_X};
pub use decoder::{decode, decode_at, decode_linear, Flow, Instruction, RawReason};
pub use opcodes::{opcode_info, AddressingMode, Mnemonic, OpcodeInfo, OPCODES};
