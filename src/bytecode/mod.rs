//! The instruction set: opcode definitions, operand encoding, disassembly.
//!
//! This module is the contract between the compiler and the VM. Each
//! instruction is one opcode byte followed by zero, one or two operands
//! whose widths are fixed per opcode (big-endian for two-byte operands).

pub mod instructions;
pub mod opcode;

pub use instructions::{make, read_operands, read_u16, read_u8, Instructions};
pub use opcode::{Definition, Opcode};
