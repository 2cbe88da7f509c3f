//! LS-8 emulator: an 8-bit teaching computer.
//!
//! 256 bytes of memory, eight general registers, a downward-growing
//! stack, and a two-source interrupt subsystem (timer and keyboard).
//! The cycle engine fetches, decodes, and dispatches one instruction per
//! `step()`; opcode bytes carry their own operand count and PC-advance
//! behavior in bit fields, so the decoder is a pure function of the
//! fetched byte.

pub mod alu;
mod cpu;
mod flags;
mod interrupt;
pub mod loader;
mod memory;
mod opcode;
mod registers;

pub use cpu::{Exit, Fault, FaultKind, Ls8};
pub use flags::Flags;
pub use interrupt::{KEYBOARD, TIMER};
pub use memory::{KEYBOARD_BUFFER, MEMORY_SIZE, VECTOR_BASE};
pub use opcode::Opcode;
pub use registers::{IM, INITIAL_SP, IS, RegisterFile, SP};
