//! Toolchain for register-machine programs on handheld terminals: a compiler
//! from structured constructs to a flat instruction list, the line-oriented
//! program file format, and an interpreter that simulates the terminal.

pub mod codec;
pub mod compiler;
pub mod diagnostic;
pub mod fault;
pub mod isa;
pub mod logging;
pub mod text;
pub mod vm;
