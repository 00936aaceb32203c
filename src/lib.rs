#![forbid(unsafe_code)]

pub mod chunk;
pub mod decompile;
pub mod dump;
pub mod instr;
pub mod opcodes;
pub mod undump;

pub mod utils;
