//! Function prototype model
//!
//! A compiled Lua 5.1 function is a tree of prototypes ("chunks"):
//! each carries its instruction stream, constant pool, nested child
//! prototypes, and whatever debug metadata the compiler kept (line
//! table, named locals, upvalue names). The tree is built by the
//! decoder, walked by the decompiler and the encoder, and owns its
//! children by value so there are no back references.

use std::borrow::Cow;
use std::fmt;

use crate::instr::Instr;

/// A constant-pool entry. The wire tag codes are 0 (nil), 1 (bool),
/// 3 (number) and 4 (string).
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Nil,
    Bool(bool),
    Number(f64),
    /// Payload bytes with the trailing NUL already stripped
    Str(Vec<u8>),
}

impl Constant {
    /// Render the constant as it appears in Lua source
    pub fn to_code(&self) -> String {
        match self {
            Constant::Nil => "nil".to_string(),
            Constant::Bool(true) => "true".to_string(),
            Constant::Bool(false) => "false".to_string(),
            Constant::Number(n) => format!("{n}"),
            Constant::Str(bytes) => format!("\"{}\"", String::from_utf8_lossy(bytes)),
        }
    }

}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Constant::Nil => write!(f, "[NIL] nil"),
            Constant::Bool(b) => write!(f, "[BOOL] {b}"),
            Constant::Number(n) => write!(f, "[NUMBER] {n}"),
            Constant::Str(bytes) => write!(f, "[STRING] {}", String::from_utf8_lossy(bytes)),
        }
    }
}

/// A named local and the pc range it is live over
#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub name: Vec<u8>,
    pub start_pc: u32,
    pub end_pc: u32,
}

impl Local {
    pub fn name_str(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.name)
    }
}

/// A function prototype
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    /// Source name as stored in the image (luac prefixes file sources
    /// with `@`), trailing NUL stripped
    pub name: Vec<u8>,
    pub first_line: u32,
    pub last_line: u32,
    pub num_upvals: u8,
    pub num_params: u8,
    /// Raw vararg flag byte (luac writes flag combinations, e.g. 2 for
    /// the main chunk)
    pub is_vararg: u8,
    pub max_stack: u8,
    pub instructions: Vec<Instr>,
    pub constants: Vec<Constant>,
    pub protos: Vec<Chunk>,
    /// One source line per instruction, or empty if stripped
    pub source_lines: Vec<u32>,
    pub locals: Vec<Local>,
    pub upvalue_names: Vec<Vec<u8>>,
}

impl Chunk {
    pub fn takes_varargs(&self) -> bool {
        self.is_vararg != 0
    }

    /// Source name for display, without the luac `@`/`=` prefix
    pub fn display_name(&self) -> Cow<str> {
        let name = match self.name.first() {
            Some(b'@') | Some(b'=') => &self.name[1..],
            _ => &self.name[..],
        };
        if name.is_empty() {
            Cow::Borrowed("Unnamed proto")
        } else {
            String::from_utf8_lossy(name)
        }
    }

    /// The named local live at the given pc, if debug info has one
    pub fn find_local(&self, pc: u32) -> Option<&Local> {
        self.locals
            .iter()
            .find(|l| l.start_pc <= pc && l.end_pc >= pc)
    }
}

/// The disassembly listing: constants, instructions, then each child
/// prototype, recursively. Printed by the CLI ahead of the decompiled
/// source.
impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = self.display_name();
        writeln!(f, "==== [[{name}'s constants]] ====\n")?;
        for (i, constant) in self.constants.iter().enumerate() {
            writeln!(f, "{i}: {constant}")?;
        }
        writeln!(f, "\n==== [[{name}'s disassembly]] ====\n")?;
        for (pc, instr) in self.instructions.iter().enumerate() {
            writeln!(f, "[{pc:3}] {instr}")?;
        }
        if !self.protos.is_empty() {
            writeln!(f, "\n==== [[{name}'s protos]] ====\n")?;
            for proto in &self.protos {
                write!(f, "{proto}")?;
            }
        }
        Ok(())
    }
}
