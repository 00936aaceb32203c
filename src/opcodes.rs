//! Lua 5.1 opcode tables
//!
//! The instruction set has 38 opcodes, each with one of three operand
//! layouts. The numbering, layouts and operand meanings follow
//! lopcodes.h from the Lua 5.1 source. B and C operands of some
//! opcodes are "RK" values: bit 8 selects between a register index and
//! a constant-pool index.

/// Operand layout of an instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrMode {
    /// A:8 at bit 6, C:9 at bit 14, B:9 at bit 23
    Abc,
    /// A:8 at bit 6, Bx:18 (unsigned) at bit 14
    Abx,
    /// A:8 at bit 6, sBx:18 (biased signed) at bit 14
    AsBx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[rustfmt::skip]
#[allow(clippy::upper_case_acronyms)]
pub enum Opcode {
    MOVE,     LOADK,     LOADBOOL, LOADNIL,
    GETUPVAL, GETGLOBAL, GETTABLE, SETGLOBAL,
    SETUPVAL, SETTABLE,  NEWTABLE, SELF,
    ADD,      SUB,       MUL,      DIV,
    MOD,      POW,       UNM,      NOT,
    LEN,      CONCAT,    JMP,      EQ,
    LT,       LE,        TEST,     TESTSET,
    CALL,     TAILCALL,  RETURN,   FORLOOP,
    FORPREP,  TFORLOOP,  SETLIST,  CLOSE,
    CLOSURE,  VARARG,
}

/// Opcode number -> opcode, in wire order
#[rustfmt::skip]
pub const OPCODE_TABLE: [Opcode; 38] = [
    Opcode::MOVE,     Opcode::LOADK,     Opcode::LOADBOOL, Opcode::LOADNIL,
    Opcode::GETUPVAL, Opcode::GETGLOBAL, Opcode::GETTABLE, Opcode::SETGLOBAL,
    Opcode::SETUPVAL, Opcode::SETTABLE,  Opcode::NEWTABLE, Opcode::SELF,
    Opcode::ADD,      Opcode::SUB,       Opcode::MUL,      Opcode::DIV,
    Opcode::MOD,      Opcode::POW,       Opcode::UNM,      Opcode::NOT,
    Opcode::LEN,      Opcode::CONCAT,    Opcode::JMP,      Opcode::EQ,
    Opcode::LT,       Opcode::LE,        Opcode::TEST,     Opcode::TESTSET,
    Opcode::CALL,     Opcode::TAILCALL,  Opcode::RETURN,   Opcode::FORLOOP,
    Opcode::FORPREP,  Opcode::TFORLOOP,  Opcode::SETLIST,  Opcode::CLOSE,
    Opcode::CLOSURE,  Opcode::VARARG,
];

/// Number of array entries SETLIST writes per flush batch
pub const LFIELDS_PER_FLUSH: u32 = 50;

/// Bias subtracted from the stored 18-bit field to obtain sBx
pub const SBX_BIAS: i32 = 131071;

impl Opcode {
    /// Look up an opcode by its 6-bit wire number
    pub fn from_u32(number: u32) -> Option<Self> {
        OPCODE_TABLE.get(number as usize).copied()
    }

    /// The 6-bit wire number of this opcode (declaration order matches
    /// the wire numbering)
    pub fn number(self) -> u32 {
        self as u32
    }

    pub fn mode(self) -> InstrMode {
        match self {
            Opcode::LOADK | Opcode::GETGLOBAL | Opcode::SETGLOBAL | Opcode::CLOSURE => {
                InstrMode::Abx
            }
            Opcode::JMP | Opcode::FORLOOP | Opcode::FORPREP => InstrMode::AsBx,
            _ => InstrMode::Abc,
        }
    }

    /// Both B and C are RK operands
    pub fn uses_rk_bc(self) -> bool {
        matches!(
            self,
            Opcode::SETTABLE
                | Opcode::ADD
                | Opcode::SUB
                | Opcode::MUL
                | Opcode::DIV
                | Opcode::MOD
                | Opcode::POW
                | Opcode::EQ
                | Opcode::LT
                | Opcode::LE
        )
    }

    /// Only C is an RK operand
    pub fn uses_rk_c(self) -> bool {
        matches!(self, Opcode::GETTABLE | Opcode::SELF)
    }

    /// Bx indexes the constant pool rather than a register
    pub fn bx_is_constant(self) -> bool {
        matches!(self, Opcode::LOADK | Opcode::GETGLOBAL | Opcode::SETGLOBAL)
    }

    /// Wire mnemonic, as printed in disassembly listings
    pub fn name(self) -> &'static str {
        match self {
            Opcode::MOVE => "MOVE",
            Opcode::LOADK => "LOADK",
            Opcode::LOADBOOL => "LOADBOOL",
            Opcode::LOADNIL => "LOADNIL",
            Opcode::GETUPVAL => "GETUPVAL",
            Opcode::GETGLOBAL => "GETGLOBAL",
            Opcode::GETTABLE => "GETTABLE",
            Opcode::SETGLOBAL => "SETGLOBAL",
            Opcode::SETUPVAL => "SETUPVAL",
            Opcode::SETTABLE => "SETTABLE",
            Opcode::NEWTABLE => "NEWTABLE",
            Opcode::SELF => "SELF",
            Opcode::ADD => "ADD",
            Opcode::SUB => "SUB",
            Opcode::MUL => "MUL",
            Opcode::DIV => "DIV",
            Opcode::MOD => "MOD",
            Opcode::POW => "POW",
            Opcode::UNM => "UNM",
            Opcode::NOT => "NOT",
            Opcode::LEN => "LEN",
            Opcode::CONCAT => "CONCAT",
            Opcode::JMP => "JMP",
            Opcode::EQ => "EQ",
            Opcode::LT => "LT",
            Opcode::LE => "LE",
            Opcode::TEST => "TEST",
            Opcode::TESTSET => "TESTSET",
            Opcode::CALL => "CALL",
            Opcode::TAILCALL => "TAILCALL",
            Opcode::RETURN => "RETURN",
            Opcode::FORLOOP => "FORLOOP",
            Opcode::FORPREP => "FORPREP",
            Opcode::TFORLOOP => "TFORLOOP",
            Opcode::SETLIST => "SETLIST",
            Opcode::CLOSE => "CLOSE",
            Opcode::CLOSURE => "CLOSURE",
            Opcode::VARARG => "VARARG",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The table assigns the numbering from lopcodes.h
    #[test]
    fn check_wire_numbering() {
        assert_eq!(Opcode::from_u32(0), Some(Opcode::MOVE));
        assert_eq!(Opcode::from_u32(1), Some(Opcode::LOADK));
        assert_eq!(Opcode::from_u32(22), Some(Opcode::JMP));
        assert_eq!(Opcode::from_u32(30), Some(Opcode::RETURN));
        assert_eq!(Opcode::from_u32(37), Some(Opcode::VARARG));
        assert_eq!(Opcode::from_u32(38), None);
    }

    #[test]
    fn check_number_inverts_from_u32() {
        for n in 0..38 {
            let op = Opcode::from_u32(n).unwrap();
            assert_eq!(op.number(), n);
        }
    }

    #[test]
    fn check_modes() {
        assert_eq!(Opcode::MOVE.mode(), InstrMode::Abc);
        assert_eq!(Opcode::LOADK.mode(), InstrMode::Abx);
        assert_eq!(Opcode::GETGLOBAL.mode(), InstrMode::Abx);
        assert_eq!(Opcode::SETGLOBAL.mode(), InstrMode::Abx);
        assert_eq!(Opcode::CLOSURE.mode(), InstrMode::Abx);
        assert_eq!(Opcode::JMP.mode(), InstrMode::AsBx);
        assert_eq!(Opcode::FORLOOP.mode(), InstrMode::AsBx);
        assert_eq!(Opcode::FORPREP.mode(), InstrMode::AsBx);
        assert_eq!(Opcode::SETLIST.mode(), InstrMode::Abc);
    }

    #[test]
    fn check_rk_operand_classes() {
        assert!(Opcode::ADD.uses_rk_bc());
        assert!(Opcode::EQ.uses_rk_bc());
        assert!(Opcode::LE.uses_rk_bc());
        assert!(!Opcode::MOVE.uses_rk_bc());
        assert!(Opcode::GETTABLE.uses_rk_c());
        assert!(!Opcode::GETTABLE.uses_rk_bc());
        assert!(Opcode::LOADK.bx_is_constant());
        assert!(!Opcode::CLOSURE.bx_is_constant());
    }
}
