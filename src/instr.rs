//! Instruction word codec
//!
//! This file is where a u32 instruction word is converted into the
//! Instr struct holding the opcode and its operands in a form ready
//! for the decompiler, and back again. The field positions and sizes
//! come from lopcodes.h: opcode at bits 0..6, A at 6..14, then either
//! C at 14..23 and B at 23..32 (ABC), or an 18-bit Bx at 14..32 (ABx),
//! or the same field biased by 131071 to give a signed sBx (AsBx).

use std::fmt;

use crate::opcodes::{InstrMode, Opcode, SBX_BIAS};
use crate::undump::ImageError;
use crate::utils::{get_bits, is_rk_constant, rk_to_constant_index, set_bits};

/// Operand payload, tagged by the opcode's layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    Abc { b: u32, c: u32 },
    Abx { bx: u32 },
    AsBx { sbx: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instr {
    pub op: Opcode,
    pub a: u32,
    pub operands: Operands,
}

impl Instr {
    pub fn abc(op: Opcode, a: u32, b: u32, c: u32) -> Self {
        Self {
            op,
            a,
            operands: Operands::Abc { b, c },
        }
    }

    pub fn abx(op: Opcode, a: u32, bx: u32) -> Self {
        Self {
            op,
            a,
            operands: Operands::Abx { bx },
        }
    }

    pub fn asbx(op: Opcode, a: u32, sbx: i32) -> Self {
        Self {
            op,
            a,
            operands: Operands::AsBx { sbx },
        }
    }

    /// B operand: the register/RK field for ABC, Bx for ABx, 0 for AsBx
    pub fn b(&self) -> u32 {
        match self.operands {
            Operands::Abc { b, .. } => b,
            Operands::Abx { bx } => bx,
            Operands::AsBx { .. } => 0,
        }
    }

    /// C operand, 0 for layouts without one
    pub fn c(&self) -> u32 {
        match self.operands {
            Operands::Abc { c, .. } => c,
            _ => 0,
        }
    }

    /// Signed branch displacement, 0 for layouts without one
    pub fn sbx(&self) -> i32 {
        match self.operands {
            Operands::AsBx { sbx } => sbx,
            _ => 0,
        }
    }

    /// Decode a 32-bit instruction word
    pub fn decode(word: u32) -> Result<Self, ImageError> {
        let number = get_bits(word, 0, 6);
        let op = Opcode::from_u32(number).ok_or_else(|| {
            ImageError::MalformedImage(format!("unknown opcode number {number}"))
        })?;
        let a = get_bits(word, 6, 8);
        let operands = match op.mode() {
            InstrMode::Abc => Operands::Abc {
                b: get_bits(word, 23, 9),
                c: get_bits(word, 14, 9),
            },
            InstrMode::Abx => Operands::Abx {
                bx: get_bits(word, 14, 18),
            },
            InstrMode::AsBx => Operands::AsBx {
                sbx: get_bits(word, 14, 18) as i32 - SBX_BIAS,
            },
        };
        Ok(Self { op, a, operands })
    }

    /// Encode back to a 32-bit instruction word; exact inverse of decode
    pub fn encode(&self) -> u32 {
        let mut word = set_bits(0, self.op.number(), 0, 6);
        word = set_bits(word, self.a, 6, 8);
        match self.operands {
            Operands::Abc { b, c } => {
                word = set_bits(word, b, 23, 9);
                word = set_bits(word, c, 14, 9);
            }
            Operands::Abx { bx } => {
                word = set_bits(word, bx, 14, 18);
            }
            Operands::AsBx { sbx } => {
                word = set_bits(word, (sbx + SBX_BIAS) as u32, 14, 18);
            }
        }
        word
    }
}

/// Operand in the disassembly listing: R[n], K[n], or the raw sBx
fn rk_text(rk: u32) -> String {
    if is_rk_constant(rk) {
        format!("K[{}]", rk_to_constant_index(rk))
    } else {
        format!("R[{rk}]")
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let regs = match self.operands {
            Operands::Abc { b, c } => {
                let (b, c) = if self.op.uses_rk_bc() {
                    (rk_text(b), rk_text(c))
                } else if self.op.uses_rk_c() {
                    (format!("R[{b}]"), rk_text(c))
                } else {
                    (format!("R[{b}]"), format!("R[{c}]"))
                };
                format!("R[{}] {} {}", self.a, b, c)
            }
            Operands::Abx { bx } => {
                if self.op.bx_is_constant() {
                    format!("R[{}] K[{bx}]", self.a)
                } else {
                    format!("R[{}] R[{bx}]", self.a)
                }
            }
            Operands::AsBx { sbx } => format!("R[{}] {sbx}", self.a),
        };
        write!(f, "{:>10} : {}", self.op.name(), regs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every legal operand tuple survives encode-then-decode, for a
    /// sample of each layout's field extremes
    #[test]
    fn check_instruction_roundtrip() {
        let abc_ops = [Opcode::MOVE, Opcode::ADD, Opcode::CALL, Opcode::SETLIST];
        for op in abc_ops {
            for (a, b, c) in [(0, 0, 0), (255, 511, 511), (7, 256, 300), (1, 2, 3)] {
                let instr = Instr::abc(op, a, b, c);
                assert_eq!(Instr::decode(instr.encode()).unwrap(), instr);
            }
        }
        for op in [Opcode::LOADK, Opcode::CLOSURE] {
            for (a, bx) in [(0, 0), (255, 0x3_ffff), (9, 12345)] {
                let instr = Instr::abx(op, a, bx);
                assert_eq!(Instr::decode(instr.encode()).unwrap(), instr);
            }
        }
        for op in [Opcode::JMP, Opcode::FORPREP] {
            for (a, sbx) in [(0, 0), (0, -131071), (0, 131072), (3, -1), (3, 5)] {
                let instr = Instr::asbx(op, a, sbx);
                assert_eq!(Instr::decode(instr.encode()).unwrap(), instr);
            }
        }
    }

    /// MOVE R[1] <- R[2] assembles to the word the reference VM uses
    #[test]
    fn check_known_encoding() {
        let instr = Instr::abc(Opcode::MOVE, 1, 2, 0);
        assert_eq!(instr.encode(), (2 << 23) | (1 << 6));

        // JMP +1: sBx stored biased
        let jmp = Instr::asbx(Opcode::JMP, 0, 1);
        assert_eq!(jmp.encode(), ((131072u32) << 14) | 22);
    }

    #[test]
    fn check_unknown_opcode_rejected() {
        // opcode number 38 does not exist
        assert!(matches!(
            Instr::decode(38),
            Err(ImageError::MalformedImage(_))
        ));
    }

    #[test]
    fn check_disassembly_text() {
        let add = Instr::abc(Opcode::ADD, 0, 256, 1);
        assert_eq!(format!("{add}"), "       ADD : R[0] K[0] R[1]");
        let loadk = Instr::abx(Opcode::LOADK, 2, 7);
        assert_eq!(format!("{loadk}"), "     LOADK : R[2] K[7]");
    }
}
