//! Lua 5.1 image encoder
//!
//! Exact inverse of the decoder: given a header configuration and a
//! prototype tree, produce an image the decoder maps back to the same
//! tree. For any image the decoder accepts, re-encoding under the
//! decoded header yields the identical byte sequence.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::chunk::{Chunk, Constant};
use crate::undump::{Header, ImageError, LUA_MAGIC};

/// Serialise a prototype tree under the given header settings
pub fn dump(header: &Header, chunk: &Chunk) -> Result<Vec<u8>, ImageError> {
    let mut writer = Dump {
        out: Vec::new(),
        header: *header,
    };
    writer.write_header();
    writer.chunk(chunk)?;
    Ok(writer.out)
}

struct Dump {
    out: Vec<u8>,
    header: Header,
}

impl Dump {
    fn write_header(&mut self) {
        self.out.extend(LUA_MAGIC);
        self.out.extend([
            self.header.version,
            self.header.format,
            if self.header.big_endian { 0 } else { 1 },
            self.header.int_size,
            self.header.size_t_size,
            self.header.instr_size,
            self.header.number_size,
            self.header.integral,
        ]);
    }

    /// An unsigned integer at the given byte width, in header order.
    /// Fails if the value does not fit the width.
    fn uint(&mut self, value: u64, width: u8) -> Result<(), ImageError> {
        let width = width as usize;
        if width < 8 && value >> (8 * width) != 0 {
            return Err(ImageError::MalformedImage(format!(
                "value {value} does not fit in a {width}-byte integer field"
            )));
        }
        let mut bytes = [0u8; 8];
        if self.header.big_endian {
            BigEndian::write_uint(&mut bytes[..width], value, width);
        } else {
            LittleEndian::write_uint(&mut bytes[..width], value, width);
        }
        self.out.extend(&bytes[..width]);
        Ok(())
    }

    fn int(&mut self, value: u32) -> Result<(), ImageError> {
        self.uint(value.into(), self.header.int_size)
    }

    fn size_t(&mut self, value: usize) -> Result<(), ImageError> {
        self.uint(value as u64, self.header.size_t_size)
    }

    fn word(&mut self, value: u32) -> Result<(), ImageError> {
        self.uint(value.into(), 4)
    }

    fn number(&mut self, value: f64) {
        let mut bytes = [0u8; 8];
        if self.header.big_endian {
            BigEndian::write_f64(&mut bytes, value);
        } else {
            LittleEndian::write_f64(&mut bytes, value);
        }
        self.out.extend(bytes);
    }

    /// size_t length prefix (counting a trailing NUL), then the bytes,
    /// then the NUL. The empty string is written as length 0 alone.
    fn string(&mut self, bytes: &[u8]) -> Result<(), ImageError> {
        if bytes.is_empty() {
            return self.size_t(0);
        }
        self.size_t(bytes.len() + 1)?;
        self.out.extend(bytes);
        self.out.push(0);
        Ok(())
    }

    fn constant(&mut self, constant: &Constant) -> Result<(), ImageError> {
        match constant {
            Constant::Nil => self.out.push(0),
            Constant::Bool(b) => {
                self.out.push(1);
                self.out.push(u8::from(*b));
            }
            Constant::Number(n) => {
                self.out.push(3);
                self.number(*n);
            }
            Constant::Str(bytes) => {
                self.out.push(4);
                self.string(bytes)?;
            }
        }
        Ok(())
    }

    /// One prototype, in the same order the decoder reads
    fn chunk(&mut self, chunk: &Chunk) -> Result<(), ImageError> {
        self.string(&chunk.name)?;
        self.int(chunk.first_line)?;
        self.int(chunk.last_line)?;
        self.out.extend([
            chunk.num_upvals,
            chunk.num_params,
            chunk.is_vararg,
            chunk.max_stack,
        ]);

        self.int(chunk.instructions.len() as u32)?;
        for instr in &chunk.instructions {
            self.word(instr.encode())?;
        }

        self.int(chunk.constants.len() as u32)?;
        for constant in &chunk.constants {
            self.constant(constant)?;
        }

        self.int(chunk.protos.len() as u32)?;
        for proto in &chunk.protos {
            self.chunk(proto)?;
        }

        self.int(chunk.source_lines.len() as u32)?;
        for line in &chunk.source_lines {
            self.int(*line)?;
        }

        self.int(chunk.locals.len() as u32)?;
        for local in &chunk.locals {
            self.string(&local.name)?;
            self.int(local.start_pc)?;
            self.int(local.end_pc)?;
        }

        self.int(chunk.upvalue_names.len() as u32)?;
        for name in &chunk.upvalue_names {
            self.string(name)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Local;
    use crate::instr::Instr;
    use crate::opcodes::Opcode;
    use crate::undump::undump;

    /// A chunk exercising every field: constants of all kinds, a child
    /// proto, a line table, named locals and an upvalue name
    fn sample_chunk() -> Chunk {
        let inner = Chunk {
            name: Vec::new(),
            first_line: 2,
            last_line: 2,
            num_params: 2,
            max_stack: 3,
            instructions: vec![
                Instr::abc(Opcode::ADD, 2, 0, 1),
                Instr::abc(Opcode::RETURN, 2, 2, 0),
            ],
            locals: vec![
                Local {
                    name: b"a".to_vec(),
                    start_pc: 0,
                    end_pc: 1,
                },
                Local {
                    name: b"b".to_vec(),
                    start_pc: 0,
                    end_pc: 1,
                },
            ],
            ..Chunk::default()
        };
        Chunk {
            name: b"@sample.lua".to_vec(),
            first_line: 1,
            last_line: 4,
            is_vararg: 2,
            max_stack: 2,
            instructions: vec![
                Instr::abx(Opcode::CLOSURE, 0, 0),
                Instr::abx(Opcode::LOADK, 1, 0),
                Instr::abc(Opcode::RETURN, 0, 1, 0),
            ],
            constants: vec![
                Constant::Number(42.5),
                Constant::Str(b"hello".to_vec()),
                Constant::Bool(false),
                Constant::Nil,
            ],
            protos: vec![inner],
            source_lines: vec![2, 3, 4],
            locals: vec![Local {
                name: b"f".to_vec(),
                start_pc: 1,
                end_pc: 2,
            }],
            upvalue_names: vec![b"up".to_vec()],
            ..Chunk::default()
        }
    }

    /// Encode-then-decode is the identity for every supported header
    /// width/endianness combination
    #[test]
    fn check_header_roundtrip() {
        for big_endian in [false, true] {
            for int_size in [4u8, 8] {
                for size_t_size in [4u8, 8] {
                    let header = Header {
                        big_endian,
                        int_size,
                        size_t_size,
                        ..Header::default()
                    };
                    let image = dump(&header, &sample_chunk()).unwrap();
                    let (decoded_header, _) = undump(&image).unwrap();
                    assert_eq!(decoded_header, header);
                }
            }
        }
    }

    /// Decoding an image and re-encoding it under the decoded header
    /// reproduces the image byte for byte
    #[test]
    fn check_image_roundtrip() {
        for big_endian in [false, true] {
            for int_size in [4u8, 8] {
                let header = Header {
                    big_endian,
                    int_size,
                    ..Header::default()
                };
                let image = dump(&header, &sample_chunk()).unwrap();
                let (decoded_header, decoded) = undump(&image).unwrap();
                let reencoded = dump(&decoded_header, &decoded).unwrap();
                assert_eq!(image, reencoded);
            }
        }
    }

    /// The prototype tree itself survives the trip
    #[test]
    fn check_chunk_roundtrip() {
        let chunk = sample_chunk();
        let image = dump(&Header::default(), &chunk).unwrap();
        let (_, decoded) = undump(&image).unwrap();
        assert_eq!(decoded, chunk);
    }

    /// Number constants keep their exact bit pattern
    #[test]
    fn check_number_bits_preserved() {
        let chunk = Chunk {
            instructions: vec![Instr::abc(Opcode::RETURN, 0, 1, 0)],
            constants: vec![
                Constant::Number(f64::from_bits(0x7ff8_0000_0000_0001)), // NaN payload
                Constant::Number(-0.0),
                Constant::Number(f64::MIN_POSITIVE),
            ],
            ..Chunk::default()
        };
        let image = dump(&Header::default(), &chunk).unwrap();
        let (_, decoded) = undump(&image).unwrap();
        for (before, after) in chunk.constants.iter().zip(&decoded.constants) {
            let (Constant::Number(x), Constant::Number(y)) = (before, after) else {
                panic!("expected number constants");
            };
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }
}
