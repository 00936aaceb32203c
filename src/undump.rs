//! Lua 5.1 image decoder
//!
//! The dump format is cross-platform: a fixed 12-byte header names the
//! endianness and the widths of the C `int` and `size_t` types used by
//! the machine that wrote the image, and every integer field after the
//! header is read at those widths. This decoder keeps a cursor over
//! the raw byte buffer, pulls the widths out of the header, and then
//! reads the prototype tree recursively in wire order.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

use crate::chunk::{Chunk, Constant, Local};
use crate::instr::Instr;

/// The four bytes every Lua 5.1 dump starts with
pub const LUA_MAGIC: [u8; 4] = [0x1b, b'L', b'u', b'a'];

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("not a Lua 5.1 bytecode image (magic mismatch)")]
    NotLuaBytecode,
    #[error("malformed image: {0}")]
    MalformedImage(String),
}

/// The 8 configuration bytes following the magic. The decoder fills
/// this in from the image; the encoder writes whatever it is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub format: u8,
    /// Wire byte 0 means big-endian, anything else little-endian
    pub big_endian: bool,
    pub int_size: u8,
    pub size_t_size: u8,
    pub instr_size: u8,
    pub number_size: u8,
    pub integral: u8,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            version: 0x51,
            format: 0,
            big_endian: false,
            int_size: 4,
            size_t_size: 8,
            instr_size: 4,
            number_size: 8,
            integral: 0,
        }
    }
}

/// Decode a raw image into its header and root prototype
pub fn undump(data: &[u8]) -> Result<(Header, Chunk), ImageError> {
    let mut reader = Undump::new(data)?;
    let root = reader.chunk()?;
    Ok((reader.header, root))
}

/// Cursor over the image bytes. Every read advances the cursor and
/// fails with MalformedImage if it would run past the end.
struct Undump<'a> {
    data: &'a [u8],
    pos: usize,
    header: Header,
}

impl<'a> Undump<'a> {
    /// Check the magic and read the header; the cursor is left at the
    /// start of the root prototype
    fn new(data: &'a [u8]) -> Result<Self, ImageError> {
        if data.len() < 4 || data[0..4] != LUA_MAGIC {
            return Err(ImageError::NotLuaBytecode);
        }
        let mut reader = Self {
            data,
            pos: 4,
            header: Header::default(),
        };
        reader.header = reader.read_header()?;
        Ok(reader)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn block(&mut self, size: usize) -> Result<&'a [u8], ImageError> {
        if size > self.remaining() {
            return Err(ImageError::MalformedImage(format!(
                "read of {size} bytes past end of image at offset {}",
                self.pos
            )));
        }
        let block = &self.data[self.pos..self.pos + size];
        self.pos += size;
        Ok(block)
    }

    fn byte(&mut self) -> Result<u8, ImageError> {
        Ok(self.block(1)?[0])
    }

    /// An unsigned integer of the given byte width, in header order
    fn uint(&mut self, width: u8) -> Result<u64, ImageError> {
        let big_endian = self.header.big_endian;
        let bytes = self.block(width as usize)?;
        Ok(if big_endian {
            BigEndian::read_uint(bytes, width as usize)
        } else {
            LittleEndian::read_uint(bytes, width as usize)
        })
    }

    /// An `int`-width field (counts, line numbers, local pc ranges)
    fn int(&mut self) -> Result<u32, ImageError> {
        let value = self.uint(self.header.int_size)?;
        u32::try_from(value).map_err(|_| {
            ImageError::MalformedImage(format!("integer field {value} out of range"))
        })
    }

    /// A vector length, sanity-checked against the bytes left
    fn count(&mut self) -> Result<usize, ImageError> {
        let n = self.int()? as usize;
        if n > self.remaining() {
            return Err(ImageError::MalformedImage(format!(
                "vector of {n} entries cannot fit in the {} bytes left",
                self.remaining()
            )));
        }
        Ok(n)
    }

    fn size_t(&mut self) -> Result<usize, ImageError> {
        let value = self.uint(self.header.size_t_size)?;
        usize::try_from(value)
            .map_err(|_| ImageError::MalformedImage(format!("size_t field {value} out of range")))
    }

    /// A 32-bit instruction word, in header order
    fn word(&mut self) -> Result<u32, ImageError> {
        Ok(self.uint(4)? as u32)
    }

    /// An 8-byte IEEE-754 double, in header order
    fn number(&mut self) -> Result<f64, ImageError> {
        let big_endian = self.header.big_endian;
        let bytes = self.block(8)?;
        Ok(if big_endian {
            BigEndian::read_f64(bytes)
        } else {
            LittleEndian::read_f64(bytes)
        })
    }

    /// A size_t-length-prefixed string. The stored length includes a
    /// trailing NUL, which is stripped from the returned bytes; a
    /// length of 0 means the empty string with no payload at all.
    fn string(&mut self) -> Result<Vec<u8>, ImageError> {
        let size = self.size_t()?;
        if size == 0 {
            return Ok(Vec::new());
        }
        let bytes = self.block(size)?;
        match bytes.split_last() {
            Some((0, payload)) => Ok(payload.to_vec()),
            _ => Err(ImageError::MalformedImage(format!(
                "string at offset {} is not NUL-terminated",
                self.pos - size
            ))),
        }
    }

    fn read_header(&mut self) -> Result<Header, ImageError> {
        let header = Header {
            version: self.byte()?,
            format: self.byte()?,
            big_endian: self.byte()? == 0,
            int_size: self.byte()?,
            size_t_size: self.byte()?,
            instr_size: self.byte()?,
            number_size: self.byte()?,
            integral: self.byte()?,
        };
        if header.version != 0x51 {
            return Err(ImageError::MalformedImage(format!(
                "unsupported VM version 0x{:02x}",
                header.version
            )));
        }
        if header.instr_size != 4 {
            return Err(ImageError::MalformedImage(format!(
                "unsupported instruction size {}",
                header.instr_size
            )));
        }
        if header.number_size != 8 {
            return Err(ImageError::MalformedImage(format!(
                "unsupported number size {}",
                header.number_size
            )));
        }
        if !(1..=8).contains(&header.int_size) || !(1..=8).contains(&header.size_t_size) {
            return Err(ImageError::MalformedImage(format!(
                "unusable int/size_t widths {}/{}",
                header.int_size, header.size_t_size
            )));
        }
        Ok(header)
    }

    fn constant(&mut self) -> Result<Constant, ImageError> {
        let tag = self.byte()?;
        match tag {
            0 => Ok(Constant::Nil),
            1 => Ok(Constant::Bool(self.byte()? != 0)),
            3 => Ok(Constant::Number(self.number()?)),
            4 => Ok(Constant::Str(self.string()?)),
            _ => Err(ImageError::MalformedImage(format!(
                "unknown constant tag {tag}"
            ))),
        }
    }

    /// One prototype, recursing into its children
    fn chunk(&mut self) -> Result<Chunk, ImageError> {
        let mut chunk = Chunk {
            name: self.string()?,
            first_line: self.int()?,
            last_line: self.int()?,
            num_upvals: self.byte()?,
            num_params: self.byte()?,
            is_vararg: self.byte()?,
            max_stack: self.byte()?,
            ..Chunk::default()
        };

        let num = self.count()?;
        for _ in 0..num {
            let word = self.word()?;
            chunk.instructions.push(Instr::decode(word)?);
        }

        let num = self.count()?;
        for _ in 0..num {
            chunk.constants.push(self.constant()?);
        }

        let num = self.count()?;
        for _ in 0..num {
            chunk.protos.push(self.chunk()?);
        }

        let num = self.count()?;
        for _ in 0..num {
            chunk.source_lines.push(self.int()?);
        }

        let num = self.count()?;
        for _ in 0..num {
            chunk.locals.push(Local {
                name: self.string()?,
                start_pc: self.int()?,
                end_pc: self.int()?,
            });
        }

        let num = self.count()?;
        for _ in 0..num {
            chunk.upvalue_names.push(self.string()?);
        }

        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::Opcode;

    /// 12-byte header for a little-endian image with 4-byte int and
    /// size_t
    fn header_le44() -> Vec<u8> {
        vec![0x1b, b'L', b'u', b'a', 0x51, 0, 1, 4, 4, 4, 8, 0]
    }

    /// A main chunk with one RETURN and no debug info
    fn minimal_image() -> Vec<u8> {
        let mut image = header_le44();
        image.extend(0u32.to_le_bytes()); // empty name
        image.extend(0u32.to_le_bytes()); // first line
        image.extend(0u32.to_le_bytes()); // last line
        image.extend([0, 0, 2, 2]); // upvals, params, vararg, max stack
        image.extend(1u32.to_le_bytes());
        image.extend(Instr::abc(Opcode::RETURN, 0, 1, 0).encode().to_le_bytes());
        for _ in 0..5 {
            // constants, protos, lines, locals, upvalues
            image.extend(0u32.to_le_bytes());
        }
        image
    }

    #[test]
    fn check_minimal_image_decodes() {
        let (header, chunk) = undump(&minimal_image()).unwrap();
        assert_eq!(header.int_size, 4);
        assert_eq!(header.size_t_size, 4);
        assert!(!header.big_endian);
        assert_eq!(chunk.instructions.len(), 1);
        assert_eq!(chunk.instructions[0].op, Opcode::RETURN);
        assert_eq!(chunk.is_vararg, 2);
        assert!(chunk.takes_varargs());
        assert!(chunk.constants.is_empty());
        assert!(chunk.protos.is_empty());
    }

    #[test]
    fn check_constants_and_strings_decode() {
        let mut image = header_le44();
        image.extend(5u32.to_le_bytes()); // name "@a.l", length includes NUL
        image.extend(b"@a.l\0");
        image.extend(1u32.to_le_bytes()); // first line
        image.extend(1u32.to_le_bytes()); // last line
        image.extend([0, 0, 2, 2]);
        image.extend(1u32.to_le_bytes());
        image.extend(Instr::abc(Opcode::RETURN, 0, 1, 0).encode().to_le_bytes());
        image.extend(4u32.to_le_bytes()); // four constants
        image.push(0); // nil
        image.extend([1, 1]); // true
        image.push(3);
        image.extend(2.5f64.to_le_bytes());
        image.push(4);
        image.extend(6u32.to_le_bytes());
        image.extend(b"hello\0");
        for _ in 0..4 {
            image.extend(0u32.to_le_bytes());
        }

        let (_, chunk) = undump(&image).unwrap();
        assert_eq!(chunk.display_name(), "a.l");
        assert_eq!(
            chunk.constants,
            vec![
                Constant::Nil,
                Constant::Bool(true),
                Constant::Number(2.5),
                Constant::Str(b"hello".to_vec()),
            ]
        );
    }

    #[test]
    fn check_big_endian_and_wide_ints() {
        // big-endian, 8-byte int and size_t
        let mut image = vec![0x1b, b'L', b'u', b'a', 0x51, 0, 0, 8, 8, 4, 8, 0];
        image.extend(0u64.to_be_bytes()); // empty name
        image.extend(3u64.to_be_bytes()); // first line
        image.extend(7u64.to_be_bytes()); // last line
        image.extend([0, 0, 2, 2]);
        image.extend(1u64.to_be_bytes());
        image.extend(Instr::abc(Opcode::RETURN, 0, 1, 0).encode().to_be_bytes());
        for _ in 0..5 {
            image.extend(0u64.to_be_bytes());
        }

        let (header, chunk) = undump(&image).unwrap();
        assert!(header.big_endian);
        assert_eq!(header.int_size, 8);
        assert_eq!(chunk.first_line, 3);
        assert_eq!(chunk.last_line, 7);
        assert_eq!(chunk.instructions[0].op, Opcode::RETURN);
    }

    #[test]
    fn check_bad_magic_rejected() {
        assert!(matches!(
            undump(b"\x1bLuc\x51\x00\x01\x04\x04\x04\x08\x00"),
            Err(ImageError::NotLuaBytecode)
        ));
        assert!(matches!(undump(b"\x1bL"), Err(ImageError::NotLuaBytecode)));
    }

    #[test]
    fn check_truncated_image_rejected() {
        let image = minimal_image();
        for cut in [6, 13, 20, image.len() - 1] {
            assert!(matches!(
                undump(&image[..cut]),
                Err(ImageError::MalformedImage(_))
            ));
        }
    }

    #[test]
    fn check_unknown_constant_tag_rejected() {
        let mut image = header_le44();
        image.extend(0u32.to_le_bytes());
        image.extend(0u32.to_le_bytes());
        image.extend(0u32.to_le_bytes());
        image.extend([0, 0, 2, 2]);
        image.extend(0u32.to_le_bytes()); // no instructions
        image.extend(1u32.to_le_bytes()); // one constant
        image.push(2); // tag 2 does not exist in 5.1
        let err = undump(&image).unwrap_err();
        assert!(matches!(err, ImageError::MalformedImage(_)));
        assert!(err.to_string().contains("constant tag 2"));
    }

    #[test]
    fn check_unsupported_header_rejected() {
        let mut version = header_le44();
        version[4] = 0x52;
        assert!(matches!(
            undump(&version),
            Err(ImageError::MalformedImage(_))
        ));

        let mut instr_size = header_le44();
        instr_size[9] = 8;
        assert!(matches!(
            undump(&instr_size),
            Err(ImageError::MalformedImage(_))
        ));
    }
}
