use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::convert::{TryFrom, TryInto};
use std::io::Cursor;

use crate::linker::loader::ProgramSource;
use crate::{LinkError, MalformedProgram};

///First byte of every compiled program, written by the pattern compiler.
pub const MAGIC: u8 = 0o234;

///Opcodes of the compiled program, one byte each. The OPEN/CLOSE bytes are
///ranges: OPEN+1 is group number 1 and so on, up to group 9.
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Opcode {
    End = 0,
    Bol = 1,
    Eol = 2,
    Any = 3,
    AnyOf = 4,
    AnyBut = 5,
    Branch = 6,
    Back = 7,
    Exactly = 8,
    Nothing = 9,
    Star = 10,
    Plus = 11,
    #[num_enum(alternatives = [21, 22, 23, 24, 25, 26, 27, 28, 29])]
    Open = 20,
    #[num_enum(alternatives = [31, 32, 33, 34, 35, 36, 37, 38, 39])]
    Close = 30,
}

impl Opcode {
    ///Branch and the repetition opcodes carry a second offset field.
    pub fn has_alt(self) -> bool {
        matches!(self, Opcode::Branch | Opcode::Star | Opcode::Plus)
    }

    ///Literal and character-class opcodes carry a NUL-terminated operand.
    pub fn has_operand(self) -> bool {
        matches!(self, Opcode::Exactly | Opcode::AnyOf | Opcode::AnyBut)
    }
}

///One decoded instruction. Offsets in the wire format are relative and
///signed; the targets here are already translated to absolute locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub location: u16,
    pub opcode: Opcode,
    ///The opcode byte as stored. For Open/Close the group index is encoded
    ///here, on top of the base opcode value.
    pub raw_opcode: u8,
    pub operand: Option<String>,
    pub next_target: u16,
    pub alt_target: Option<u16>,
}

///Decode the instruction beginning at `location`, returning it together
///with the location immediately following it in storage order.
pub fn decode(buffer: &[u8], location: u16) -> Result<(Instruction, u16), LinkError> {
    let mut cursor = Cursor::new(buffer);
    cursor.set_position(location as u64);

    let raw_opcode = cursor.read_u8()?;
    let opcode = Opcode::try_from(raw_opcode)
        .map_err(|_| MalformedProgram::UnknownOpcode(raw_opcode, location))?;

    let next_offset = cursor.read_i16::<BigEndian>()?;

    let alt_offset = if opcode.has_alt() {
        Option::Some(cursor.read_i16::<BigEndian>()?)
    } else {
        Option::None
    };

    let operand = if opcode.has_operand() {
        Option::Some(read_operand(&mut cursor, location)?)
    } else {
        Option::None
    };

    let next_target = resolve_target(location, next_offset)?;
    let alt_target = match alt_offset {
        Some(offset) => Option::Some(resolve_target(location, offset)?),
        None => Option::None,
    };

    let after: u16 = cursor
        .position()
        .try_into()
        .map_err(|_| MalformedProgram::ProgramTooLarge(buffer.len()))?;

    Result::Ok((
        Instruction {
            location,
            opcode,
            raw_opcode,
            operand,
            next_target,
            alt_target,
        },
        after,
    ))
}

fn read_operand(cursor: &mut Cursor<&[u8]>, location: u16) -> Result<String, LinkError> {
    let mut bytes = Vec::new();

    loop {
        let byte = cursor
            .read_u8()
            .map_err(|_| MalformedProgram::UnterminatedOperand(location))?;

        if byte == 0 {
            break;
        }

        bytes.push(byte);
    }

    String::from_utf8(bytes)
        .map_err(|_| LinkError::from(MalformedProgram::InvalidOperand(location)))
}

fn resolve_target(location: u16, offset: i16) -> Result<u16, MalformedProgram> {
    let target = location as i32 + offset as i32;

    target
        .try_into()
        .map_err(|_| MalformedProgram::OffsetOutOfRange(location))
}

///The default program-source capability: decodes instructions straight from
///the raw buffer.
pub struct BytecodeReader;

impl ProgramSource for BytecodeReader {
    fn decode(&self, buffer: &[u8], location: u16) -> Result<(Instruction, u16), LinkError> {
        decode(buffer, location)
    }
}

///A compiled program as handed over by the pattern compiler: the magic byte
///followed by the instruction stream. Instruction locations are offsets into
///this buffer, so the first instruction lives at location 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    bytes: Vec<u8>,
}

impl Program {
    pub fn new(bytes: Vec<u8>) -> Result<Self, LinkError> {
        if bytes.len() > u16::MAX as usize {
            return Result::Err(MalformedProgram::ProgramTooLarge(bytes.len()).into());
        }

        let magic = *bytes.get(0).ok_or(LinkError::UnexpectedEnd)?;

        if magic != MAGIC {
            return Result::Err(MalformedProgram::BadMagic(magic).into());
        }

        Result::Ok(Self { bytes })
    }

    pub fn entry(&self) -> u16 {
        1
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

struct BuilderEntry {
    location: u16,
    opcode: Opcode,
    raw_opcode: u8,
    operand: Option<String>,
    next: Option<u16>,
    alt: Option<u16>,
}

///Emits programs in the wire format, standing in for the external pattern
///compiler. Locations are assigned in storage order starting at 1; targets
///are patched by absolute location and serialized as relative offsets. An
///unpatched edge defaults to the following instruction (or the instruction
///itself, for the last one).
///
/// ```
/// use reglink::bytecode::{Opcode, ProgramBuilder, MAGIC};
///
/// let mut builder = ProgramBuilder::new();
/// let literal = builder.push(Opcode::Exactly, Some("abc"));
/// let end = builder.push(Opcode::End, None);
/// builder.set_next(literal, end);
///
/// let program = builder.build();
/// assert_eq!(program[0], MAGIC);
/// ```
pub struct ProgramBuilder {
    entries: Vec<BuilderEntry>,
    cursor: u16,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            cursor: 1,
        }
    }

    ///Append an instruction, returning the location it was placed at.
    pub fn push(&mut self, opcode: Opcode, operand: Option<&str>) -> u16 {
        self.push_raw(opcode.into(), opcode, operand)
    }

    ///Append an Open or Close instruction for the given group index, 0-9.
    pub fn push_group(&mut self, opcode: Opcode, index: u8) -> u16 {
        assert!(index <= 9, "Group indices run 0 through 9");

        self.push_raw(u8::from(opcode) + index, opcode, Option::None)
    }

    fn push_raw(&mut self, raw_opcode: u8, opcode: Opcode, operand: Option<&str>) -> u16 {
        let location = self.cursor;

        let mut size: u16 = 3;
        if opcode.has_alt() {
            size += 2;
        }
        if let Some(operand) = operand {
            let operand_size: u16 = (operand.len() + 1)
                .try_into()
                .expect("Operand does not fit in one instruction");
            size = size.checked_add(operand_size).expect("Program too large");
        }

        self.entries.push(BuilderEntry {
            location,
            opcode,
            raw_opcode,
            operand: operand.map(String::from),
            next: Option::None,
            alt: Option::None,
        });

        self.cursor = self.cursor.checked_add(size).expect("Program too large");
        location
    }

    pub fn set_next(&mut self, at: u16, target: u16) {
        self.entry_mut(at).next = Option::Some(target);
    }

    pub fn set_alt(&mut self, at: u16, target: u16) {
        self.entry_mut(at).alt = Option::Some(target);
    }

    fn entry_mut(&mut self, at: u16) -> &mut BuilderEntry {
        self.entries
            .iter_mut()
            .find(|entry| entry.location == at)
            .expect("No instruction at this location")
    }

    pub fn build(&self) -> Vec<u8> {
        let mut cursor: Cursor<Vec<u8>> = Cursor::new(Vec::new());

        cursor.write_u8(MAGIC).unwrap();

        for (index, entry) in self.entries.iter().enumerate() {
            let following = self
                .entries
                .get(index + 1)
                .map(|next_entry| next_entry.location)
                .unwrap_or(entry.location);

            cursor.write_u8(entry.raw_opcode).unwrap();

            let next = entry.next.unwrap_or(following);
            cursor
                .write_i16::<BigEndian>((next as i32 - entry.location as i32) as i16)
                .unwrap();

            if entry.opcode.has_alt() {
                let alt = entry.alt.unwrap_or(following);
                cursor
                    .write_i16::<BigEndian>((alt as i32 - entry.location as i32) as i16)
                    .unwrap();
            }

            if let Some(operand) = &entry.operand {
                for byte in operand.as_bytes() {
                    cursor.write_u8(*byte).unwrap();
                }
                cursor.write_u8(0).unwrap();
            }
        }

        cursor.into_inner()
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}
