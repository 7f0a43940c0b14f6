pub mod bytecode;
pub mod graph;
pub mod linker;

use std::io;

use crate::bytecode::{BytecodeReader, Program};
use crate::graph::Graph;
use crate::linker::loader::Linker;

///Ways in which a compiled program can be structurally invalid. Any of these
///means the buffer cannot be linked; retrying without changing the input
///cannot succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedProgram {
    UnknownOpcode(u8, u16),
    UnterminatedOperand(u16),
    InvalidOperand(u16),
    BadMagic(u8),
    ProgramTooLarge(usize),
    OffsetOutOfRange(u16),
    LocationCollision(u16),
    DanglingReference(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    MalformedProgram(MalformedProgram),
    UnexpectedEnd,
}

impl From<MalformedProgram> for LinkError {
    fn from(m: MalformedProgram) -> Self {
        Self::MalformedProgram(m)
    }
}

impl From<io::Error> for LinkError {
    fn from(_: io::Error) -> Self {
        Self::UnexpectedEnd
    }
}

///Validate the magic byte of a compiled program and link it into a node
///graph with the default bytecode reader.
pub fn link_program(bytes: &[u8]) -> Result<Graph, LinkError> {
    let program = Program::new(bytes.to_vec())?;
    let linker = Linker::new(Box::new(BytecodeReader));

    linker.link(program.bytes(), program.entry())
}
