use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// errors that stop the emulator from starting up
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("audio device unavailable: {0}")]
    Audio(String),
    #[error("program is {len} bytes but only {max} bytes of RAM are free")]
    ProgramTooLarge { len: usize, max: usize },
}

/// faults raised while executing a CHIP-8 program; these pause the machine
/// rather than ending the process
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("unknown opcode 0x{opcode:04x} at 0x{pc:04x}")]
    UnknownOpcode { opcode: u16, pc: u16 },
    #[error("stack overflow calling 0x{target:04x} from 0x{pc:04x}")]
    StackOverflow { target: u16, pc: u16 },
    #[error("return with empty stack at 0x{pc:04x}")]
    StackUnderflow { pc: u16 },
}
