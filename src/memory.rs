use crate::error::{Error, Result};
use std::io;

/// byte-addressed RAM. addresses are CHIP-8 sized (u16), lengths are usize
pub trait MemoryMap {
    /// copy everything `reader` has into RAM at `addr`, returning the length
    fn write_from(&mut self, reader: &mut impl io::Read, addr: u16) -> Result<usize> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.write(&data, addr)?;
        Ok(data.len())
    }

    /// fails rather than truncating when `data` runs past the end of RAM
    fn write(&mut self, data: &[u8], addr: u16) -> Result<()> {
        let free = self.size().saturating_sub(addr as usize);
        if data.len() > free {
            return Err(Error::ProgramTooLarge {
                len: data.len(),
                max: free,
            });
        }
        self.slice_mut(addr, data.len()).copy_from_slice(data);
        Ok(())
    }

    /// get a two-byte big-endian word; addresses wrap at the top of RAM
    fn read_short(&self, addr: u16) -> u16 {
        let hi = self.read_byte(addr);
        let lo = self.read_byte(addr.wrapping_add(1));
        u16::from_be_bytes([hi, lo])
    }

    fn read_byte(&self, addr: u16) -> u8 {
        self.slice(addr % self.size() as u16, 1)[0]
    }

    fn write_byte(&mut self, addr: u16, value: u8) {
        let a = addr % self.size() as u16;
        self.slice_mut(a, 1)[0] = value;
    }

    fn size(&self) -> usize;

    fn slice_mut(&mut self, addr: u16, len: usize) -> &mut [u8];

    fn slice(&self, addr: u16, len: usize) -> &[u8];
}

/// CHIP-8 4K memory map:
///   0x0000-0x01ff  interpreter (font lives at 0x050)
///   0x0200-0x0fff  program
///
/// stack and display are kept outside RAM, in the machine state
#[derive(Clone)]
pub struct Chip8MemoryMap {
    bytes: Box<[u8]>,
    pub program_addr: u16,
    pub font_addr: u16,
}

impl MemoryMap for Chip8MemoryMap {
    fn size(&self) -> usize {
        self.bytes.len()
    }
    fn slice_mut(&mut self, addr: u16, len: usize) -> &mut [u8] {
        let start = usize::from(addr);
        &mut self.bytes[start..start + len]
    }
    fn slice(&self, addr: u16, len: usize) -> &[u8] {
        let start = usize::from(addr);
        &self.bytes[start..start + len]
    }
}

pub const CHIP8_RAM_SIZE_BYTES: usize = 4096;

const PROGRAM_ADDR: u16 = 0x0200;

/// bytes per font glyph
pub const CHIP8_FONT_GLYPH_BYTES: u16 = 5;

impl Chip8MemoryMap {
    /// RAM with the font baked in
    pub fn new() -> Self {
        let mut bytes = vec![0u8; CHIP8_RAM_SIZE_BYTES].into_boxed_slice();
        let font_at = FONT_ADDR as usize;
        bytes[font_at..font_at + FONT.len()].copy_from_slice(&FONT);
        Chip8MemoryMap {
            bytes,
            program_addr: PROGRAM_ADDR,
            font_addr: FONT_ADDR,
        }
    }

    /// load a CHIP-8 program at 0x200, returning its length
    pub fn load_program(&mut self, reader: &mut impl io::Read) -> Result<usize> {
        self.write_from(reader, self.program_addr)
    }

    /// address of the glyph for hex digit `digit`
    pub fn glyph_addr(&self, digit: u8) -> u16 {
        self.font_addr + CHIP8_FONT_GLYPH_BYTES * (digit & 0x0f) as u16
    }
}

impl Default for Chip8MemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

const FONT_ADDR: u16 = 0x050;
const FONT: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];
