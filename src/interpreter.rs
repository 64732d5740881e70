/// # interpreter
///
/// The CHIP-8 machine state and a single fetch/decode/execute cycle. Nothing
/// here knows about threads; `machine` wraps this in a lock and drives it.
///
/// Layout follows the contemporary interpreters rather than the COSMAC VIP:
///  * 4K RAM, font at 0x050, program at 0x200
///  * V0-VF 8bit registers, VF doubling as carry/borrow/collision flag
///  * I 12bit index register
///  * 16 entry return stack outside RAM
///  * delay and sound timers, both counting down at 60Hz
///  * packed 1bpp display, MSB of each byte is the left-most pixel
use crate::config::MachineConfig;
use crate::error::MachineError;
use crate::memory::{Chip8MemoryMap, MemoryMap};
use std::io;

pub const REGISTER_COUNT: usize = 16;
pub const STACK_DEPTH: usize = 16;
pub const KEY_COUNT: usize = 16;

/// both timers count down at this rate
const TIMER_HZ: f64 = 60.0;

pub struct Chip8Interpreter {
    config: MachineConfig,
    pub(crate) memory: Chip8MemoryMap,
    pub(crate) registers: [u8; REGISTER_COUNT],
    pub(crate) index: u16,
    pub(crate) delay_timer: u8,
    pub(crate) sound_timer: u8,
    pub(crate) stack: [u16; STACK_DEPTH],
    pub(crate) stack_pointer: u8,
    pub(crate) program_counter: u16,
    pub(crate) cycle: u64,
    pub(crate) paused: bool,
    pub(crate) keys: [bool; KEY_COUNT],
    pub(crate) display: Vec<u8>,
    /// timer ticks owed, in units of 1/clock_freq
    timer_accumulator: f64,
    /// level last reported on the sound line
    sound_line: bool,
}

impl Chip8Interpreter {
    pub fn new(config: MachineConfig) -> Self {
        let memory = Chip8MemoryMap::new();
        let program_counter = memory.program_addr;
        Chip8Interpreter {
            config,
            memory,
            registers: [0; REGISTER_COUNT],
            index: 0,
            delay_timer: 0,
            sound_timer: 0,
            stack: [0; STACK_DEPTH],
            stack_pointer: 0,
            program_counter,
            cycle: 0,
            paused: false,
            keys: [false; KEY_COUNT],
            display: vec![0; config.display_size_bytes()],
            timer_accumulator: 0.0,
            sound_line: false,
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// load a chip8 program, returning its length in bytes
    pub fn load_program(&mut self, reader: &mut impl io::Read) -> crate::Result<usize> {
        self.memory.load_program(reader)
    }

    pub fn set_key_state(&mut self, key: u8, down: bool) {
        if let Some(k) = self.keys.get_mut(key as usize) {
            *k = down;
        }
    }

    pub fn read_short(&self, addr: u16) -> u16 {
        self.memory.read_short(addr)
    }

    /// execute exactly one instruction. returns the new level of the sound
    /// line when it changed during this cycle.
    ///
    /// on error the program counter is left pointing at the faulting
    /// instruction and the cycle counter is not advanced.
    pub fn cycle(&mut self) -> Result<Option<bool>, MachineError> {
        let pc = self.program_counter;
        let opcode = self.memory.read_short(pc);
        self.program_counter = pc.wrapping_add(2) & 0x0fff;
        if let Err(e) = self.execute(opcode, pc) {
            self.program_counter = pc;
            return Err(e);
        }
        self.cycle += 1;
        self.tick_timers();

        let level = self.sound_timer > 0;
        if level != self.sound_line {
            self.sound_line = level;
            Ok(Some(level))
        } else {
            Ok(None)
        }
    }

    fn tick_timers(&mut self) {
        self.timer_accumulator += TIMER_HZ;
        while self.timer_accumulator >= self.config.clock_freq {
            self.timer_accumulator -= self.config.clock_freq;
            self.delay_timer = self.delay_timer.saturating_sub(1);
            self.sound_timer = self.sound_timer.saturating_sub(1);
        }
    }

    fn skip_if(&mut self, condition: bool) {
        if condition {
            self.program_counter = self.program_counter.wrapping_add(2) & 0x0fff;
        }
    }

    fn execute(&mut self, opcode: u16, pc: u16) -> Result<(), MachineError> {
        let x = ((opcode >> 8) & 0xf) as usize;
        let y = ((opcode >> 4) & 0xf) as usize;
        let n = (opcode & 0xf) as u8;
        let nn = (opcode & 0xff) as u8;
        let nnn = opcode & 0x0fff;
        let unknown = MachineError::UnknownOpcode { opcode, pc };

        match opcode >> 12 {
            0x0 => match opcode {
                0x00e0 => self.display.iter_mut().for_each(|b| *b = 0),
                0x00ee => {
                    if self.stack_pointer == 0 {
                        return Err(MachineError::StackUnderflow { pc });
                    }
                    self.stack_pointer -= 1;
                    self.program_counter = self.stack[self.stack_pointer as usize];
                }
                // 0NNN: machine code routine on the host CPU; nothing to call
                _ => {}
            },
            0x1 => self.program_counter = nnn,
            0x2 => {
                let sp = self.stack_pointer as usize;
                if sp >= STACK_DEPTH {
                    return Err(MachineError::StackOverflow { target: nnn, pc });
                }
                self.stack[sp] = self.program_counter;
                self.stack_pointer += 1;
                self.program_counter = nnn;
            }
            0x3 => self.skip_if(self.registers[x] == nn),
            0x4 => self.skip_if(self.registers[x] != nn),
            0x5 if n == 0 => self.skip_if(self.registers[x] == self.registers[y]),
            0x6 => self.registers[x] = nn,
            0x7 => self.registers[x] = self.registers[x].wrapping_add(nn),
            0x8 => self.alu(x, y, n).ok_or(unknown)?,
            0x9 if n == 0 => self.skip_if(self.registers[x] != self.registers[y]),
            0xa => self.index = nnn,
            0xb => self.program_counter = nnn.wrapping_add(self.registers[0] as u16) & 0x0fff,
            0xc => self.registers[x] = rand::random::<u8>() & nn,
            0xd => self.draw_sprite(x, y, n),
            0xe => {
                let down = self.keys[(self.registers[x] & 0xf) as usize];
                match nn {
                    0x9e => self.skip_if(down),
                    0xa1 => self.skip_if(!down),
                    _ => return Err(unknown),
                }
            }
            0xf => self.misc(x, nn).ok_or(unknown)?,
            _ => return Err(unknown),
        }
        Ok(())
    }

    /// 8XYN; None if N is not an ALU operation
    fn alu(&mut self, x: usize, y: usize, n: u8) -> Option<()> {
        let (vx, vy) = (self.registers[x], self.registers[y]);
        // flag is written after the result so VF as a destination loses
        let (result, flag) = match n {
            0x0 => (vy, None),
            0x1 => (vx | vy, None),
            0x2 => (vx & vy, None),
            0x3 => (vx ^ vy, None),
            0x4 => {
                let (sum, carry) = vx.overflowing_add(vy);
                (sum, Some(carry as u8))
            }
            0x5 => {
                let (diff, borrow) = vx.overflowing_sub(vy);
                (diff, Some(!borrow as u8))
            }
            0x6 => (vx >> 1, Some(vx & 0x1)),
            0x7 => {
                let (diff, borrow) = vy.overflowing_sub(vx);
                (diff, Some(!borrow as u8))
            }
            0xe => (vx << 1, Some(vx >> 7)),
            _ => return None,
        };
        self.registers[x] = result;
        if let Some(f) = flag {
            self.registers[0xf] = f;
        }
        Some(())
    }

    /// FXNN; None for an unknown NN
    fn misc(&mut self, x: usize, nn: u8) -> Option<()> {
        match nn {
            0x07 => self.registers[x] = self.delay_timer,
            0x0a => match self.keys.iter().position(|k| *k) {
                Some(key) => self.registers[x] = key as u8,
                // block by running this instruction again
                None => self.program_counter = self.program_counter.wrapping_sub(2) & 0x0fff,
            },
            0x15 => self.delay_timer = self.registers[x],
            0x18 => self.sound_timer = self.registers[x],
            0x1e => self.index = self.index.wrapping_add(self.registers[x] as u16) & 0x0fff,
            0x29 => self.index = self.memory.glyph_addr(self.registers[x]),
            0x33 => {
                let v = self.registers[x];
                self.memory.write_byte(self.index, v / 100);
                self.memory.write_byte(self.index.wrapping_add(1), (v / 10) % 10);
                self.memory.write_byte(self.index.wrapping_add(2), v % 10);
            }
            0x55 => {
                for r in 0..=x {
                    let addr = self.index.wrapping_add(r as u16);
                    self.memory.write_byte(addr, self.registers[r]);
                }
            }
            0x65 => {
                for r in 0..=x {
                    let addr = self.index.wrapping_add(r as u16);
                    self.registers[r] = self.memory.read_byte(addr);
                }
            }
            _ => return None,
        }
        Some(())
    }

    /// DXYN: XOR an 8xN sprite from I into the display, VF = collision
    fn draw_sprite(&mut self, x: usize, y: usize, rows: u8) {
        let width = self.config.resolution_x;
        let height = self.config.resolution_y;
        let wrap = self.config.draw_wrap;
        // the origin always wraps; only the sprite body is subject to clipping
        let origin_x = self.registers[x] as usize % width;
        let origin_y = self.registers[y] as usize % height;
        self.registers[0xf] = 0;

        for row in 0..rows as usize {
            let sprite = self.memory.read_byte(self.index.wrapping_add(row as u16));
            let mut py = origin_y + row;
            if py >= height {
                if !wrap {
                    break;
                }
                py %= height;
            }
            for bit in 0..8 {
                if sprite & (0x80 >> bit) == 0 {
                    continue;
                }
                let mut px = origin_x + bit;
                if px >= width {
                    if !wrap {
                        break;
                    }
                    px %= width;
                }
                let i = py * width + px;
                let mask = 0x80u8 >> (i % 8);
                let byte = &mut self.display[i / 8];
                if *byte & mask != 0 {
                    self.registers[0xf] = 1;
                }
                *byte ^= mask;
            }
        }
    }
}
