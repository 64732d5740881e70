//! The execution side of the emulator and the boundary it shares with the
//! presentation side.
//!
//! ## Shared-state contract
//!
//! * All machine state lives in one [`Chip8Interpreter`] behind a mutex. The
//!   execution thread holds the lock for exactly one instruction at a time.
//! * The execution thread is the only writer of registers, timers, stack,
//!   display and cycle count. The input bridge is the only writer of the key
//!   array and the paused flag.
//! * The presentation thread never reads fields in place. It copies a
//!   [`MachineSnapshot`] out under the lock and renders from that, so every
//!   frame shows a state that actually existed between two instructions.
//! * Beep levels travel on a bounded channel, see [`BeepEvents`].
//! * Single-step requests travel on a one-slot channel and are consumed by
//!   the execution thread, so they can never interleave with free running.
//! * Shutdown is a one-shot [`ShutdownSignal`], checked once per cycle.
use crate::config::MachineConfig;
use crate::interpreter::{Chip8Interpreter, KEY_COUNT, REGISTER_COUNT, STACK_DEPTH};
use crate::timing::Ticker;
use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError, TrySendError};
use log::{debug, error, info};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// how many beep levels may be waiting for the presentation thread
pub const BEEP_QUEUE_CAPACITY: usize = 4;

/// how long a paused run loop waits for a step request before looking again
const PAUSED_POLL: Duration = Duration::from_millis(10);

/// consumer side of the audio-trigger queue
///
/// the producer never blocks: when the queue is full the oldest pending level
/// is evicted. beep is a level, so a lost intermediate value is corrected by
/// the next one.
pub struct BeepEvents {
    rx: Receiver<bool>,
}

impl BeepEvents {
    /// one pending level, without blocking
    pub fn try_recv(&self) -> Option<bool> {
        self.rx.try_recv().ok()
    }

    /// drain everything pending and keep only the newest level
    pub fn latest(&self) -> Option<bool> {
        self.rx.try_iter().last()
    }
}

#[derive(Clone)]
struct BeepSender {
    tx: Sender<bool>,
    evict: Receiver<bool>,
}

impl BeepSender {
    fn send(&self, level: bool) {
        let mut level = level;
        for _ in 0..=BEEP_QUEUE_CAPACITY {
            match self.tx.try_send(level) {
                Ok(()) => return,
                Err(TrySendError::Full(l)) => {
                    if let Ok(dropped) = self.evict.try_recv() {
                        debug!("beep queue full, dropped stale level {dropped}");
                    }
                    level = l;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// one-shot request for the execution thread to stop; sending consumes it
pub struct ShutdownSignal {
    tx: Sender<()>,
}

impl ShutdownSignal {
    pub fn send(self) {
        // capacity 1 and only ever sent once, so this cannot be full
        let _ = self.tx.try_send(());
    }
}

/// copy of everything the diagnostic display shows
#[derive(Debug, Clone, PartialEq)]
pub struct MachineSnapshot {
    pub registers: [u8; REGISTER_COUNT],
    pub index: u16,
    pub delay_timer: u8,
    pub sound_timer: u8,
    pub stack: [u16; STACK_DEPTH],
    pub stack_pointer: u8,
    pub program_counter: u16,
    pub cycle: u64,
    pub paused: bool,
    pub keys: [bool; KEY_COUNT],
    pub display: Vec<u8>,
    /// (address, word) around the program counter; None where the address
    /// would be below zero
    pub program: Vec<Option<(u16, u16)>>,
    pub config: MachineConfig,
}

/// handle on a CHIP-8 machine; clones share the same machine
#[derive(Clone)]
pub struct Machine {
    state: Arc<Mutex<Chip8Interpreter>>,
    config: MachineConfig,
    beeps: BeepSender,
    step_tx: Sender<()>,
    step_rx: Receiver<()>,
    shutdown: Receiver<()>,
}

impl Machine {
    /// build a machine plus the audio-trigger source and the shutdown sink
    pub fn new(config: MachineConfig) -> crate::Result<(Machine, BeepEvents, ShutdownSignal)> {
        config.validate()?;
        let (beep_tx, beep_rx) = bounded(BEEP_QUEUE_CAPACITY);
        let (step_tx, step_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let machine = Machine {
            state: Arc::new(Mutex::new(Chip8Interpreter::new(config))),
            config,
            beeps: BeepSender {
                tx: beep_tx,
                evict: beep_rx.clone(),
            },
            step_tx,
            step_rx,
            shutdown: shutdown_rx,
        };
        Ok((
            machine,
            BeepEvents { rx: beep_rx },
            ShutdownSignal { tx: shutdown_tx },
        ))
    }

    fn lock(&self) -> MutexGuard<'_, Chip8Interpreter> {
        // a panic mid-instruction leaves the state usable for display
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// load a chip8 program at 0x200
    pub fn load_program(&self, reader: &mut impl io::Read) -> crate::Result<usize> {
        self.lock().load_program(reader)
    }

    /// the autonomous fetch/decode/execute loop; returns once the shutdown
    /// signal arrives (or its sender is dropped)
    pub fn run(&self) {
        info!("execution started at {:.1} Hz", self.config.clock_freq);
        let mut ticker = Ticker::new(self.config.cycle_period());
        loop {
            // yield point: between two instructions
            match self.shutdown.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            if self.is_paused() {
                select! {
                    recv(self.shutdown) -> _ => break,
                    recv(self.step_rx) -> _ => {
                        self.execute_cycle(true);
                    }
                    default(PAUSED_POLL) => {}
                }
                ticker.reset();
                continue;
            }

            // a step requested just before unpausing is stale now
            while self.step_rx.try_recv().is_ok() {}
            self.execute_cycle(false);
            ticker.wait();
        }
        info!("execution stopped after {} cycles", self.cycle());
    }

    /// run one instruction if the paused flag matches `paused`
    fn execute_cycle(&self, paused: bool) -> bool {
        let beep = {
            let mut state = self.lock();
            if state.paused != paused {
                return false;
            }
            match state.cycle() {
                Ok(beep) => beep,
                Err(e) => {
                    error!("{e}; pausing");
                    state.paused = true;
                    None
                }
            }
        };
        if let Some(level) = beep {
            self.beeps.send(level);
        }
        true
    }

    /// execute exactly one cycle, only while paused. returns whether it ran.
    pub fn step(&self) -> bool {
        self.execute_cycle(true)
    }

    /// ask the run loop for one cycle. ignored unless paused, and at most one
    /// request is ever pending.
    pub fn request_step(&self) -> bool {
        if !self.is_paused() {
            return false;
        }
        self.step_tx.try_send(()).is_ok()
    }

    pub fn set_key_state(&self, key: u8, down: bool) {
        self.lock().set_key_state(key, down);
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn set_paused(&self, paused: bool) {
        self.lock().paused = paused;
    }

    /// flip the paused flag, returning the new value
    pub fn toggle_paused(&self) -> bool {
        let mut state = self.lock();
        state.paused = !state.paused;
        state.paused
    }

    pub fn registers(&self) -> [u8; REGISTER_COUNT] {
        self.lock().registers
    }

    pub fn index(&self) -> u16 {
        self.lock().index
    }

    pub fn delay_timer(&self) -> u8 {
        self.lock().delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.lock().sound_timer
    }

    pub fn stack(&self) -> [u16; STACK_DEPTH] {
        self.lock().stack
    }

    pub fn stack_pointer(&self) -> u8 {
        self.lock().stack_pointer
    }

    pub fn program_counter(&self) -> u16 {
        self.lock().program_counter
    }

    pub fn cycle(&self) -> u64 {
        self.lock().cycle
    }

    pub fn keys(&self) -> [bool; KEY_COUNT] {
        self.lock().keys
    }

    pub fn display(&self) -> Vec<u8> {
        self.lock().display.clone()
    }

    /// 16bit big-endian word at any address
    pub fn read_short(&self, addr: u16) -> u16 {
        self.lock().read_short(addr)
    }

    /// copy out the whole visible state at once, with `program_words` words
    /// of program centred on the program counter
    pub fn snapshot(&self, program_words: usize) -> MachineSnapshot {
        let state = self.lock();
        let pc = state.program_counter as i64;
        let half = (program_words / 2) as i64;
        let program = (0..program_words as i64)
            .map(|i| {
                let addr = pc + 2 * (i - half);
                (addr >= 0).then(|| (addr as u16, state.read_short(addr as u16)))
            })
            .collect();
        MachineSnapshot {
            registers: state.registers,
            index: state.index,
            delay_timer: state.delay_timer,
            sound_timer: state.sound_timer,
            stack: state.stack,
            stack_pointer: state.stack_pointer,
            program_counter: state.program_counter,
            cycle: state.cycle,
            paused: state.paused,
            keys: state.keys,
            display: state.display.clone(),
            program,
            config: *state.config(),
        }
    }
}
