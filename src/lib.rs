//! CHIP-8 interpreter with a debugger front end in the terminal.
//!
//! ## Design
//!
//! * two threads: one executes CHIP-8 instructions at its own clock
//!   frequency, the other presents the machine at the display refresh rate
//! * the threads only meet at the machine handle (state behind a lock, copied
//!   out for rendering) and at three channels:
//!    - beep levels, execution -> presentation, bounded, drop-oldest
//!    - single-step requests, presentation -> execution, one slot
//!    - shutdown, presentation -> execution, one shot
//! * display, input and audio sit behind traits so the loop can be driven by
//!   fakes in tests
//!
//! Model
//!
//! main
//!  |-- config, machine(config) -> (handle, beep events, shutdown signal)
//!  |-- load program
//!  |-- terminal input, tui display, beep player
//!  |-- execution thread: machine.run()
//!  |    `-- loop { shutdown? stop; paused? wait for step; cycle; sleep }
//!  `-- presentation loop, every 1/refresh_rate
//!       |-- drain host events -> input bridge (keys, pause, step) or quit
//!       |-- drain beep levels -> audio bridge (newest level wins)
//!       |-- snapshot machine -> screen + panel
//!       `-- on quit: one shutdown signal, bounded wait for the thread
pub mod config;
pub mod display;
pub mod error;
pub mod input;
pub mod interpreter;
pub mod machine;
pub mod memory;
pub mod panel;
pub mod presentation;
pub mod shutdown;
pub mod sound;
pub mod timing;

pub use error::{Error, MachineError, Result};
