use clap::Parser;
use env_logger::Target;
use log::{info, LevelFilter};
use std::error::Error;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chip8dbg::config::{MachineConfig, WindowConfig};
use chip8dbg::display::TuiDisplay;
use chip8dbg::input::TerminalInput;
use chip8dbg::machine::Machine;
use chip8dbg::presentation::PresentationLoop;
use chip8dbg::shutdown::{spawn_execution, ShutdownCoordinator};
use chip8dbg::sound::{Mute, SamplePlayer, SimpleBeep};

/// CHIP-8 interpreter with a terminal debugger.
///
/// Keys 1234/QWER/ASDF/ZXCV are the hex keypad, k pauses, l steps while
/// paused, Esc quits.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// path of the program to load and execute
    program: PathBuf,

    /// start with the machine paused
    #[arg(long)]
    start_paused: bool,

    /// clip sprites at the screen edge instead of wrapping them around
    #[arg(long)]
    nowrap: bool,

    /// instructions per second
    #[arg(long, default_value_t = 500.0)]
    clock_freq: f64,

    /// display refresh rate in Hz
    #[arg(long, default_value_t = 60.0)]
    refresh_rate: f64,

    /// terminal columns per CHIP-8 pixel
    #[arg(long, default_value_t = 2)]
    pixel_size: u16,

    /// don't drive the PC speaker
    #[arg(long)]
    mute: bool,

    /// write the log here; otherwise nothing is logged
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// where log records go. stdout and stderr both belong to the terminal UI
/// once it is up, so without a file the records are dropped.
fn log_target(log_file: Option<&Path>) -> io::Result<Target> {
    Ok(match log_file {
        Some(path) => Target::Pipe(Box::new(File::create(path)?)),
        None => Target::Pipe(Box::new(io::sink())),
    })
}

fn init_logging(log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Off)
        .filter_module("chip8dbg", LevelFilter::Info)
        .target(log_target(log_file)?)
        .parse_default_env()
        .init();
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    // initialise; anything failing here ends the process before a thread starts
    let machine_config = MachineConfig {
        clock_freq: args.clock_freq,
        draw_wrap: !args.nowrap,
        ..MachineConfig::default()
    };
    let window_config = WindowConfig {
        refresh_rate: args.refresh_rate,
        pixel_size: args.pixel_size,
        ..WindowConfig::default()
    };
    window_config.validate()?;

    let (machine, beeps, shutdown) = Machine::new(machine_config)?;
    machine.set_paused(args.start_paused);

    // load a program
    let mut f = File::open(&args.program)?;
    let len = machine.load_program(&mut f)?;
    info!("loaded {} ({len} bytes)", args.program.display());

    let player: Box<dyn SamplePlayer> = if args.mute {
        Box::new(Mute::new())
    } else {
        Box::new(SimpleBeep::new()?)
    };
    let input = TerminalInput::new()?;
    let display = TuiDisplay::stdout(window_config)?;

    // run
    let execution = spawn_execution(machine.clone())?;
    let coordinator = ShutdownCoordinator::new(shutdown, execution);
    let mut presentation = PresentationLoop::new(
        window_config,
        machine,
        beeps,
        input,
        display,
        player,
        coordinator,
    );
    presentation.run();
    Ok(())
}
