use crate::config::WindowConfig;
use crate::display::Display;
use crate::input::{HostEvent, HostInput, InputBridge};
use crate::machine::{BeepEvents, Machine};
use crate::panel::PROGRAM_WINDOW_WORDS;
use crate::shutdown::{ShutdownCoordinator, SHUTDOWN_GRACE};
use crate::sound::{AudioBridge, SamplePlayer};
use crate::timing::Ticker;
use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Quit,
}

/// drives the front end at the refresh rate: input in, beeps out, frame drawn
pub struct PresentationLoop<I, D, P> {
    config: WindowConfig,
    machine: Machine,
    input: I,
    bridge: InputBridge<Machine>,
    audio: AudioBridge<P>,
    beeps: BeepEvents,
    display: D,
    shutdown: ShutdownCoordinator,
    frames: u64,
}

impl<I, D, P> PresentationLoop<I, D, P>
where
    I: HostInput,
    D: Display,
    P: SamplePlayer,
{
    pub fn new(
        config: WindowConfig,
        machine: Machine,
        beeps: BeepEvents,
        input: I,
        display: D,
        player: P,
        shutdown: ShutdownCoordinator,
    ) -> Self {
        PresentationLoop {
            config,
            bridge: InputBridge::new(machine.clone()),
            machine,
            input,
            audio: AudioBridge::new(player),
            beeps,
            display,
            shutdown,
            frames: 0,
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn audio(&self) -> &AudioBridge<P> {
        &self.audio
    }

    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_terminated()
    }

    /// one frame, minus the wait for the next one. once quit has been seen
    /// there are no more frames.
    pub fn tick(&mut self) -> Tick {
        if self.shutdown.is_terminated() {
            return Tick::Quit;
        }
        let mut outcome = Tick::Continue;

        match self.input.poll_events() {
            Ok(events) => {
                for event in events {
                    if event == HostEvent::Quit {
                        if outcome == Tick::Continue {
                            info!("quit");
                            self.shutdown.request();
                        }
                        outcome = Tick::Quit;
                    } else {
                        self.bridge.handle(event);
                    }
                }
            }
            Err(e) => warn!("failed to read input: {e}"),
        }

        if let Err(e) = self.audio.drain(&self.beeps) {
            warn!("audio: {e}");
        }

        let snapshot = self.machine.snapshot(PROGRAM_WINDOW_WORDS);
        if let Err(e) = self.display.draw(&snapshot) {
            warn!("frame {} skipped: {e}", self.frames);
        }
        self.frames += 1;

        outcome
    }

    /// tick at the refresh rate until the host asks to quit, then give the
    /// execution thread a bounded grace period to stop
    pub fn run(&mut self) {
        let mut ticker = Ticker::new(self.config.frame_period());
        info!("presenting every {:?}", ticker.period());
        while self.tick() == Tick::Continue {
            ticker.wait();
        }
        if self.shutdown.await_exit(SHUTDOWN_GRACE) {
            info!("execution thread stopped");
        }
        info!("presented {} frames", self.frames);
    }
}
