use crate::error::{Error, Result};
use crate::machine::BeepEvents;
use beep::beep;
use log::warn;

/// something that can loop a beep until told to stop
pub trait SamplePlayer {
    fn play_looped(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn is_playing(&self) -> bool;
}

impl<P: SamplePlayer + ?Sized> SamplePlayer for Box<P> {
    fn play_looped(&mut self) -> Result<()> {
        (**self).play_looped()
    }
    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }
    fn is_playing(&self) -> bool {
        (**self).is_playing()
    }
}

const SIMPLEBEEP_PITCH: u16 = 2093; // C

/// PC speaker tone; it keeps sounding until explicitly silenced
pub struct SimpleBeep {
    is_beeping: bool,
}

impl SimpleBeep {
    /// silences the speaker once, which fails early if we can't drive it
    pub fn new() -> Result<Self> {
        beep(0).map_err(|e| Error::Audio(e.to_string()))?;
        Ok(SimpleBeep { is_beeping: false })
    }
}

impl SamplePlayer for SimpleBeep {
    fn play_looped(&mut self) -> Result<()> {
        beep(SIMPLEBEEP_PITCH).map_err(|e| Error::Audio(e.to_string()))?;
        self.is_beeping = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        beep(0).map_err(|e| Error::Audio(e.to_string()))?;
        self.is_beeping = false;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.is_beeping
    }
}

impl Drop for SimpleBeep {
    fn drop(&mut self) {
        if self.is_beeping {
            if let Err(e) = self.stop() {
                warn!("failed to silence speaker: {e}");
            }
        }
    }
}

/// keeps track of what would be playing, but makes no noise
#[derive(Default)]
pub struct Mute {
    playing: bool,
}

impl Mute {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SamplePlayer for Mute {
    fn play_looped(&mut self) -> Result<()> {
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.playing = false;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

/// turns beep levels from the machine into start/stop calls, only on
/// transitions
pub struct AudioBridge<P> {
    player: P,
}

impl<P: SamplePlayer> AudioBridge<P> {
    pub fn new(player: P) -> Self {
        AudioBridge { player }
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn handle(&mut self, beep: bool) -> Result<()> {
        match (beep, self.player.is_playing()) {
            (true, false) => self.player.play_looped(),
            (false, true) => self.player.stop(),
            _ => Ok(()),
        }
    }

    /// apply only the newest pending level; older ones are superseded
    pub fn drain(&mut self, events: &BeepEvents) -> Result<Option<bool>> {
        match events.latest() {
            Some(level) => self.handle(level).map(|()| Some(level)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;
    use crate::machine::Machine;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Play,
        Stop,
    }

    #[derive(Default)]
    struct RecordingPlayer {
        playing: bool,
        calls: Vec<Call>,
    }

    impl SamplePlayer for RecordingPlayer {
        fn play_looped(&mut self) -> Result<()> {
            assert!(!self.playing, "started while already playing");
            self.playing = true;
            self.calls.push(Call::Play);
            Ok(())
        }
        fn stop(&mut self) -> Result<()> {
            assert!(self.playing, "stopped while already stopped");
            self.playing = false;
            self.calls.push(Call::Stop);
            Ok(())
        }
        fn is_playing(&self) -> bool {
            self.playing
        }
    }

    #[test]
    fn test_repeated_levels_are_noops() {
        let mut bridge = AudioBridge::new(RecordingPlayer::default());
        for level in [false, true, true, true, false, false] {
            bridge.handle(level).unwrap();
        }
        assert_eq!(bridge.player().calls, vec![Call::Play, Call::Stop]);
    }

    #[test]
    fn test_mute_tracks_state() -> Result<()> {
        let mut bridge = AudioBridge::new(Mute::new());
        bridge.handle(true)?;
        assert!(bridge.player().is_playing());
        bridge.handle(false)?;
        assert!(!bridge.player().is_playing());
        Ok(())
    }

    #[test]
    fn test_boxed_player() -> Result<()> {
        let player: Box<dyn SamplePlayer> = Box::new(Mute::new());
        let mut bridge = AudioBridge::new(player);
        bridge.handle(true)?;
        assert!(bridge.player().is_playing());
        Ok(())
    }

    #[test]
    fn test_drain_applies_latest_only() -> Result<()> {
        // beep levels only come from the machine, so drive one through a
        // sound timer: on, then off, both pending before the drain
        let (m, beeps, _shutdown) = Machine::new(MachineConfig {
            clock_freq: 60.0,
            ..MachineConfig::default()
        })?;
        let mut prog: &[u8] = &[0x60, 0x02, 0xf0, 0x18, 0x12, 0x04];
        m.load_program(&mut prog)?;
        m.set_paused(true);
        for _ in 0..3 {
            m.step();
        }
        let mut bridge = AudioBridge::new(RecordingPlayer::default());
        assert_eq!(bridge.drain(&beeps)?, Some(false));
        assert!(bridge.player().calls.is_empty());
        assert_eq!(bridge.drain(&beeps)?, None);
        Ok(())
    }

    proptest! {
        #[test]
        fn playback_follows_transitions(levels in prop::collection::vec(any::<bool>(), 0..64)) {
            let mut bridge = AudioBridge::new(RecordingPlayer::default());
            for level in &levels {
                bridge.handle(*level).unwrap();
            }
            prop_assert_eq!(bridge.player().is_playing(), levels.last().copied().unwrap_or(false));

            let mut expected = Vec::new();
            let mut playing = false;
            for level in &levels {
                if *level != playing {
                    expected.push(if *level { Call::Play } else { Call::Stop });
                    playing = *level;
                }
            }
            prop_assert_eq!(&bridge.player().calls, &expected);
        }
    }
}
