use crate::machine::Machine;
use crossterm::event::{
    poll, read, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
    KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::{execute, terminal};
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::time::{Duration, Instant};

/// CHIP-8 keys on the left-hand side of a qwerty keyboard
const CHIP8_CONVENTIONAL_KEYMAP: [(char, u8); 16] = [
    ('x', 0x00), // x
    ('1', 0x01), // 1
    ('2', 0x02), // 2
    ('3', 0x03), // 3
    ('q', 0x04), // q
    ('w', 0x05), // w
    ('e', 0x06), // e
    ('a', 0x07), // a
    ('s', 0x08), // s
    ('d', 0x09), // d
    ('z', 0x0a), // z
    ('c', 0x0b), // c
    ('4', 0x0c), // 4
    ('r', 0x0d), // r
    ('f', 0x0e), // f
    ('v', 0x0f), // v
];

/// the COSMAC VIP hex keypad, row by row
pub const CHIP8_KEYPAD_LAYOUT: [u8; 16] = [
    0x1, 0x2, 0x3, 0xc, //
    0x4, 0x5, 0x6, 0xd, //
    0x7, 0x8, 0x9, 0xe, //
    0xa, 0x0, 0xb, 0xf, //
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugAction {
    TogglePause,
    Step,
}

const DEBUG_KEYMAP: [(char, DebugAction); 2] =
    [('k', DebugAction::TogglePause), ('l', DebugAction::Step)];

/// CHIP-8 key for a host key symbol, ignoring case
pub fn chip8_key_for(symbol: char) -> Option<u8> {
    let symbol = symbol.to_ascii_lowercase();
    CHIP8_CONVENTIONAL_KEYMAP
        .iter()
        .find(|(c, _)| *c == symbol)
        .map(|(_, key)| *key)
}

/// host key symbol for a CHIP-8 key
pub fn qwerty_for(key: u8) -> Option<char> {
    CHIP8_CONVENTIONAL_KEYMAP
        .iter()
        .find(|(_, k)| *k == key)
        .map(|(c, _)| *c)
}

pub fn debug_action_for(symbol: char) -> Option<DebugAction> {
    let symbol = symbol.to_ascii_lowercase();
    DEBUG_KEYMAP
        .iter()
        .find(|(c, _)| *c == symbol)
        .map(|(_, action)| *action)
}

/// what the host reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// `repeat` is 0 for the initial press, non-zero for auto-repeat
    KeyDown { key: char, repeat: u8 },
    KeyUp { key: char },
    Quit,
}

/// reads host events
pub trait HostInput {
    /// everything that happened since the last call, without blocking
    fn poll_events(&mut self) -> Result<Vec<HostEvent>, io::Error>;
}

/// the parts of the machine the input bridge may touch
pub trait MachineControl {
    fn set_key_state(&self, key: u8, down: bool);
    fn is_paused(&self) -> bool;
    /// returns the new paused state
    fn toggle_paused(&self) -> bool;
    /// returns whether a step was queued
    fn request_step(&self) -> bool;
}

impl MachineControl for Machine {
    fn set_key_state(&self, key: u8, down: bool) {
        Machine::set_key_state(self, key, down)
    }
    fn is_paused(&self) -> bool {
        Machine::is_paused(self)
    }
    fn toggle_paused(&self) -> bool {
        Machine::toggle_paused(self)
    }
    fn request_step(&self) -> bool {
        Machine::request_step(self)
    }
}

/// turns host key events into CHIP-8 key state and debugger controls
pub struct InputBridge<C> {
    control: C,
}

impl<C: MachineControl> InputBridge<C> {
    pub fn new(control: C) -> Self {
        InputBridge { control }
    }

    /// returns whether the event did anything. Quit is not handled here.
    pub fn handle(&mut self, event: HostEvent) -> bool {
        match event {
            HostEvent::KeyDown { key, repeat } => {
                if let Some(k) = chip8_key_for(key) {
                    self.control.set_key_state(k, true);
                    return true;
                }
                match debug_action_for(key) {
                    // only the initial press of a press-and-hold counts
                    Some(DebugAction::TogglePause) if repeat == 0 => {
                        let paused = self.control.toggle_paused();
                        info!("{}", if paused { "paused" } else { "resumed" });
                        true
                    }
                    Some(DebugAction::Step) if self.control.is_paused() => {
                        self.control.request_step()
                    }
                    _ => false,
                }
            }
            HostEvent::KeyUp { key } => match chip8_key_for(key) {
                Some(k) => {
                    self.control.set_key_state(k, false);
                    true
                }
                None => false,
            },
            HostEvent::Quit => false,
        }
    }
}

/// terminals that can't report key releases get one synthesised after a key
/// has gone this long without an auto-repeat
pub const HOLD_TIMEOUT: Duration = Duration::from_millis(250);

/// the same, between the initial press and the first auto-repeat; longer
/// than the usual OS repeat delay (500-660 ms)
pub const FIRST_REPEAT_TIMEOUT: Duration = Duration::from_millis(750);

#[derive(Debug, Clone, Copy)]
struct Held {
    last: Instant,
    repeating: bool,
}

impl Held {
    fn timeout(&self) -> Duration {
        if self.repeating {
            HOLD_TIMEOUT
        } else {
            FIRST_REPEAT_TIMEOUT
        }
    }
}

/// turns crossterm key events into host events, faking releases on
/// terminals that don't send them
pub struct KeyTracker {
    reports_releases: bool,
    held: HashMap<char, Held>,
}

impl KeyTracker {
    pub fn new(reports_releases: bool) -> Self {
        KeyTracker {
            reports_releases,
            held: HashMap::new(),
        }
    }

    pub fn key(&mut self, event: KeyEvent, now: Instant) -> Option<HostEvent> {
        let is_quit = event.code == KeyCode::Esc
            || (event.code == KeyCode::Char('c') && event.modifiers.contains(KeyModifiers::CONTROL));
        if is_quit {
            return (event.kind == KeyEventKind::Press).then_some(HostEvent::Quit);
        }
        let key = match event.code {
            KeyCode::Char(c) => c.to_ascii_lowercase(),
            _ => return None,
        };

        if self.reports_releases {
            return Some(match event.kind {
                KeyEventKind::Press => HostEvent::KeyDown { key, repeat: 0 },
                KeyEventKind::Repeat => HostEvent::KeyDown { key, repeat: 1 },
                KeyEventKind::Release => HostEvent::KeyUp { key },
            });
        }

        // every event is a press; auto-repeat shows up as presses of a key
        // we think is still held
        if event.kind == KeyEventKind::Release {
            return None;
        }
        let repeating = self.held.contains_key(&key);
        self.held.insert(key, Held { last: now, repeating });
        Some(HostEvent::KeyDown {
            key,
            repeat: u8::from(repeating),
        })
    }

    /// synthesise releases for keys that went quiet
    pub fn expire(&mut self, now: Instant, out: &mut Vec<HostEvent>) {
        if self.reports_releases {
            return;
        }
        self.held.retain(|key, held| {
            let quiet = now.saturating_duration_since(held.last) >= held.timeout();
            if quiet {
                out.push(HostEvent::KeyUp { key: *key });
            }
            !quiet
        });
    }
}

/// keyboard input from the terminal, using crossterm in raw mode
pub struct TerminalInput {
    tracker: KeyTracker,
}

impl TerminalInput {
    pub fn new() -> Result<Self, io::Error> {
        terminal::enable_raw_mode()?;
        let reports_releases = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if reports_releases {
            execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        } else {
            warn!(
                "terminal doesn't report key releases; releasing keys after {:?} idle",
                HOLD_TIMEOUT
            );
        }
        Ok(TerminalInput {
            tracker: KeyTracker::new(reports_releases),
        })
    }
}

impl Drop for TerminalInput {
    fn drop(&mut self) {
        if self.tracker.reports_releases {
            if let Err(e) = execute!(io::stdout(), PopKeyboardEnhancementFlags) {
                warn!("failed to restore keyboard mode: {e}");
            }
        }
        if let Err(e) = terminal::disable_raw_mode() {
            warn!("failed to leave raw mode: {e}");
        }
    }
}

impl HostInput for TerminalInput {
    fn poll_events(&mut self) -> Result<Vec<HostEvent>, io::Error> {
        let mut events = Vec::new();
        while poll(Duration::ZERO)? {
            match read()? {
                Event::Key(key) => {
                    if let Some(event) = self.tracker.key(key, Instant::now()) {
                        events.push(event);
                    }
                }
                other => debug!("ignoring terminal event {other:?}"),
            }
        }
        self.tracker.expire(Instant::now(), &mut events);
        Ok(events)
    }
}

/// dummy HostInput for testing; hands out one batch of events per poll
#[derive(Default)]
pub struct ScriptedInput {
    batches: VecDeque<Vec<HostEvent>>,
}

impl ScriptedInput {
    pub fn new(batches: impl IntoIterator<Item = Vec<HostEvent>>) -> Self {
        ScriptedInput {
            batches: batches.into_iter().collect(),
        }
    }
}

impl HostInput for ScriptedInput {
    fn poll_events(&mut self) -> Result<Vec<HostEvent>, io::Error> {
        Ok(self.batches.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::{Cell, RefCell};

    /// records what the bridge did
    #[derive(Default)]
    struct FakeMachine {
        keys: RefCell<[bool; 16]>,
        paused: Cell<bool>,
        toggles: Cell<usize>,
        steps: Cell<usize>,
    }

    impl MachineControl for &FakeMachine {
        fn set_key_state(&self, key: u8, down: bool) {
            self.keys.borrow_mut()[key as usize] = down;
        }
        fn is_paused(&self) -> bool {
            self.paused.get()
        }
        fn toggle_paused(&self) -> bool {
            self.toggles.set(self.toggles.get() + 1);
            self.paused.set(!self.paused.get());
            self.paused.get()
        }
        fn request_step(&self) -> bool {
            self.steps.set(self.steps.get() + 1);
            true
        }
    }

    fn down(key: char) -> HostEvent {
        HostEvent::KeyDown { key, repeat: 0 }
    }

    #[test]
    fn test_keymap_is_bijective() {
        for key in 0..16u8 {
            let symbol = qwerty_for(key).unwrap();
            assert_eq!(chip8_key_for(symbol), Some(key));
        }
        let mut layout = CHIP8_KEYPAD_LAYOUT;
        layout.sort();
        assert_eq!(layout, core::array::from_fn::<u8, 16, _>(|i| i as u8));
    }

    #[test]
    fn test_key_down_and_up() {
        let m = FakeMachine::default();
        let mut bridge = InputBridge::new(&m);
        assert!(bridge.handle(down('w')));
        assert!(m.keys.borrow()[0x5]);
        assert!(bridge.handle(HostEvent::KeyUp { key: 'w' }));
        assert!(!m.keys.borrow()[0x5]);
    }

    #[test]
    fn test_uppercase_maps_too() {
        let m = FakeMachine::default();
        let mut bridge = InputBridge::new(&m);
        bridge.handle(down('V'));
        assert!(m.keys.borrow()[0xf]);
    }

    #[test]
    fn test_unmapped_keys_ignored() {
        let m = FakeMachine::default();
        let mut bridge = InputBridge::new(&m);
        assert!(!bridge.handle(down('p')));
        assert!(!bridge.handle(HostEvent::KeyUp { key: 'k' }));
        assert!(m.keys.borrow().iter().all(|k| !k));
        assert_eq!(m.toggles.get(), 0);
    }

    #[test]
    fn test_pause_ignores_auto_repeat() {
        let m = FakeMachine::default();
        let mut bridge = InputBridge::new(&m);
        bridge.handle(down('k'));
        for _ in 0..10 {
            bridge.handle(HostEvent::KeyDown { key: 'k', repeat: 1 });
        }
        assert_eq!(m.toggles.get(), 1);
        assert!(m.paused.get());
    }

    #[test]
    fn test_step_only_while_paused() {
        let m = FakeMachine::default();
        let mut bridge = InputBridge::new(&m);
        assert!(!bridge.handle(down('l')));
        assert_eq!(m.steps.get(), 0);
        m.paused.set(true);
        assert!(bridge.handle(down('l')));
        assert_eq!(m.steps.get(), 1);
    }

    #[test]
    fn test_tracker_with_release_reports() {
        let mut t = KeyTracker::new(true);
        let now = Instant::now();
        let ev = |kind| KeyEvent::new_with_kind(KeyCode::Char('q'), KeyModifiers::NONE, kind);
        assert_eq!(t.key(ev(KeyEventKind::Press), now), Some(down('q')));
        assert_eq!(
            t.key(ev(KeyEventKind::Repeat), now),
            Some(HostEvent::KeyDown { key: 'q', repeat: 1 })
        );
        assert_eq!(t.key(ev(KeyEventKind::Release), now), Some(HostEvent::KeyUp { key: 'q' }));
    }

    #[test]
    fn test_tracker_synthesises_releases() {
        let mut t = KeyTracker::new(false);
        let start = Instant::now();
        let press = KeyEvent::new(KeyCode::Char('k'), KeyModifiers::NONE);
        assert_eq!(t.key(press, start), Some(down('k')));
        assert_eq!(
            t.key(press, start + Duration::from_millis(100)),
            Some(HostEvent::KeyDown { key: 'k', repeat: 1 })
        );
        let mut out = Vec::new();
        t.expire(start + Duration::from_millis(300), &mut out);
        assert!(out.is_empty());
        t.expire(start + Duration::from_millis(400), &mut out);
        assert_eq!(out, vec![HostEvent::KeyUp { key: 'k' }]);
        // pressed again after the release is a fresh press
        assert_eq!(t.key(press, start + Duration::from_millis(500)), Some(down('k')));
    }

    #[test]
    fn test_held_pause_key_toggles_once() {
        // OS auto-repeat: first repeat after 500 ms, then every 33 ms, for
        // a 1.5 s hold; the loop polls every 16 ms
        let m = FakeMachine::default();
        let mut bridge = InputBridge::new(&m);
        let mut t = KeyTracker::new(false);
        let start = Instant::now();
        let press = KeyEvent::new(KeyCode::Char('k'), KeyModifiers::NONE);
        let mut presses: Vec<u64> = vec![0];
        presses.extend((500..1500).step_by(33));

        let mut ups = 0;
        let mut next = presses.iter().peekable();
        for ms in (0..2500).step_by(16) {
            let now = start + Duration::from_millis(ms);
            let mut events = Vec::new();
            while let Some(at) = next.next_if(|at| **at <= ms) {
                events.extend(t.key(press, start + Duration::from_millis(*at)));
            }
            t.expire(now, &mut events);
            for e in events {
                if matches!(e, HostEvent::KeyUp { .. }) {
                    ups += 1;
                }
                bridge.handle(e);
            }
        }
        assert_eq!(m.toggles.get(), 1);
        assert_eq!(ups, 1);
    }

    #[test]
    fn test_held_keypad_key_stays_down_until_repeats_start() {
        let m = FakeMachine::default();
        let mut bridge = InputBridge::new(&m);
        let mut t = KeyTracker::new(false);
        let start = Instant::now();
        let press = KeyEvent::new(KeyCode::Char('w'), KeyModifiers::NONE);
        bridge.handle(t.key(press, start).unwrap());
        let mut out = Vec::new();
        t.expire(start + Duration::from_millis(600), &mut out);
        assert!(out.is_empty());
        assert!(m.keys.borrow()[0x5]);
        // a tap with no repeats is released after the longer timeout
        t.expire(start + Duration::from_millis(800), &mut out);
        assert_eq!(out, vec![HostEvent::KeyUp { key: 'w' }]);
    }

    #[test]
    fn test_tracker_quit_keys() {
        let mut t = KeyTracker::new(false);
        let now = Instant::now();
        let esc = KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(t.key(esc, now), Some(HostEvent::Quit));
        assert_eq!(t.key(ctrl_c, now), Some(HostEvent::Quit));
        // plain c is a CHIP-8 key
        let c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE);
        assert_eq!(t.key(c, now), Some(down('c')));
    }

    #[test]
    fn test_scripted_input_batches() {
        let mut input = ScriptedInput::new([vec![down('1')], vec![]]);
        assert_eq!(input.poll_events().unwrap(), vec![down('1')]);
        assert!(input.poll_events().unwrap().is_empty());
        assert!(input.poll_events().unwrap().is_empty());
    }

    fn event_strategy() -> impl Strategy<Value = HostEvent> {
        let symbols = prop::sample::select(vec!['1', 'q', 'w', 'x', 'v', 'p', 'k', 'm', '9']);
        (symbols, any::<bool>(), 0u8..3).prop_map(|(key, is_down, repeat)| {
            if is_down {
                HostEvent::KeyDown { key, repeat }
            } else {
                HostEvent::KeyUp { key }
            }
        })
    }

    proptest! {
        #[test]
        fn key_state_follows_last_event(events in prop::collection::vec(event_strategy(), 0..64)) {
            let m = FakeMachine::default();
            let mut bridge = InputBridge::new(&m);
            for e in &events {
                bridge.handle(*e);
            }
            for key in 0..16u8 {
                let symbol = qwerty_for(key).unwrap();
                let expected = events
                    .iter()
                    .rev()
                    .find_map(|e| match *e {
                        HostEvent::KeyDown { key: k, .. } if k == symbol => Some(true),
                        HostEvent::KeyUp { key: k } if k == symbol => Some(false),
                        _ => None,
                    })
                    .unwrap_or(false);
                prop_assert_eq!(m.keys.borrow()[key as usize], expected);
            }
        }

        #[test]
        fn pause_toggles_once_per_press(repeats in 0usize..50) {
            let m = FakeMachine::default();
            let mut bridge = InputBridge::new(&m);
            bridge.handle(HostEvent::KeyDown { key: 'k', repeat: 0 });
            for _ in 0..repeats {
                bridge.handle(HostEvent::KeyDown { key: 'k', repeat: 1 });
            }
            bridge.handle(HostEvent::KeyUp { key: 'k' });
            prop_assert_eq!(m.toggles.get(), 1);
        }
    }
}
