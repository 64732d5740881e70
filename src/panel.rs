use crate::config::WindowConfig;
use crate::input::{qwerty_for, CHIP8_KEYPAD_LAYOUT};
use crate::machine::MachineSnapshot;
use tui::buffer::Buffer;
use tui::layout::{Constraint, Direction, Layout, Rect};
use tui::style::{Color, Style};
use tui::text::{Span, Spans};
use tui::widgets::{Paragraph, Widget};

/// words of program listed around the program counter
pub const PROGRAM_WINDOW_WORDS: usize = 20;

/// machine state below the screen: keypads, registers, stack and the
/// program around PC
pub struct Panel<'a> {
    snapshot: &'a MachineSnapshot,
    text: Style,
    highlight: Style,
    main_color: Color,
}

impl<'a> Panel<'a> {
    pub fn new(snapshot: &'a MachineSnapshot, config: &WindowConfig) -> Self {
        Panel {
            snapshot,
            text: Style::default().fg(config.text_color),
            highlight: Style::default().fg(config.main_color),
            main_color: config.main_color,
        }
    }

    fn line(&self, text: String) -> Spans<'static> {
        Spans::from(Span::styled(text, self.text))
    }

    fn marked(&self, text: String, marker: &str, marked: bool) -> Spans<'static> {
        if marked {
            Spans::from(Span::styled(format!("{text} {marker}"), self.highlight))
        } else {
            self.line(text)
        }
    }

    fn keypad(&self, label: &str, qwerty: bool) -> Vec<Spans<'static>> {
        let held = Style::default().bg(self.main_color).fg(Color::Black);
        let mut lines = vec![self.line(label.to_string())];
        for row in CHIP8_KEYPAD_LAYOUT.chunks(4) {
            let mut spans = vec![Span::raw(" ")];
            for &key in row {
                let name = if qwerty {
                    qwerty_for(key).map_or('?', |c| c.to_ascii_uppercase())
                } else {
                    char::from_digit(key as u32, 16).map_or('?', |c| c.to_ascii_uppercase())
                };
                let style = if self.snapshot.keys[key as usize] {
                    held
                } else {
                    self.text
                };
                spans.push(Span::styled(format!(" {name} "), style));
                spans.push(Span::raw(" "));
            }
            lines.push(Spans::from(spans));
        }
        lines
    }

    fn status_lines(&self) -> Vec<Spans<'static>> {
        let s = self.snapshot;
        let mut lines = self.keypad("KEYPAD:", false);
        lines.push(Spans::default());
        lines.extend(self.keypad("QWERTY:", true));
        lines.push(Spans::default());
        lines.push(self.line(format!("CYCLE {}", s.cycle)));
        lines.push(self.line(format!("FREQ {:.1} HZ", s.config.clock_freq)));
        lines.push(if s.paused {
            Spans::from(Span::styled("PAUSED  [k] run [l] step", self.highlight))
        } else {
            self.line("RUNNING [k] pause".to_string())
        });
        lines
    }

    fn register_lines(&self) -> Vec<Spans<'static>> {
        let s = self.snapshot;
        let mut lines = vec![self.line("REGISTERS:".to_string())];
        lines.extend(
            s.registers
                .iter()
                .enumerate()
                .map(|(i, v)| self.line(format!(" V{i:X}    0x{v:02x}"))),
        );
        lines.push(self.line(format!(" I     0x{:04x}", s.index)));
        lines.push(self.line(format!(" DELAY 0x{:02x}", s.delay_timer)));
        lines.push(self.line(format!(" SOUND 0x{:02x}", s.sound_timer)));
        lines
    }

    fn stack_lines(&self) -> Vec<Spans<'static>> {
        let s = self.snapshot;
        let mut lines = vec![self.line("STACK:".to_string())];
        lines.extend(s.stack.iter().enumerate().map(|(i, addr)| {
            self.marked(
                format!(" 0x{i:x} 0x{addr:04x}"),
                "<-HEAD",
                i == s.stack_pointer as usize,
            )
        }));
        lines
    }

    fn program_lines(&self) -> Vec<Spans<'static>> {
        let s = self.snapshot;
        let mut lines = vec![self.line("PROGRAM:".to_string())];
        lines.extend(s.program.iter().map(|entry| match entry {
            Some((addr, word)) => self.marked(
                format!(" 0x{addr:04x} 0x{word:04x}"),
                "<-PC",
                *addr == s.program_counter,
            ),
            None => Spans::default(),
        }));
        lines
    }
}

impl Widget for Panel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(
                [
                    Constraint::Length(26),
                    Constraint::Length(18),
                    Constraint::Length(22),
                    Constraint::Min(0),
                ]
                .as_ref(),
            )
            .split(area);

        Paragraph::new(self.status_lines()).render(columns[0], buf);
        Paragraph::new(self.register_lines()).render(columns[1], buf);
        Paragraph::new(self.stack_lines()).render(columns[2], buf);
        Paragraph::new(self.program_lines()).render(columns[3], buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;
    use crate::machine::Machine;

    fn row(buf: &Buffer, y: u16) -> String {
        (buf.area.left()..buf.area.right())
            .map(|x| buf.get(x, y).symbol.clone())
            .collect()
    }

    fn render(snapshot: &MachineSnapshot) -> Buffer {
        let area = Rect::new(0, 0, 100, 24);
        let mut buf = Buffer::empty(area);
        Panel::new(snapshot, &WindowConfig::default()).render(area, &mut buf);
        buf
    }

    fn snapshot() -> MachineSnapshot {
        let (m, _beeps, _shutdown) = Machine::new(MachineConfig::default()).unwrap();
        let mut prog: &[u8] = &[0x6a, 0x42, 0x22, 0x00];
        m.load_program(&mut prog).unwrap();
        m.set_paused(true);
        m.step();
        m.step();
        m.snapshot(PROGRAM_WINDOW_WORDS)
    }

    #[test]
    fn test_shows_registers_and_cycle() {
        let buf = render(&snapshot());
        let text: Vec<String> = (0..24).map(|y| row(&buf, y)).collect();
        assert!(text.iter().any(|l| l.contains("VA    0x42")));
        assert!(text.iter().any(|l| l.contains("CYCLE 2")));
        assert!(text.iter().any(|l| l.contains("PAUSED")));
    }

    #[test]
    fn test_marks_stack_head_and_pc() {
        let buf = render(&snapshot());
        let text: Vec<String> = (0..24).map(|y| row(&buf, y)).collect();
        // one call made, so the head is at slot 1
        assert!(text[2].contains("0x1 0x0000 <-HEAD"));
        assert!(text[1].contains("0x0 0x0204"));
        // pc went back to 0x200; it sits in the middle of the window
        assert!(text[11].contains("0x0200 0x6a42 <-PC"));
    }

    #[test]
    fn test_highlights_held_keys() {
        let mut s = snapshot();
        s.keys[0x1] = true;
        let buf = render(&s);
        // first keypad row: " " then " 1 "
        assert_eq!(buf.get(2, 1).symbol, "1");
        assert_eq!(buf.get(2, 1).bg, WindowConfig::default().main_color);
        assert_ne!(buf.get(6, 1).bg, WindowConfig::default().main_color);
    }

    #[test]
    fn test_qwerty_labels() {
        let buf = render(&snapshot());
        let text: Vec<String> = (0..24).map(|y| row(&buf, y)).collect();
        assert!(text[7].contains("1   2   3   4"));
        assert!(text[10].contains("Z   X   C   V"));
    }

    #[test]
    fn test_empty_area_is_fine() {
        let s = snapshot();
        let mut buf = Buffer::empty(Rect::new(0, 0, 10, 10));
        Panel::new(&s, &WindowConfig::default()).render(Rect::new(0, 10, 10, 0), &mut buf);
    }
}
