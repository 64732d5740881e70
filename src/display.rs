use crate::config::WindowConfig;
use crate::machine::MachineSnapshot;
use crate::panel::Panel;
use crossterm::cursor::{Hide, Show};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use log::warn;
use std::io;
use tui::backend::{Backend, CrosstermBackend};
use tui::buffer::Buffer;
use tui::layout::Rect;
use tui::style::{Color, Style};
use tui::widgets::{Block, Borders, Widget};
use tui::Terminal;

/// unlit pixels
pub const BACKGROUND_COLOR: Color = Color::Rgb(0x22, 0x22, 0x22);

/// Display is used by the presentation loop to put a frame on the screen. It
/// should abstract the implementation details, so a variety of kinds of
/// screen would work.
pub trait Display {
    /// draw one frame from a copy of the machine state
    fn draw(&mut self, snapshot: &MachineSnapshot) -> Result<(), io::Error>;
}

/// one CHIP-8 pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixel {
    pub x: usize,
    pub y: usize,
    pub filled: bool,
}

impl Pixel {
    /// the terminal cells covered by this pixel, given the top-left corner of
    /// the screen
    pub fn cell_rect(&self, origin_x: u16, origin_y: u16, cols: u16, rows: u16) -> Rect {
        let x = (self.x as u16).saturating_mul(cols).saturating_add(origin_x);
        let y = (self.y as u16).saturating_mul(rows).saturating_add(origin_y);
        Rect::new(x, y, cols, rows)
    }
}

/// unpack a 1bpp display buffer into pixels, in row-major order.
///
/// within a byte the most significant bit is the left-most pixel, the same
/// way DXYN lays sprite rows down. the bits are reversed so they can be
/// shifted out least significant first.
pub fn decode(data: &[u8], resolution_x: usize) -> impl Iterator<Item = Pixel> + '_ {
    let count = if resolution_x == 0 { 0 } else { data.len() * 8 };
    let mut i = 0;
    std::iter::from_fn(move || {
        if i >= count {
            return None;
        }
        let bits = data[i / 8].reverse_bits();
        let pixel = Pixel {
            x: i % resolution_x,
            y: i / resolution_x,
            filled: (bits >> (i % 8)) & 1 == 1,
        };
        i += 1;
        Some(pixel)
    })
}

/// pack pixels back into a 1bpp buffer; pixels outside the resolution are
/// ignored
pub fn encode(
    pixels: impl IntoIterator<Item = Pixel>,
    resolution_x: usize,
    resolution_y: usize,
) -> Vec<u8> {
    let mut data = vec![0u8; resolution_x * resolution_y / 8];
    for p in pixels {
        if !p.filled || p.x >= resolution_x || p.y >= resolution_y {
            continue;
        }
        let i = p.y * resolution_x + p.x;
        data[i / 8] |= 0x80 >> (i % 8);
    }
    data
}

/// the CHIP-8 screen as a tui widget; every pixel is a block of cells
pub struct Screen<'a> {
    data: &'a [u8],
    resolution_x: usize,
    cols: u16,
    rows: u16,
    color: Color,
}

impl<'a> Screen<'a> {
    pub fn new(data: &'a [u8], resolution_x: usize, config: &WindowConfig) -> Self {
        Screen {
            data,
            resolution_x,
            cols: config.pixel_size,
            rows: config.pixel_rows(),
            color: config.main_color,
        }
    }

    /// cells needed to show a whole screen, without border
    pub fn size(resolution_x: usize, resolution_y: usize, config: &WindowConfig) -> (u16, u16) {
        (
            (resolution_x as u16).saturating_mul(config.pixel_size),
            (resolution_y as u16).saturating_mul(config.pixel_rows()),
        )
    }
}

impl Widget for Screen<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for pixel in decode(self.data, self.resolution_x) {
            let rect = pixel.cell_rect(area.x, area.y, self.cols, self.rows);
            if !rect.intersects(area) {
                continue;
            }
            let rect = rect.intersection(area);
            let bg = if pixel.filled { self.color } else { BACKGROUND_COLOR };
            for y in rect.top()..rect.bottom() {
                for x in rect.left()..rect.right() {
                    buf.get_mut(x, y).set_symbol(" ").set_bg(bg);
                }
            }
        }
    }
}

/// CHIP-8 display plus the machine state panel in a terminal, rendered
/// using TUI
pub struct TuiDisplay<B: Backend> {
    terminal: Terminal<B>,
    config: WindowConfig,
    alternate_screen: bool,
}

impl TuiDisplay<CrosstermBackend<io::Stdout>> {
    /// take over stdout's alternate screen
    pub fn stdout(config: WindowConfig) -> Result<Self, io::Error> {
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, Hide)?;
        let mut display = TuiDisplay::new(CrosstermBackend::new(stdout), config)?;
        display.alternate_screen = true;
        display.terminal.clear()?;
        Ok(display)
    }
}

impl<B: Backend> TuiDisplay<B> {
    pub fn new(backend: B, config: WindowConfig) -> Result<Self, io::Error> {
        Ok(TuiDisplay {
            terminal: Terminal::new(backend)?,
            config,
            alternate_screen: false,
        })
    }

    pub fn backend(&self) -> &B {
        self.terminal.backend()
    }
}

impl<B: Backend> Display for TuiDisplay<B> {
    fn draw(&mut self, snapshot: &MachineSnapshot) -> Result<(), io::Error> {
        let config = self.config;
        let res_x = snapshot.config.resolution_x;
        let res_y = snapshot.config.resolution_y;
        if snapshot.display.len() != res_x * res_y / 8 {
            warn!(
                "display buffer is {} bytes, expected {}",
                snapshot.display.len(),
                res_x * res_y / 8
            );
        }

        self.terminal.draw(|f| {
            let window = Rect::new(0, 0, config.width, config.height).intersection(f.size());
            let (w, h) = Screen::size(res_x, res_y, &config);
            let screen_area =
                Rect::new(0, 0, w.saturating_add(2), h.saturating_add(2)).intersection(window);

            let block = Block::default()
                .title("CHIP-8")
                .borders(Borders::ALL)
                .style(Style::default().bg(Color::Black).fg(config.text_color));
            let inner = block.inner(screen_area);
            f.render_widget(block, screen_area);
            f.render_widget(Screen::new(&snapshot.display, res_x, &config), inner);

            let panel_area = Rect::new(
                window.x,
                screen_area.bottom(),
                window.width,
                window.height.saturating_sub(screen_area.height),
            );
            f.render_widget(Panel::new(snapshot, &config), panel_area);
        })?;
        Ok(())
    }
}

impl<B: Backend> Drop for TuiDisplay<B> {
    fn drop(&mut self) {
        if self.alternate_screen {
            if let Err(e) = execute!(io::stdout(), LeaveAlternateScreen, Show) {
                warn!("failed to restore terminal: {e}");
            }
        }
    }
}

/// useful for testing non-display routines; remembers what it was asked to draw
#[derive(Default)]
pub struct DummyDisplay {
    pub frames: usize,
    pub last: Option<MachineSnapshot>,
    /// when set, every draw fails
    pub fail: bool,
}

impl DummyDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Display for DummyDisplay {
    fn draw(&mut self, snapshot: &MachineSnapshot) -> Result<(), io::Error> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::Other, "draw failed"));
        }
        self.frames += 1;
        self.last = Some(snapshot.clone());
        Ok(())
    }
}
