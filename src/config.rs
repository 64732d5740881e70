use crate::error::{Error, Result};
use std::time::Duration;
use tui::style::Color;

/// longest period a ticker may be asked to wait
const MAX_PERIOD: Duration = Duration::from_secs(3600);

/// 1/hz as a Duration, or an error when that doesn't make a usable tick
fn period_of(what: &str, hz: f64) -> Result<Duration> {
    if !(hz > 0.0 && hz.is_finite()) {
        return Err(Error::Config(format!("{what} must be positive, got {hz}")));
    }
    match Duration::try_from_secs_f64(1.0 / hz) {
        Ok(period) if !period.is_zero() && period <= MAX_PERIOD => Ok(period),
        _ => Err(Error::Config(format!("{what} of {hz} Hz is out of range"))),
    }
}

/// how the execution thread should behave
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachineConfig {
    /// instructions per second
    pub clock_freq: f64,
    pub resolution_x: usize,
    pub resolution_y: usize,
    /// whether sprites running off the right/bottom edge reappear on the
    /// opposite side, or are clipped
    pub draw_wrap: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            clock_freq: 500.0,
            resolution_x: 64,
            resolution_y: 32,
            draw_wrap: true,
        }
    }
}

impl MachineConfig {
    pub fn validate(&self) -> Result<()> {
        period_of("clock frequency", self.clock_freq)?;
        if self.resolution_x == 0 || self.resolution_y == 0 {
            return Err(Error::Config("display resolution must be non-zero".into()));
        }
        if self.resolution_x % 8 != 0 {
            return Err(Error::Config(format!(
                "horizontal resolution must be a multiple of 8, got {}",
                self.resolution_x
            )));
        }
        Ok(())
    }

    /// how big the packed display buffer is
    pub fn display_size_bytes(&self) -> usize {
        self.resolution_x * self.resolution_y / 8
    }

    /// time between two instructions; only meaningful once validated
    pub fn cycle_period(&self) -> Duration {
        period_of("clock frequency", self.clock_freq).unwrap_or(MAX_PERIOD)
    }
}

/// how the terminal front end looks; fixed once the loop starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowConfig {
    /// display refresh rate in Hz
    pub refresh_rate: f64,
    /// terminal cells
    pub width: u16,
    pub height: u16,
    /// terminal columns per CHIP-8 pixel
    pub pixel_size: u16,
    pub main_color: Color,
    pub text_color: Color,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            refresh_rate: 60.0,
            width: 132,
            height: 60,
            pixel_size: 2,
            main_color: Color::Rgb(0x00, 0xc0, 0xd3),
            text_color: Color::White,
        }
    }
}

impl WindowConfig {
    pub fn validate(&self) -> Result<()> {
        period_of("refresh rate", self.refresh_rate)?;
        if self.frame_period().is_zero() {
            return Err(Error::Config(format!(
                "refresh rate of {} Hz is out of range",
                self.refresh_rate
            )));
        }
        if self.pixel_size == 0 {
            return Err(Error::Config("pixel size must be positive".into()));
        }
        Ok(())
    }

    /// one tick of the presentation loop: 1,000,000 / refresh rate microseconds
    pub fn frame_period(&self) -> Duration {
        Duration::from_micros((1_000_000.0 / self.refresh_rate) as u64)
    }

    /// terminal rows per CHIP-8 pixel; cells are roughly twice as tall as wide
    pub fn pixel_rows(&self) -> u16 {
        (self.pixel_size / 2).max(1)
    }
}
