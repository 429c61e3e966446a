//! Memory-mapped display window at the top of RAM.
//!
//! Pixels are stored row-major as three bytes (red, green, blue). Pixel `(x, y)` lives at
//! `SCREEN_ADDR + 3 * (x + y * SCREEN_WIDTH)`. Rendering is left to whoever reads it.

use crate::runtime::{RAM_SIZE, ROM_SIZE};

pub const SCREEN_WIDTH: usize = 320;
pub const SCREEN_HEIGHT: usize = 240;

pub const SCREEN_PIXELS: usize = SCREEN_WIDTH * SCREEN_HEIGHT;
pub const SCREEN_BYTES: usize = SCREEN_PIXELS * 3;

/// Offset of the window inside RAM.
pub const SCREEN_BASE: usize = RAM_SIZE - SCREEN_BYTES;
/// Address of the window in the unified address space.
pub const SCREEN_ADDR: u32 = (ROM_SIZE + SCREEN_BASE) as u32;

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Read-only view of the display window, borrowed from a [`crate::RunState`].
#[derive(Clone, Copy)]
pub struct Screen<'a> {
    bytes: &'a [u8],
}

impl<'a> Screen<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        debug_assert_eq!(bytes.len(), SCREEN_BYTES);
        Screen { bytes }
    }

    pub fn width(&self) -> usize {
        SCREEN_WIDTH
    }

    pub fn height(&self) -> usize {
        SCREEN_HEIGHT
    }

    /// Colour of a single pixel, or `None` if outside the window.
    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb> {
        if x >= SCREEN_WIDTH || y >= SCREEN_HEIGHT {
            return None;
        }
        let base = 3 * (x + y * SCREEN_WIDTH);
        Some(Rgb {
            r: self.bytes[base],
            g: self.bytes[base + 1],
            b: self.bytes[base + 2],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_sits_at_top_of_ram() {
        assert_eq!(SCREEN_BYTES, 230_400);
        assert_eq!(SCREEN_BASE + SCREEN_BYTES, RAM_SIZE);
        assert_eq!(SCREEN_ADDR as usize + SCREEN_BYTES, ROM_SIZE + RAM_SIZE);
    }

    #[test]
    fn pixel_lookup() {
        let mut bytes = vec![0; SCREEN_BYTES];
        let base = 3 * (5 + 2 * SCREEN_WIDTH);
        bytes[base..base + 3].copy_from_slice(&[1, 2, 3]);
        let screen = Screen::new(&bytes);
        assert_eq!(screen.pixel(5, 2), Some(Rgb { r: 1, g: 2, b: 3 }));
        assert_eq!(screen.pixel(4, 2), Some(Rgb::default()));
        assert_eq!(screen.pixel(SCREEN_WIDTH, 0), None);
        assert_eq!(screen.pixel(0, SCREEN_HEIGHT), None);
    }
}
