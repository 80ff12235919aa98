//! RGB888 framebuffer that implements embedded-graphics' DrawTarget.

use embedded_graphics::{
    Pixel,
    pixelcolor::{Rgb888, RgbColor},
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Size},
};

/// `W` pixels wide by `H` pixels tall, stored row-major.
#[repr(transparent)]
#[derive(Copy, Clone)]
pub struct FrameBuf<const W: usize, const H: usize>(pub [[[u8; 3]; W]; H]);

impl<const W: usize, const H: usize> FrameBuf<W, H> {
    pub const fn new() -> Self {
        FrameBuf([[[0; 3]; W]; H])
    }

    /// Set all pixels to black.
    pub fn clear_black(&mut self) {
        for line in self.0.iter_mut() {
            line.fill([0, 0, 0]);
        }
    }

    /// Colour at `(x, y)`, or `None` outside the buffer.
    pub fn get(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        self.0.get(y).and_then(|line| line.get(x)).copied()
    }

    pub fn set(&mut self, x: usize, y: usize, color: [u8; 3]) {
        if let Some(p) = self.0.get_mut(y).and_then(|line| line.get_mut(x)) {
            *p = color;
        }
    }
}

impl<const W: usize, const H: usize> Default for FrameBuf<W, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const W: usize, const H: usize> OriginDimensions for FrameBuf<W, H> {
    fn size(&self) -> Size {
        Size::new(W as u32, H as u32)
    }
}

impl<const W: usize, const H: usize> DrawTarget for FrameBuf<W, H> {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where I: IntoIterator<Item = Pixel<Self::Color>>
    {
        for Pixel(coord, color) in pixels.into_iter() {
            if let Ok(pos) = coord.try_into() {
                let (x, y): (u32, u32) = pos;
                self.set(x as usize, y as usize, [color.r(), color.g(), color.b()]);
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let color = [color.r(), color.g(), color.b()];
        for line in self.0.iter_mut() {
            line.fill(color);
        }
        Ok(())
    }
}
