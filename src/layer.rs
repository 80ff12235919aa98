//! Sources of pixel data for the row calculator.
//!
//! A [`Layer`] is asked for one full line of samples at a time, always from
//! the row calculation handler, so implementations need no locking of their
//! own. [`FrameBufLayer`] is the usual implementation: it reads an RGB888
//! [`FrameBuf`], applies a gamma curve and the current rotation, and can be
//! pointed at a new framebuffer between frames.

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::framebuf::FrameBuf;
use crate::row::Sample;

/// Rotation of the drawn image on the panel, clockwise.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rotation {
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    pub fn to_bits(self) -> u8 {
        match self {
            Rotation::Rotate0 => 0,
            Rotation::Rotate90 => 1,
            Rotation::Rotate180 => 2,
            Rotation::Rotate270 => 3,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Rotation::Rotate0),
            1 => Some(Rotation::Rotate90),
            2 => Some(Rotation::Rotate180),
            3 => Some(Rotation::Rotate270),
            _ => None,
        }
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Rotation::Rotate0
    }
}

/// Supplies pixel data for a panel `WIDTH` columns wide.
pub trait Layer<const WIDTH: usize> {
    /// Fill `out` with the samples for panel row `row`, counted from the top
    /// of the panel (so the lower half starts at `rows_per_frame`).
    fn fill_row(&mut self, row: usize, out: &mut [Sample; WIDTH]);

    /// Called before the first row of each frame is calculated.
    fn on_frame_start(&mut self) {}

    /// Called when a new refresh rate takes effect.
    fn on_refresh_rate_changed(&mut self, _refresh_rate: u16) {}

    /// Called when a new rotation takes effect.
    fn on_rotation_changed(&mut self, _rotation: Rotation) {}
}

/// Holds a framebuffer to be displayed from the next frame on.
///
/// The drawing side calls [`present`](Self::present) and the layer picks the
/// buffer up at its next frame start, so a frame is never drawn half from one
/// buffer and half from another.
pub struct FrameSwap<const W: usize, const H: usize> {
    next: AtomicPtr<FrameBuf<W, H>>,
}

impl<const W: usize, const H: usize> FrameSwap<W, H> {
    pub const fn new() -> Self {
        FrameSwap { next: AtomicPtr::new(ptr::null_mut()) }
    }

    /// Queue `fbuf` for display, replacing any buffer not yet picked up.
    pub fn present(&self, fbuf: &'static FrameBuf<W, H>) {
        self.next.store(fbuf as *const _ as *mut _, Ordering::Release);
    }

    /// True while a presented buffer has not been picked up yet.
    pub fn is_pending(&self) -> bool {
        !self.next.load(Ordering::Acquire).is_null()
    }

    fn take(&self) -> Option<&'static FrameBuf<W, H>> {
        let next = self.next.swap(ptr::null_mut(), Ordering::AcqRel);
        // NOTE(unsafe): Only ever set from a `&'static FrameBuf` in `present`,
        // NOTE(unsafe): and only read through shared references.
        unsafe { next.as_ref() }
    }
}

impl<const W: usize, const H: usize> Default for FrameSwap<W, H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Displays a `W` by `H` framebuffer on a panel `W` columns wide.
pub struct FrameBufLayer<const W: usize, const H: usize> {
    fbuf: &'static FrameBuf<W, H>,
    swap: &'static FrameSwap<W, H>,
    rotation: Rotation,
    shift: u32,
}

impl<const W: usize, const H: usize> FrameBufLayer<W, H> {
    /// Create a layer producing samples `depth` bits deep.
    pub fn new(fbuf: &'static FrameBuf<W, H>, swap: &'static FrameSwap<W, H>, depth: usize) -> Self {
        let depth = depth.clamp(1, 16) as u32;
        FrameBufLayer { fbuf, swap, rotation: Rotation::Rotate0, shift: 16 - depth }
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Gamma-correct an 8-bit level and scale it to the layer's depth.
    pub fn level(&self, value: u8) -> u16 {
        GAMMA[usize::from(value)] >> self.shift
    }

    /// Framebuffer coordinates shown at panel position `(x, y)`.
    fn source(&self, x: usize, y: usize) -> Option<(usize, usize)> {
        let (fx, fy) = match self.rotation {
            Rotation::Rotate0 => (Some(x), Some(y)),
            Rotation::Rotate90 => (Some(y), H.checked_sub(x + 1)),
            Rotation::Rotate180 => (W.checked_sub(x + 1), H.checked_sub(y + 1)),
            Rotation::Rotate270 => (W.checked_sub(y + 1), Some(x)),
        };
        Some((fx?, fy?))
    }
}

impl<const W: usize, const H: usize> Layer<W> for FrameBufLayer<W, H> {
    fn fill_row(&mut self, row: usize, out: &mut [Sample; W]) {
        for (x, sample) in out.iter_mut().enumerate() {
            let rgb = self.source(x, row)
                .and_then(|(fx, fy)| self.fbuf.get(fx, fy))
                .unwrap_or([0, 0, 0]);
            *sample = [self.level(rgb[0]), self.level(rgb[1]), self.level(rgb[2])];
        }
    }

    fn on_frame_start(&mut self) {
        if let Some(fbuf) = self.swap.take() {
            self.fbuf = fbuf;
        }
    }

    fn on_rotation_changed(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }
}

/// Gamma lookup table, 8-bit input to 16-bit output.
///
/// To generate in Python:
///
/// ```python
/// print([round(((i / 255) ** 2.2) * 65535) for i in range(256)])
/// ```
pub static GAMMA: [u16; 256] = [
        0,     0,     2,     4,     7,    11,    17,    24,    32,    42,    53,    65,
       79,    94,   111,   129,   148,   169,   192,   216,   242,   270,   299,   330,
      362,   396,   432,   469,   508,   549,   591,   635,   681,   729,   779,   830,
      883,   938,   995,  1053,  1113,  1175,  1239,  1305,  1373,  1443,  1514,  1587,
     1663,  1740,  1819,  1900,  1983,  2068,  2155,  2243,  2334,  2427,  2521,  2618,
     2717,  2817,  2920,  3024,  3131,  3240,  3350,  3463,  3578,  3694,  3813,  3934,
     4057,  4182,  4309,  4438,  4570,  4703,  4838,  4976,  5115,  5257,  5401,  5547,
     5695,  5845,  5998,  6152,  6309,  6468,  6629,  6792,  6957,  7124,  7294,  7466,
     7640,  7816,  7994,  8175,  8358,  8543,  8730,  8919,  9111,  9305,  9501,  9699,
     9900, 10102, 10307, 10515, 10724, 10936, 11150, 11366, 11585, 11806, 12029, 12254,
    12482, 12712, 12944, 13179, 13416, 13655, 13896, 14140, 14386, 14635, 14885, 15138,
    15394, 15652, 15912, 16174, 16439, 16706, 16975, 17247, 17521, 17798, 18077, 18358,
    18642, 18928, 19216, 19507, 19800, 20095, 20393, 20694, 20996, 21301, 21609, 21919,
    22231, 22546, 22863, 23182, 23504, 23829, 24156, 24485, 24817, 25151, 25487, 25826,
    26168, 26512, 26858, 27207, 27558, 27912, 28268, 28627, 28988, 29351, 29717, 30086,
    30457, 30830, 31206, 31585, 31966, 32349, 32735, 33124, 33514, 33908, 34304, 34702,
    35103, 35507, 35913, 36321, 36732, 37146, 37562, 37981, 38402, 38825, 39252, 39680,
    40112, 40546, 40982, 41421, 41862, 42306, 42753, 43202, 43654, 44108, 44565, 45025,
    45487, 45951, 46418, 46888, 47360, 47835, 48313, 48793, 49275, 49761, 50249, 50739,
    51232, 51728, 52226, 52727, 53230, 53736, 54245, 54756, 55270, 55787, 56306, 56828,
    57352, 57879, 58409, 58941, 59476, 60014, 60554, 61097, 61642, 62190, 62741, 63295,
    63851, 64410, 64971, 65535,
];
