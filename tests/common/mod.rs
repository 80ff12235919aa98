//! Emulated transfer engines and a panel that decodes what they would output.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use hubrefresh::{
    AddressPair, DataPins, Destinations, Layer, PanelConfig, RefreshConfig, Sample, Source,
    TimerConfig, TimerPair, TransferDescriptor,
};

pub const DEST: Destinations = Destinations { address: 0x4002_0018, timer: 0x4001_004C, data: 0x4002_0414 };

pub const CONFIG: RefreshConfig = RefreshConfig {
    panel: PanelConfig {
        rows_per_frame: 8,
        address_pins: &[4, 5, 6],
        data_pins: DataPins::new(),
    },
    timer: TimerConfig::new(20_000_000),
    refresh_rate: 120,
    brightness: 255,
    lower_rate_on_underrun: false,
};

#[derive(Clone, Debug, Default)]
pub struct EngineState {
    pub source: Option<Source>,
    pub destination: usize,
    pub armed: usize,
    pub linked: bool,
    pub interrupt: bool,
    pub cleared: usize,
}

/// A transfer engine whose state stays visible after it is moved into a chain.
#[derive(Clone, Default)]
pub struct Engine(pub Rc<RefCell<EngineState>>);

impl Engine {
    pub fn state(&self) -> EngineState {
        self.0.borrow().clone()
    }

    /// Raw bytes the engine would read, in order.
    pub fn bytes(&self) -> Vec<u8> {
        let src = self.0.borrow().source.expect("engine has no source");
        let mut out = Vec::with_capacity(src.len * src.count);
        for i in 0..src.count {
            let offset = if src.increment { i * src.len } else { 0 };
            // Sources always point into a live RefreshState or idle pair.
            let addr = (src.addr + offset) as *const u8;
            let element = unsafe { std::slice::from_raw_parts(addr, src.len) };
            out.extend_from_slice(element);
        }
        out
    }

    pub fn timer_pairs(&self) -> Vec<TimerPair> {
        self.bytes()
            .chunks_exact(6)
            .map(|c| TimerPair {
                period: u16::from_ne_bytes([c[0], c[1]]),
                repetition: u16::from_ne_bytes([c[2], c[3]]),
                oe: u16::from_ne_bytes([c[4], c[5]]),
            })
            .collect()
    }

    pub fn address_pairs(&self) -> Vec<AddressPair> {
        self.bytes()
            .chunks_exact(4)
            .map(|c| AddressPair {
                set: u16::from_ne_bytes([c[0], c[1]]),
                clear: u16::from_ne_bytes([c[2], c[3]]),
            })
            .collect()
    }
}

impl TransferDescriptor for Engine {
    fn set_source(&mut self, source: Source) {
        self.0.borrow_mut().source = Some(source);
    }

    fn set_destination(&mut self, addr: usize) {
        self.0.borrow_mut().destination = addr;
    }

    fn arm(&mut self) {
        self.0.borrow_mut().armed += 1;
    }

    fn link_next(&mut self, enabled: bool) {
        self.0.borrow_mut().linked = enabled;
    }

    fn on_complete(&mut self, interrupt: bool) {
        self.0.borrow_mut().interrupt = interrupt;
    }

    fn clear_complete(&mut self) {
        self.0.borrow_mut().cleared += 1;
    }
}

/// Rebuild the upper and lower samples of column `x` from a shift engine's
/// data stream `depth` planes deep.
pub fn decode_column(data: &[u8], pins: &DataPins, width: usize, depth: usize, x: usize) -> (Sample, Sample) {
    let mut upper = [0u16; 3];
    let mut lower = [0u16; 3];
    for plane in 0..depth {
        let [low, high] = [data[plane * 2 * width + 2 * x], data[plane * 2 * width + 2 * x + 1]];
        assert_eq!(low & (1 << pins.clk), 0, "clock high on first byte");
        assert_eq!(high, low | (1 << pins.clk), "second byte differs from first");
        let bit = |pin: u8| u16::from((low >> pin) & 1) << plane;
        upper[0] |= bit(pins.r1);
        upper[1] |= bit(pins.g1);
        upper[2] |= bit(pins.b1);
        lower[0] |= bit(pins.r2);
        lower[1] |= bit(pins.g2);
        lower[2] |= bit(pins.b2);
    }
    (upper, lower)
}

/// Encodes where each row came from into its pixels.
///
/// Upper half: red is the low four bits of the row's position in the
/// calculation sequence, green is the scan row. Lower half: red is the next
/// four bits of the sequence.
#[derive(Clone, Default)]
pub struct SequenceLayer {
    pub calls: Rc<Cell<u32>>,
    pub frames: Rc<Cell<u32>>,
}

impl SequenceLayer {
    pub fn decode(upper: Sample, lower: Sample) -> (u32, u16) {
        (u32::from(upper[0]) | (u32::from(lower[0]) << 4), upper[1])
    }
}

impl<const W: usize> Layer<W> for SequenceLayer {
    fn fill_row(&mut self, row: usize, out: &mut [Sample; W]) {
        let n = self.calls.get();
        self.calls.set(n + 1);
        let sequence = n / 2;
        let sample = if n % 2 == 0 {
            [(sequence & 0xF) as u16, row as u16, 0]
        } else {
            [((sequence >> 4) & 0xF) as u16, 0, 0]
        };
        *out = [sample; W];
    }

    fn on_frame_start(&mut self) {
        self.frames.set(self.frames.get() + 1);
    }
}
