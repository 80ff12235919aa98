//! Row buffers: everything the transfer engines need to display one scan row.
//!
//! A row is split into `DEPTH` bit-plane blocks. The buffer stores each kind of
//! block data in its own contiguous array (all address pairs, then all timer
//! pairs, then all pixel data) so that each transfer engine walks a plain
//! array with a fixed element size and needs no stride support.
//!
//! Pixel data for one plane is two bytes per column: the first with the
//! shift clock low and the six colour bits for the upper and lower half of the
//! panel, the second identical but with the clock high, which latches the
//! colour bits into the panel's shift registers on the rising edge.

use crate::address::AddressPair;
use crate::error::{Error, Result};
use crate::timing::{TimerPair, TimingTable};

/// One pixel as 16-bit red, green and blue levels. Bit `i` of each channel
/// selects whether that channel is lit during bit-plane `i`.
pub type Sample = [u16; 3];

/// Bit positions of each HUB75 signal within the data output byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DataPins {
    pub r1: u8,
    pub g1: u8,
    pub b1: u8,
    pub r2: u8,
    pub g2: u8,
    pub b2: u8,
    pub clk: u8,
}

impl DataPins {
    /// R1 G1 B1 R2 G2 B2 on bits 0 to 5 and the shift clock on bit 6.
    pub const fn new() -> Self {
        DataPins { r1: 0, g1: 1, b1: 2, r2: 3, g2: 4, b2: 5, clk: 6 }
    }

    /// Check every signal is on a distinct bit of the byte.
    pub fn validate(&self) -> Result<()> {
        let mut seen = 0u16;
        for bit in self.bits() {
            if bit >= 8 || seen & (1 << bit) != 0 {
                return Err(Error::InvalidDataPins);
            }
            seen |= 1 << bit;
        }
        Ok(())
    }

    fn bits(&self) -> [u8; 7] {
        [self.r1, self.g1, self.b1, self.r2, self.g2, self.b2, self.clk]
    }

    /// Clock-low byte for the given upper and lower pixels in `plane`.
    pub fn encode(&self, upper: &Sample, lower: &Sample, plane: usize) -> u8 {
        let bit = |level: u16, pin: u8| (((level >> plane) & 1) as u8) << pin;
        bit(upper[0], self.r1)
            | bit(upper[1], self.g1)
            | bit(upper[2], self.b1)
            | bit(lower[0], self.r2)
            | bit(lower[1], self.g2)
            | bit(lower[2], self.b2)
    }
}

impl Default for DataPins {
    fn default() -> Self {
        Self::new()
    }
}

/// A read-only view of block `i` of a row buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BitPlaneBlock<'a, const WIDTH: usize> {
    /// Row select pattern, all zero when the panel has no address engine.
    pub address: AddressPair,
    pub timer: TimerPair,
    pub data: &'a [[u8; 2]; WIDTH],
}

/// All bit-plane blocks for one scan row.
#[repr(C)]
pub struct RowBuffer<const DEPTH: usize, const WIDTH: usize> {
    addresses: [AddressPair; DEPTH],
    timers: [TimerPair; DEPTH],
    data: [[[u8; 2]; WIDTH]; DEPTH],
    row: u16,
    sequence: u32,
}

impl<const DEPTH: usize, const WIDTH: usize> RowBuffer<DEPTH, WIDTH> {
    /// An all-zero buffer, usable to initialise arrays of buffers.
    pub const INIT: Self = Self::new();

    pub const fn new() -> Self {
        RowBuffer {
            addresses: [AddressPair { set: 0, clear: 0 }; DEPTH],
            timers: [TimerPair::new(0, 0); DEPTH],
            data: [[[0; 2]; WIDTH]; DEPTH],
            row: 0,
            sequence: 0,
        }
    }

    /// Scan row this buffer was last filled for.
    pub fn row(&self) -> u16 {
        self.row
    }

    /// Position of this buffer in the stream of calculated rows.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn addresses(&self) -> &[AddressPair; DEPTH] {
        &self.addresses
    }

    pub fn timers(&self) -> &[TimerPair; DEPTH] {
        &self.timers
    }

    pub fn data(&self) -> &[[[u8; 2]; WIDTH]; DEPTH] {
        &self.data
    }

    pub fn block(&self, plane: usize) -> BitPlaneBlock<'_, WIDTH> {
        BitPlaneBlock {
            address: self.addresses[plane],
            timer: self.timers[plane],
            data: &self.data[plane],
        }
    }

    /// Fill the row number, sequence number, address pattern and timing of every block.
    pub fn fill_header(
        &mut self,
        row: u16,
        sequence: u32,
        address: AddressPair,
        timing: &TimingTable<DEPTH>,
    ) {
        self.row = row;
        self.sequence = sequence;
        self.addresses = [address; DEPTH];
        self.timers = *timing.pairs();
    }

    /// Fill every plane's pixel data from the upper and lower half rows.
    pub fn encode_pixels(&mut self, pins: &DataPins, upper: &[Sample; WIDTH], lower: &[Sample; WIDTH]) {
        let clk = 1u8 << pins.clk;
        for (plane, line) in self.data.iter_mut().enumerate() {
            for (out, (u, l)) in line.iter_mut().zip(upper.iter().zip(lower.iter())) {
                let byte = pins.encode(u, l, plane);
                *out = [byte, byte | clk];
            }
        }
    }
}

impl<const DEPTH: usize, const WIDTH: usize> Default for RowBuffer<DEPTH, WIDTH> {
    fn default() -> Self {
        Self::new()
    }
}
