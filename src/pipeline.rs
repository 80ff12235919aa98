//! Chained transfer engines which replay row buffers onto the panel.
//!
//! Three engines run each bit-plane block without CPU involvement:
//!
//! * Engine A, optional, copies the block's [`AddressPair`] to the address
//!   port when the latch timer updates.
//! * Engine B copies the block's [`TimerPair`] into the latch timer, setting
//!   the length of the next block and when output enable is asserted in it.
//!   When linking is enabled, completing B starts engine C.
//! * Engine C clocks the block's pixel data out to the data port. After the
//!   last block of a row it raises the shift-complete interrupt.
//!
//! Each engine is reached through the [`TransferDescriptor`] trait, so the same
//! chain runs on real DMA streams or on emulated ones in tests.

use core::mem::size_of;

use crate::address::AddressPair;
use crate::row::RowBuffer;
use crate::timing::TimerPair;

/// Memory an engine reads from: `count` elements of `len` bytes each.
///
/// The address is kept as a plain integer, as engines program it straight
/// into a memory address register.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Source {
    pub addr: usize,
    pub len: usize,
    pub count: usize,
    /// If false the same element is read `count` times.
    pub increment: bool,
}

impl Source {
    /// Walk every element of `items` in order.
    pub fn array<T, const N: usize>(items: &[T; N]) -> Self {
        Source { addr: items.as_ptr() as usize, len: size_of::<T>(), count: N, increment: true }
    }

    /// Read `item` `count` times.
    pub fn repeat<T>(item: &T, count: usize) -> Self {
        Source { addr: item as *const T as usize, len: size_of::<T>(), count, increment: false }
    }
}

/// One reprogrammable transfer engine.
///
/// Implementations only record the new settings; they take effect on the
/// engine's next trigger after [`arm`](Self::arm).
pub trait TransferDescriptor {
    fn set_source(&mut self, source: Source);

    /// Peripheral register address the engine writes to.
    fn set_destination(&mut self, addr: usize);

    /// Enable the engine so that it starts on its next trigger.
    fn arm(&mut self);

    /// Whether completing this engine starts the next one in the chain.
    fn link_next(&mut self, enabled: bool);

    /// Whether completing this engine raises an interrupt.
    fn on_complete(&mut self, interrupt: bool);

    /// Acknowledge a completion interrupt.
    fn clear_complete(&mut self);
}

/// Stands in for the address engine on panels without one.
pub enum NoEngine {}

impl TransferDescriptor for NoEngine {
    fn set_source(&mut self, _source: Source) {
        match *self {}
    }

    fn set_destination(&mut self, _addr: usize) {
        match *self {}
    }

    fn arm(&mut self) {
        match *self {}
    }

    fn link_next(&mut self, _enabled: bool) {
        match *self {}
    }

    fn on_complete(&mut self, _interrupt: bool) {
        match *self {}
    }

    fn clear_complete(&mut self) {
        match *self {}
    }
}

/// Register addresses each engine writes to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Destinations {
    /// Bit set/reset register of the address port.
    pub address: usize,
    /// Latch timer register the timer pairs are written through.
    pub timer: usize,
    /// Output data register of the pixel data port.
    pub data: usize,
}

/// The three chained engines.
pub struct TransferChain<A, B, C> {
    address: Option<A>,
    timer: B,
    shift: C,
}

impl<A, B, C> TransferChain<A, B, C>
where
    A: TransferDescriptor,
    B: TransferDescriptor,
    C: TransferDescriptor,
{
    /// Set up destinations, link B to C, and enable the shift-complete interrupt.
    pub fn new(address: Option<A>, timer: B, shift: C, destinations: &Destinations) -> Self {
        let mut chain = TransferChain { address, timer, shift };
        if let Some(a) = chain.address.as_mut() {
            a.set_destination(destinations.address);
            a.on_complete(false);
            a.link_next(false);
        }
        chain.timer.set_destination(destinations.timer);
        chain.timer.on_complete(false);
        chain.timer.link_next(true);
        chain.shift.set_destination(destinations.data);
        chain.shift.on_complete(true);
        chain.shift.link_next(false);
        chain
    }

    pub fn has_address_engine(&self) -> bool {
        self.address.is_some()
    }

    /// Point every engine at `row`'s blocks.
    pub fn point_at<const DEPTH: usize, const WIDTH: usize>(&mut self, row: &RowBuffer<DEPTH, WIDTH>) {
        if let Some(a) = self.address.as_mut() {
            a.set_source(Source::array::<AddressPair, DEPTH>(row.addresses()));
        }
        self.timer.set_source(Source::array::<TimerPair, DEPTH>(row.timers()));
        self.shift.set_source(Source::array(row.data()));
    }

    /// Loop the timer engine on `idle` and stop it starting the shift engine.
    ///
    /// The address engine keeps replaying the last row's pattern, which is
    /// harmless since output enable is never asserted by the idle pair.
    pub fn park_idle(&mut self, idle: &TimerPair, depth: usize) {
        self.timer.set_source(Source::repeat(idle, depth));
        self.timer.link_next(false);
        self.timer.arm();
    }

    /// Leave the idle loop and continue with `row`.
    pub fn resume<const DEPTH: usize, const WIDTH: usize>(&mut self, row: &RowBuffer<DEPTH, WIDTH>) {
        self.point_at(row);
        self.timer.link_next(true);
        self.arm();
    }

    /// Enable every engine.
    pub fn arm(&mut self) {
        if let Some(a) = self.address.as_mut() {
            a.arm();
        }
        self.timer.arm();
        self.shift.arm();
    }

    pub fn clear_complete(&mut self) {
        self.shift.clear_complete();
    }

    /// Give the engines back.
    pub fn free(self) -> (Option<A>, B, C) {
        (self.address, self.timer, self.shift)
    }
}
