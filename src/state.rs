//! Shared state between the application, the row calculator and the
//! shift-complete handler.
//!
//! [`RefreshState`] owns the row buffer pool, the index queue, the idle timer
//! pair and a handful of atomic flags and pending-value slots. It is designed
//! to live in a `static` (so it can be placed in DMA-accessible RAM) and is
//! split once at startup into three handles:
//!
//! * [`RowProducer`], owned by the row calculation handler, the only writer
//!   of row buffers.
//! * [`RowConsumer`], owned by the shift-complete handler, which releases rows
//!   once the hardware has finished with them.
//! * [`Control`], a cheap copyable handle for the application to change
//!   brightness, refresh rate and rotation, and to poll status flags.
//!
//! Configuration changes never touch the handlers directly: they are stored
//! in a pending slot and taken by the row calculator at the next frame start.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU8, Ordering};

use crate::layer::Rotation;
use crate::queue::RowQueue;
use crate::row::RowBuffer;
use crate::timing::TimerPair;

/// A single optional value handed from one context to another.
///
/// Setting a new value before the old one is taken replaces it.
pub struct Pending {
    slot: AtomicU32,
}

impl Pending {
    const NONE: u32 = u32::MAX;

    pub const fn new() -> Self {
        Pending { slot: AtomicU32::new(Self::NONE) }
    }

    pub fn set(&self, value: u16) {
        self.slot.store(u32::from(value), Ordering::Release);
    }

    pub fn take(&self) -> Option<u16> {
        match self.slot.swap(Self::NONE, Ordering::AcqRel) {
            Self::NONE => None,
            value => Some(value as u16),
        }
    }

    fn clear(&mut self) {
        *self.slot.get_mut() = Self::NONE;
    }
}

impl Default for Pending {
    fn default() -> Self {
        Self::new()
    }
}

/// Flags and pending values, separate from the buffers so [`Control`] does
/// not need to carry the engine dimensions.
pub struct Shared {
    underrun: AtomicBool,
    frame_underrun: AtomicBool,
    rate_lowered: AtomicBool,
    starved: AtomicBool,
    brightness: Pending,
    refresh_rate: Pending,
    rotation: Pending,
    active_refresh_rate: AtomicU16,
    active_brightness: AtomicU8,
}

impl Shared {
    const fn new() -> Self {
        Shared {
            underrun: AtomicBool::new(false),
            frame_underrun: AtomicBool::new(false),
            rate_lowered: AtomicBool::new(false),
            starved: AtomicBool::new(false),
            brightness: Pending::new(),
            refresh_rate: Pending::new(),
            rotation: Pending::new(),
            active_refresh_rate: AtomicU16::new(0),
            active_brightness: AtomicU8::new(0),
        }
    }

    fn reset(&mut self) {
        *self.underrun.get_mut() = false;
        *self.frame_underrun.get_mut() = false;
        *self.rate_lowered.get_mut() = false;
        *self.starved.get_mut() = false;
        self.brightness.clear();
        self.refresh_rate.clear();
        self.rotation.clear();
    }
}

/// Row buffers and shared flags for an engine `DEPTH` planes deep, `WIDTH`
/// columns wide, with `CAP` row buffers.
pub struct RefreshState<const DEPTH: usize, const WIDTH: usize, const CAP: usize> {
    rows: UnsafeCell<[RowBuffer<DEPTH, WIDTH>; CAP]>,
    idle: TimerPair,
    queue: RowQueue<CAP>,
    shared: Shared,
}

// NOTE(unsafe): Row buffers are only written through the single RowProducer,
// NOTE(unsafe): and only in slots the queue says are not visible to the reader.
unsafe impl<const DEPTH: usize, const WIDTH: usize, const CAP: usize> Sync
    for RefreshState<DEPTH, WIDTH, CAP> {}

impl<const DEPTH: usize, const WIDTH: usize, const CAP: usize> RefreshState<DEPTH, WIDTH, CAP> {
    pub const fn new() -> Self {
        RefreshState {
            rows: UnsafeCell::new([RowBuffer::INIT; CAP]),
            idle: TimerPair::new(0, 0),
            queue: RowQueue::new(),
            shared: Shared::new(),
        }
    }

    /// Reset the queue and flags and hand out the three access handles.
    ///
    /// `idle` is the timer pair loaded while no rows are queued, and
    /// `refresh_rate`/`brightness` are the initially active settings.
    pub fn split(
        &mut self,
        idle: TimerPair,
        refresh_rate: u16,
        brightness: u8,
    ) -> (RowProducer<'_, DEPTH, WIDTH, CAP>, RowConsumer<'_, DEPTH, WIDTH, CAP>, Control<'_, CAP>) {
        self.idle = idle;
        self.queue.reset();
        self.shared.reset();
        *self.shared.active_refresh_rate.get_mut() = refresh_rate;
        *self.shared.active_brightness.get_mut() = brightness;

        let state: &Self = self;
        (
            RowProducer { state },
            RowConsumer { state },
            Control { queue: &state.queue, shared: &state.shared },
        )
    }

    fn slot(&self, index: usize) -> *mut RowBuffer<DEPTH, WIDTH> {
        // Pointer arithmetic only; never forms a reference to the whole pool.
        (self.rows.get() as *mut RowBuffer<DEPTH, WIDTH>).wrapping_add(index % CAP)
    }
}

impl<const DEPTH: usize, const WIDTH: usize, const CAP: usize> Default
    for RefreshState<DEPTH, WIDTH, CAP>
{
    fn default() -> Self {
        Self::new()
    }
}

/// Write side of the row queue.
pub struct RowProducer<'a, const DEPTH: usize, const WIDTH: usize, const CAP: usize> {
    state: &'a RefreshState<DEPTH, WIDTH, CAP>,
}

impl<'a, const DEPTH: usize, const WIDTH: usize, const CAP: usize> RowProducer<'a, DEPTH, WIDTH, CAP> {
    /// True if a row buffer is free to be filled.
    pub fn is_free(&self) -> bool {
        !self.state.queue.is_full()
    }

    /// The buffer to fill next, or `None` if every buffer is queued.
    pub fn next_write_slot(&mut self) -> Option<&mut RowBuffer<DEPTH, WIDTH>> {
        if self.state.queue.is_full() {
            return None;
        }
        let slot = self.state.slot(self.state.queue.next_write_slot());
        // NOTE(unsafe): With the queue not full the write slot is not visible to
        // NOTE(unsafe): the consumer until commit_write, and &mut self stops it
        // NOTE(unsafe): being handed out twice.
        Some(unsafe { &mut *slot })
    }

    /// Publish the slot returned by [`next_write_slot`](Self::next_write_slot).
    pub fn commit_write(&mut self) {
        self.state.queue.commit_write();
    }

    pub fn len(&self) -> usize {
        self.state.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.queue.is_empty()
    }

    /// True while the shift engine is parked on the idle pair.
    pub fn is_starved(&self) -> bool {
        self.state.shared.starved.load(Ordering::Acquire)
    }

    pub fn take_brightness(&self) -> Option<u8> {
        self.state.shared.brightness.take().map(|b| b as u8)
    }

    pub fn take_refresh_rate(&self) -> Option<u16> {
        self.state.shared.refresh_rate.take()
    }

    pub fn take_rotation(&self) -> Option<Rotation> {
        self.state.shared.rotation.take().and_then(|r| Rotation::from_bits(r as u8))
    }

    /// True if an underrun occurred since the last call.
    ///
    /// Independent of [`Control::take_underrun`], so automatic rate lowering
    /// does not hide underruns from the application.
    pub fn take_frame_underrun(&self) -> bool {
        self.state.shared.frame_underrun.swap(false, Ordering::AcqRel)
    }

    pub fn flag_refresh_rate_lowered(&self) {
        self.state.shared.rate_lowered.store(true, Ordering::Release);
    }

    /// Publish the settings now in use.
    pub fn set_active(&self, refresh_rate: u16, brightness: u8) {
        self.state.shared.active_refresh_rate.store(refresh_rate, Ordering::Relaxed);
        self.state.shared.active_brightness.store(brightness, Ordering::Relaxed);
    }
}

/// Read side of the row queue.
pub struct RowConsumer<'a, const DEPTH: usize, const WIDTH: usize, const CAP: usize> {
    state: &'a RefreshState<DEPTH, WIDTH, CAP>,
}

impl<'a, const DEPTH: usize, const WIDTH: usize, const CAP: usize> RowConsumer<'a, DEPTH, WIDTH, CAP> {
    pub fn is_empty(&self) -> bool {
        self.state.queue.is_empty()
    }

    /// Oldest committed row, or `None` if the queue is empty.
    ///
    /// The row stays borrowed from this handle, so it cannot be held across
    /// [`commit_read`](Self::commit_read), after which the producer may
    /// refill it:
    ///
    /// ```compile_fail
    /// use hubrefresh::{RefreshState, TimerPair};
    ///
    /// let mut state = RefreshState::<2, 4, 2>::new();
    /// let (mut producer, mut consumer, _) = state.split(TimerPair::blank(40), 120, 255);
    /// producer.commit_write();
    /// let shown = consumer.next_read_slot().unwrap();
    /// consumer.commit_read();
    /// let _ = shown.row();
    /// ```
    pub fn next_read_slot(&self) -> Option<&RowBuffer<DEPTH, WIDTH>> {
        if self.state.queue.is_empty() {
            return None;
        }
        let slot = self.state.slot(self.state.queue.next_read_slot());
        // NOTE(unsafe): Committed slots are not written again until released by
        // NOTE(unsafe): commit_read, which the borrow of self keeps from happening.
        Some(unsafe { &*slot })
    }

    /// Release the row returned by [`next_read_slot`](Self::next_read_slot).
    pub fn commit_read(&mut self) {
        self.state.queue.commit_read();
    }

    /// Timer pair to load while no rows are queued.
    pub fn idle(&self) -> &'a TimerPair {
        &self.state.idle
    }

    pub fn set_starved(&self, starved: bool) {
        self.state.shared.starved.store(starved, Ordering::Release);
    }

    /// Record an underrun for both the application and the row calculator.
    pub fn flag_underrun(&self) {
        self.state.shared.underrun.store(true, Ordering::Release);
        self.state.shared.frame_underrun.store(true, Ordering::Release);
    }
}

/// Application handle for runtime settings and status.
///
/// Setters only record a pending value; it takes effect when the row
/// calculator starts its next frame.
#[derive(Copy, Clone)]
pub struct Control<'a, const CAP: usize> {
    queue: &'a RowQueue<CAP>,
    shared: &'a Shared,
}

impl<'a, const CAP: usize> Control<'a, CAP> {
    pub fn set_brightness(&self, brightness: u8) {
        self.shared.brightness.set(u16::from(brightness));
    }

    /// Request a refresh rate in frames per second. Values outside the range
    /// the timer can produce are clamped when applied.
    pub fn set_refresh_rate(&self, refresh_rate: u16) {
        self.shared.refresh_rate.set(refresh_rate);
    }

    pub fn set_rotation(&self, rotation: Rotation) {
        self.shared.rotation.set(u16::from(rotation.to_bits()));
    }

    /// Refresh rate currently in use.
    pub fn refresh_rate(&self) -> u16 {
        self.shared.active_refresh_rate.load(Ordering::Relaxed)
    }

    /// Brightness currently in use.
    pub fn brightness(&self) -> u8 {
        self.shared.active_brightness.load(Ordering::Relaxed)
    }

    /// True if a row buffer is free for the row calculator.
    pub fn is_buffer_free(&self) -> bool {
        !self.queue.is_full()
    }

    /// True if an underrun occurred since the last call.
    pub fn take_underrun(&self) -> bool {
        self.shared.underrun.swap(false, Ordering::AcqRel)
    }

    /// True if the refresh rate was lowered after an underrun since the last call.
    pub fn take_refresh_rate_lowered(&self) -> bool {
        self.shared.rate_lowered.swap(false, Ordering::AcqRel)
    }

    /// True while the display is blanked waiting for rows.
    pub fn is_starved(&self) -> bool {
        self.shared.starved.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_keeps_latest() {
        let p = Pending::new();
        assert_eq!(p.take(), None);
        p.set(10);
        p.set(20);
        assert_eq!(p.take(), Some(20));
        assert_eq!(p.take(), None);
        p.set(u16::MAX);
        assert_eq!(p.take(), Some(u16::MAX));
    }

    #[test]
    fn handles_share_the_queue() {
        let mut state = RefreshState::<2, 4, 2>::new();
        let (mut producer, mut consumer, control) = state.split(TimerPair::blank(40), 120, 200);
        assert_eq!(control.refresh_rate(), 120);
        assert_eq!(control.brightness(), 200);
        assert_eq!(*consumer.idle(), TimerPair::blank(40));

        assert!(control.is_buffer_free());
        assert!(consumer.next_read_slot().is_none());
        let timing = crate::TimingTable::fit(
            &crate::RowBudget { ticks_per_row: 200, latch_ticks: 2, min_block_ticks: 20, step: 5 },
            255,
        );
        producer.next_write_slot().unwrap().fill_header(3, 9, Default::default(), &timing);
        producer.commit_write();
        producer.commit_write();
        assert!(!control.is_buffer_free());

        let row = consumer.next_read_slot().unwrap();
        assert_eq!((row.row(), row.sequence()), (3, 9));
        consumer.commit_read();
        assert!(producer.is_free());
    }

    #[test]
    fn full_queue_has_no_write_slot() {
        let mut state = RefreshState::<2, 4, 2>::new();
        let (mut producer, mut consumer, _control) = state.split(TimerPair::blank(40), 120, 255);
        let timing = crate::TimingTable::fit(
            &crate::RowBudget { ticks_per_row: 200, latch_ticks: 2, min_block_ticks: 20, step: 5 },
            255,
        );
        for row in 1..=2 {
            producer.next_write_slot().unwrap().fill_header(row, 0, Default::default(), &timing);
            producer.commit_write();
        }

        // The slot the next write would use is the one being displayed.
        assert!(producer.next_write_slot().is_none());
        assert_eq!(consumer.next_read_slot().map(|r| r.row()), Some(1));

        consumer.commit_read();
        producer.next_write_slot().unwrap().fill_header(99, 0, Default::default(), &timing);
        assert_eq!(consumer.next_read_slot().map(|r| r.row()), Some(2));
    }

    #[test]
    fn settings_are_deferred() {
        let mut state = RefreshState::<2, 4, 2>::new();
        let (producer, _consumer, control) = state.split(TimerPair::blank(40), 120, 255);
        control.set_brightness(7);
        control.set_refresh_rate(90);
        control.set_rotation(Rotation::Rotate270);
        assert_eq!(control.brightness(), 255);

        assert_eq!(producer.take_brightness(), Some(7));
        assert_eq!(producer.take_refresh_rate(), Some(90));
        assert_eq!(producer.take_rotation(), Some(Rotation::Rotate270));
        assert_eq!(producer.take_rotation(), None);

        producer.set_active(90, 7);
        assert_eq!(control.refresh_rate(), 90);
        assert_eq!(control.brightness(), 7);
    }

    #[test]
    fn underrun_flags_are_independent() {
        let mut state = RefreshState::<2, 4, 2>::new();
        let (producer, consumer, control) = state.split(TimerPair::blank(40), 120, 255);
        consumer.flag_underrun();
        assert!(producer.take_frame_underrun());
        assert!(!producer.take_frame_underrun());
        assert!(control.take_underrun());
        assert!(!control.take_underrun());
    }
}
