//! Shift-complete interrupt handler.
//!
//! Runs at the higher of the two priorities, once the shift engine has
//! clocked out the last block of a row. It releases that row, points the
//! engines at the next queued row, and pends the row calculator so the freed
//! buffer is refilled.
//!
//! If the queue runs dry the timer engine is parked on the idle pair, which
//! keeps the latch timer running with output blanked, and the handler is
//! marked starved. The row calculator kicks this handler again as soon as it
//! commits a row; a starved handler does not release anything on that kick
//! since nothing was shifted while parked.

use crate::pipeline::{TransferChain, TransferDescriptor};
use crate::state::RowConsumer;

/// Whether rows are being displayed or the engines are parked on the idle pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RefreshStatus {
    Running,
    Starved,
}

pub struct ShiftComplete<'a, A, B, C, P, U, const DEPTH: usize, const WIDTH: usize, const CAP: usize> {
    consumer: RowConsumer<'a, DEPTH, WIDTH, CAP>,
    chain: TransferChain<A, B, C>,
    pend_calculation: P,
    on_underrun: U,
    status: RefreshStatus,
    underruns: u32,
}

impl<'a, A, B, C, P, U, const DEPTH: usize, const WIDTH: usize, const CAP: usize>
    ShiftComplete<'a, A, B, C, P, U, DEPTH, WIDTH, CAP>
where
    A: TransferDescriptor,
    B: TransferDescriptor,
    C: TransferDescriptor,
    P: FnMut(),
    U: FnMut(),
{
    /// `pend_calculation` must request the row calculation handler at its lower
    /// priority. `on_underrun` is called once each time the queue runs dry.
    pub fn new(
        consumer: RowConsumer<'a, DEPTH, WIDTH, CAP>,
        chain: TransferChain<A, B, C>,
        pend_calculation: P,
        on_underrun: U,
    ) -> Self {
        ShiftComplete {
            consumer,
            chain,
            pend_calculation,
            on_underrun,
            status: RefreshStatus::Starved,
            underruns: 0,
        }
    }

    /// Arm the engines, on the first queued row if there is one, or on the
    /// idle pair otherwise.
    pub fn start(&mut self) {
        match self.consumer.next_read_slot() {
            Some(row) => {
                self.chain.point_at(row);
                self.chain.arm();
                self.status = RefreshStatus::Running;
                self.consumer.set_starved(false);
            }
            None => {
                self.chain.arm();
                self.chain.park_idle(self.consumer.idle(), DEPTH);
                self.status = RefreshStatus::Starved;
                self.consumer.set_starved(true);
            }
        }
    }

    /// Handle a shift-complete interrupt, or a recovery kick while starved.
    pub fn on_interrupt(&mut self) {
        self.chain.clear_complete();

        if self.status == RefreshStatus::Running {
            self.consumer.commit_read();
        }

        // The row handed to the chain stays borrowed from the consumer, so
        // nothing can release it until the next interrupt.
        match (self.consumer.next_read_slot(), self.status) {
            (Some(row), RefreshStatus::Running) => {
                self.chain.point_at(row);
                self.chain.arm();
            }
            (Some(row), RefreshStatus::Starved) => {
                self.chain.resume(row);
                self.status = RefreshStatus::Running;
                self.consumer.set_starved(false);
                debug!("row queue refilled, resuming at row {}", row.row());
            }
            (None, RefreshStatus::Running) => {
                self.chain.park_idle(self.consumer.idle(), DEPTH);
                self.status = RefreshStatus::Starved;
                self.consumer.set_starved(true);
                self.consumer.flag_underrun();
                self.underruns = self.underruns.wrapping_add(1);
                (self.on_underrun)();
                warn!("row queue underrun, display blanked");
            }
            (None, RefreshStatus::Starved) => {}
        }

        (self.pend_calculation)();
    }

    pub fn status(&self) -> RefreshStatus {
        self.status
    }

    /// Number of times the queue has run dry since creation.
    pub fn underruns(&self) -> u32 {
        self.underruns
    }

    /// Give the engines back, leaving them in their current state.
    pub fn free(self) -> TransferChain<A, B, C> {
        self.chain
    }
}
