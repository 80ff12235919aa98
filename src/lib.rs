//! Interrupt-driven refresh engine for HUB75 scan-multiplexed RGB LED panels.
//!
//! Rows are calculated into a small pool of [`RowBuffer`]s by a low-priority
//! [`RowCalculator`], and replayed onto the panel by three chained transfer
//! engines ([`TransferChain`]) with binary-coded modulation timing. A
//! high-priority [`ShiftComplete`] handler advances the engines after each
//! row and parks them on a blanking idle pair if the calculator falls behind.
//!
//! Start-up sequence:
//!
//! 1. Validate a [`RefreshConfig`] for the engine dimensions.
//! 2. [`RefreshState::split`] a `static` state into producer, consumer and
//!    [`Control`] handles.
//! 3. Create the [`RowCalculator`] and [`prime`](RowCalculator::prime) it.
//! 4. Create the [`ShiftComplete`] handler around a [`TransferChain`] and
//!    [`start`](ShiftComplete::start) it, then start the latch timer.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod address;
pub mod calc;
pub mod config;
pub mod error;
pub mod framebuf;
pub mod layer;
pub mod pipeline;
pub mod queue;
pub mod row;
pub mod shift;
pub mod state;
pub mod timing;

pub use address::{AddressPair, AddressTable};
pub use calc::RowCalculator;
pub use config::{PanelConfig, RefreshConfig, TimerConfig, ValidConfig};
pub use error::{Error, Result};
pub use framebuf::FrameBuf;
pub use layer::{FrameBufLayer, FrameSwap, Layer, Rotation};
pub use pipeline::{Destinations, NoEngine, Source, TransferChain, TransferDescriptor};
pub use queue::RowQueue;
pub use row::{BitPlaneBlock, DataPins, RowBuffer, Sample};
pub use shift::{RefreshStatus, ShiftComplete};
pub use state::{Control, RefreshState, RowConsumer, RowProducer};
pub use timing::{RowBudget, TimerPair, TimingParams, TimingTable};
