//! HUB75 refresh engines on DMA1.
//!
//! Stream 0 shifts pixel data to GPIOC on TIM8 CC1 requests, stream 1 bursts
//! timer pairs into TIM1 through DMAR on each TIM1 update, and stream 2 writes
//! the row address to GPIOE BSRR on TIM1 CC3. Linking the timer pair stream to
//! the data stream is done in hardware by letting TIM1's TRGO start TIM8, which
//! then runs one pixel clock pulse per data byte of a bit-plane.

use hubrefresh::{
    DataPins, FrameBufLayer, PanelConfig, RefreshConfig, RefreshState, RowCalculator,
    ShiftComplete, Source, TimerConfig, TransferDescriptor,
};

use crate::dma::{DMAStream, Size};
use crate::tim::Tim;

/// Bits of colour depth per channel.
pub const DEPTH: usize = 8;
/// Panel columns.
pub const WIDTH: usize = 64;
/// Panel rows, twice the scan rows.
pub const HEIGHT: usize = 64;
/// Row buffers shared between the two handlers.
pub const CAP: usize = 4;

/// Latch timer tick rate, TIM1 prescaled from its 150MHz kernel clock.
pub const TIMER_FREQUENCY: u32 = 30_000_000;
/// Rate data bytes are written to the data port, two per column.
pub const DATA_FREQUENCY: u32 = 15_000_000;

#[cfg(not(feature = "address-on-data-pins"))]
const ADDRESS_PINS: &[u8] = &[5, 6, 7, 8, 9];
#[cfg(feature = "address-on-data-pins")]
const ADDRESS_PINS: &[u8] = &[];

pub const CONFIG: RefreshConfig = RefreshConfig {
    panel: PanelConfig {
        rows_per_frame: 32,
        address_pins: ADDRESS_PINS,
        data_pins: DataPins::new(),
    },
    // At 15MHz, 32 columns take 64 writes or 4.27us.
    timer: TimerConfig { transfer_ns_per_32: 4_300, ..TimerConfig::new(TIMER_FREQUENCY) },
    refresh_rate: 120,
    brightness: 255,
    lower_rate_on_underrun: cfg!(feature = "lower-rate-on-underrun"),
};

pub type State = RefreshState<DEPTH, WIDTH, CAP>;
pub type Layer = FrameBufLayer<WIDTH, HEIGHT>;
pub type Shift = ShiftComplete<'static, Engine, Engine, Engine, fn(), fn(), DEPTH, WIDTH, CAP>;
pub type Calc = RowCalculator<'static, Layer, fn(), DEPTH, WIDTH, CAP>;

/// One DMA stream driven as an engine of the refresh chain.
pub struct Engine {
    stream: DMAStream,
    size: Size,
    source: Option<Source>,
    link: Option<Tim>,
}

impl Engine {
    /// Set up `stream` for `size` transfers to a peripheral.
    pub fn new(stream: DMAStream, size: Size) -> Self {
        stream.setup_tx(size);
        Engine { stream, size, source: None, link: None }
    }

    /// Start `clock` from the latch timer's trigger output while linked.
    pub fn with_link(self, clock: Tim) -> Self {
        Engine { link: Some(clock), ..self }
    }
}

impl TransferDescriptor for Engine {
    fn set_source(&mut self, source: Source) {
        self.source = Some(source);
    }

    fn set_destination(&mut self, addr: usize) {
        self.stream.set_par(addr as u32);
    }

    fn arm(&mut self) {
        if let Some(src) = self.source {
            // A repeated item is looped in circular mode until the next arm.
            let (bytes, circular) = if src.increment {
                (src.len * src.count, false)
            } else {
                (src.len, true)
            };
            self.stream.start(src.addr as u32, (bytes / self.size.bytes()) as u32, circular);
        }
    }

    fn link_next(&mut self, enabled: bool) {
        if let Some(clock) = &self.link {
            clock.set_triggered(enabled);
        }
    }

    fn on_complete(&mut self, interrupt: bool) {
        self.stream.set_tcie(interrupt);
    }

    fn clear_complete(&mut self) {
        self.stream.clear_tcif();
    }
}
