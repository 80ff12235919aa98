use stm32ral::{dma, dmamux1, write_reg, read_reg, modify_reg};

/// Driver for the DMAMUX1 peripheral.
pub struct DMAMux1 {
    dmamux1: dmamux1::Instance,
}

impl DMAMux1 {
    /// Create a new DMAMux1 driver.
    pub fn new(dmamux1: dmamux1::Instance) -> Self {
        Self { dmamux1 }
    }

    /// Configures the requested channel, which must be in 0..15, to mux the
    /// requested DMAREQ ID.
    ///
    /// Does not enable or support synchronisation or event generation.
    pub fn set(&self, channel: u32, id: u32) {
        match channel {
            0 => write_reg!(dmamux1, self.dmamux1, CCR0, DMAREQ_ID: id),
            1 => write_reg!(dmamux1, self.dmamux1, CCR1, DMAREQ_ID: id),
            2 => write_reg!(dmamux1, self.dmamux1, CCR2, DMAREQ_ID: id),
            3 => write_reg!(dmamux1, self.dmamux1, CCR3, DMAREQ_ID: id),
            4 => write_reg!(dmamux1, self.dmamux1, CCR4, DMAREQ_ID: id),
            5 => write_reg!(dmamux1, self.dmamux1, CCR5, DMAREQ_ID: id),
            6 => write_reg!(dmamux1, self.dmamux1, CCR6, DMAREQ_ID: id),
            7 => write_reg!(dmamux1, self.dmamux1, CCR7, DMAREQ_ID: id),
            8 => write_reg!(dmamux1, self.dmamux1, CCR8, DMAREQ_ID: id),
            9 => write_reg!(dmamux1, self.dmamux1, CCR9, DMAREQ_ID: id),
            10 => write_reg!(dmamux1, self.dmamux1, CCR10, DMAREQ_ID: id),
            11 => write_reg!(dmamux1, self.dmamux1, CCR11, DMAREQ_ID: id),
            12 => write_reg!(dmamux1, self.dmamux1, CCR12, DMAREQ_ID: id),
            13 => write_reg!(dmamux1, self.dmamux1, CCR13, DMAREQ_ID: id),
            14 => write_reg!(dmamux1, self.dmamux1, CCR14, DMAREQ_ID: id),
            15 => write_reg!(dmamux1, self.dmamux1, CCR15, DMAREQ_ID: id),
            _ => panic!("Unknown DMAMUX1 channel {}", channel),
        }
    }
}

/// Safe construction of all 8 streams in a DMA peripheral.
pub struct DMA {
    pub s0: DMAStream,
    pub s1: DMAStream,
    pub s2: DMAStream,
    pub s3: DMAStream,
    pub s4: DMAStream,
    pub s5: DMAStream,
    pub s6: DMAStream,
    pub s7: DMAStream,
}

impl DMA {
    /// Create the set of streams for a DMA peripheral, consuming it in the process.
    pub fn new(dma: dma::Instance) -> Self {
        // NOTE(unsafe): We just have to ensure only one DMAStream instance
        // NOTE(unsafe): is created for each DMA stream.
        unsafe {
            Self {
                s0: DMAStream::new(&dma, 0),
                s1: DMAStream::new(&dma, 1),
                s2: DMAStream::new(&dma, 2),
                s3: DMAStream::new(&dma, 3),
                s4: DMAStream::new(&dma, 4),
                s5: DMAStream::new(&dma, 5),
                s6: DMAStream::new(&dma, 6),
                s7: DMAStream::new(&dma, 7),
            }
        }
    }
}

/// Width of each transfer, used for both memory and peripheral sides.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Size {
    Bits8,
    Bits16,
    Bits32,
}

impl Size {
    /// Number of bytes moved per transfer.
    pub fn bytes(self) -> usize {
        match self {
            Size::Bits8 => 1,
            Size::Bits16 => 2,
            Size::Bits32 => 4,
        }
    }

    /// Value of the MSIZE and PSIZE fields.
    fn field(self) -> u32 {
        match self {
            Size::Bits8 => 0b00,
            Size::Bits16 => 0b01,
            Size::Bits32 => 0b10,
        }
    }
}

/// Driver for controlling a DMA stream.
pub struct DMAStream {
    dma: dma::Instance,
    stream: usize,
}

impl DMAStream {
    /// Create a new DMAStream for the provided dma instance and stream number.
    ///
    /// # Safety
    /// Must only create one instance per stream.
    pub unsafe fn new(dma: &dma::Instance, stream: usize) -> DMAStream {
        // NOTE(unsafe): Make a copy of `dma` which we will only modify
        // NOTE(unsafe): in ways relating exclusively to our stream.
        let dma = core::mem::transmute_copy(dma);
        DMAStream { dma, stream }
    }

    /// Set up this stream for transmit (memory-to-peripheral) operation.
    ///
    /// Configures `size` reads and writes in direct mode, without the FIFO,
    /// so each request moves exactly one item. Transfer-complete interrupts
    /// start disabled.
    pub fn setup_tx(&self, size: Size) {
        let stream = self.stream();
        self.stop();
        let size = size.field();
        write_reg!(dma, stream, CR0,
            MBURST: Single, PBURST: Single, MSIZE: size, PSIZE: size,
            MINC: Incremented, PINC: Fixed, PL: VeryHigh,
            DIR: MemoryToPeripheral, TCIE: Disabled, EN: Disabled);
        write_reg!(dma, stream, FCR0, FEIE: Disabled, DMDIS: 0);
    }

    /// Set the peripheral register address written to.
    pub fn set_par(&self, par0: u32) {
        let stream = self.stream();
        write_reg!(dma, stream, PAR0, par0);
    }

    /// Enable or disable the transfer-complete interrupt.
    pub fn set_tcie(&self, enabled: bool) {
        let stream = self.stream();
        modify_reg!(dma, stream, CR0, TCIE: enabled as u32);
    }

    /// Start this stream reading `ndtr` items from `m0ar`.
    ///
    /// In circular mode the same items are read again forever until the stream
    /// is restarted, otherwise the stream stops after `ndtr` requests.
    /// Any transfer still running is cancelled first.
    pub fn start(&self, m0ar: u32, ndtr: u32, circular: bool) {
        self.stop();
        self.clear_flags();
        let stream = self.stream();
        write_reg!(dma, stream, M0AR0, m0ar);
        write_reg!(dma, stream, NDTR0, ndtr);
        modify_reg!(dma, stream, CR0, CIRC: circular as u32, EN: Enabled);
    }

    /// Cancel any ongoing DMA transfer.
    pub fn stop(&self) {
        let stream = self.stream();
        modify_reg!(dma, stream, CR0, EN: Disabled);
        while read_reg!(dma, stream, CR0, EN != Disabled) {}
    }

    /// Clear transfer-complete flag for this stream.
    pub fn clear_tcif(&self) {
        match self.stream {
            0 => write_reg!(dma, self.dma, LIFCR, CTCIF0: Clear),
            1 => write_reg!(dma, self.dma, LIFCR, CTCIF1: Clear),
            2 => write_reg!(dma, self.dma, LIFCR, CTCIF2: Clear),
            3 => write_reg!(dma, self.dma, LIFCR, CTCIF3: Clear),
            4 => write_reg!(dma, self.dma, HIFCR, CTCIF4: Clear),
            5 => write_reg!(dma, self.dma, HIFCR, CTCIF5: Clear),
            6 => write_reg!(dma, self.dma, HIFCR, CTCIF6: Clear),
            7 => write_reg!(dma, self.dma, HIFCR, CTCIF7: Clear),
            _ => unreachable!(),
        }
    }

    /// Clear all flags for this stream.
    pub fn clear_flags(&self) {
        match self.stream {
            0 => write_reg!(dma, self.dma, LIFCR, 0x0000_003D),
            1 => write_reg!(dma, self.dma, LIFCR, 0x0000_0F40),
            2 => write_reg!(dma, self.dma, LIFCR, 0x003D_0000),
            3 => write_reg!(dma, self.dma, LIFCR, 0x0F40_0000),
            4 => write_reg!(dma, self.dma, HIFCR, 0x0000_003D),
            5 => write_reg!(dma, self.dma, HIFCR, 0x0000_0F40),
            6 => write_reg!(dma, self.dma, HIFCR, 0x003D_0000),
            7 => write_reg!(dma, self.dma, HIFCR, 0x0F40_0000),
            _ => unreachable!(),
        }
    }

    /// Return a special dma::Instance where the 0th stream register
    /// maps to our specific stream.
    ///
    /// Do not access LISR/HISR/LIFCR/HIFCR through this instance!
    fn stream(&self) -> dma::Instance {
        let ptr = &*self.dma as *const _ as *const u32;
        unsafe { core::mem::transmute(ptr.offset(6 * self.stream as isize)) }
    }
}
