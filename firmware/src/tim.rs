use stm32ral::{modify_reg, write_reg};
use stm32ral::{tim1, tim4, tim8};

/// Generic timer driver.
///
/// This driver does not type-check the provided timer peripheral, and so
/// if used incorrectly may try to enable an output on a timer without one.
pub struct Tim {
    tim: tim1::Instance,
}

macro_rules! impl_tim {
    ($type:ident, $fn:ident) => {
        pub fn $fn(tim: $type::Instance) -> Self {
            // NOTE(unsafe): We'll only transmute various types of timer instance to common TIM1.
            Tim { tim: unsafe { core::mem::transmute(tim) } }
        }
    }
}

impl Tim {
    impl_tim!(tim1, from_tim1);
    impl_tim!(tim4, from_tim4);
    impl_tim!(tim8, from_tim8);

    /// Start the timer running by setting the CEN bit.
    pub fn start(&self) {
        modify_reg!(tim1, self.tim, CR1, CEN: Enabled);
    }

    /// Clear ISR flags.
    pub fn clear_uif(&self) {
        write_reg!(tim1, self.tim, SR, UIF: Clear);
    }

    /// Configure timer as the HUB75 latch timer.
    ///
    /// Each period is one bit-plane block. LAT is driven high on CH2 for the first
    /// `latch` ticks, and nOE on CH1 stays high (blanked) until CCR1. On every update
    /// a DMA burst through DMAR reloads ARR, RCR and CCR1 for the following block,
    /// and TRGO starts the pixel clock. A CC3 match `address` ticks into the block
    /// requests the row address write.
    pub fn setup_latch(&self, psc: u32, latch: u16, address: u16, period: u16, oe: u16) {
        // Ensure timer is disabled, and preload ARR so new periods apply from the next update.
        write_reg!(tim1, self.tim, CR1, CEN: Disabled, ARPE: Enabled);

        // Output the update event on TRGO (MMS=0b010) to trigger the pixel clock timer.
        write_reg!(tim1, self.tim, CR2, MMS: 0b010);

        // Enable DMA requests on update (timer pairs) and CC3 match (row address).
        write_reg!(tim1, self.tim, DIER, UDE: 1, CC3DE: 1);

        // DMA bursts start at ARR (offset 0x2C, word 11) and write three registers:
        // ARR, RCR and CCR1, matching the period/repetition/oe layout of a timer pair.
        write_reg!(tim1, self.tim, DCR, DBA: 11, DBL: 2);

        // In PWM mode 1, CH1 is active while CNT<CCR1, keeping nOE high and the panel
        // dark until the on-time begins, and CH2 is high while CNT<CCR2 for the latch.
        // CCR1 is preloaded so each block's value applies with its period.
        write_reg!(tim1, self.tim, CCMR1, OC1M: PwmMode1, OC1PE: Enabled, CC1S: Output,
                                          OC2M: PwmMode1, CC2S: Output);

        // CH3 has no output and is only used for its DMA request.
        write_reg!(tim1, self.tim, CCMR2, OC3M: Frozen, CC3S: Output);

        // Enable CH1 and CH2 outputs with active-high polarity.
        write_reg!(tim1, self.tim, CCER, CC1P: 0, CC1E: 1, CC2P: 0, CC2E: 1);

        // Prescale timer clock down to the latch timer tick.
        write_reg!(tim1, self.tim, PSC, psc);

        // Load the first block.
        write_reg!(tim1, self.tim, ARR, period as u32);
        write_reg!(tim1, self.tim, RCR, 0);
        write_reg!(tim1, self.tim, CCR1, oe as u32);
        write_reg!(tim1, self.tim, CCR2, latch as u32);
        write_reg!(tim1, self.tim, CCR3, address as u32);

        // Set main-output-enable.
        write_reg!(tim1, self.tim, BDTR, MOE: 1);

        // Generate an update to load the preloaded registers.
        write_reg!(tim1, self.tim, EGR, UG: Update);
    }

    /// Return address of DMAR register, the DMA burst window.
    pub fn dmar(&self) -> u32 {
        &self.tim.DMAR as *const _ as u32
    }

    /// Configure timer as the HUB75 pixel data clock.
    ///
    /// Once triggered by the latch timer's TRGO (ITR0), runs `pulses` periods of
    /// `period` ticks in one-pulse mode, generating a DMA request at each CC1 match.
    /// The repetition counter holds off the update that stops the timer, since with
    /// RCR set only the final overflow produces an update event.
    pub fn setup_pixel_clock(&self, period: u32, pulses: u32) {
        // Ensure timer is disabled and enable one-pulse mode.
        write_reg!(tim1, self.tim, CR1, CEN: Disabled, OPM: Enabled);
        write_reg!(tim1, self.tim, CR2, 0);

        // Select ITR0 as trigger input, leaving slave mode off until linked.
        write_reg!(tim1, self.tim, SMCR, TS: 0, SMS: 0);

        // Enable DMA requests on CC1 match.
        write_reg!(tim1, self.tim, DIER, CC1DE: 1);

        // CH1 has no output and is only used for its DMA request.
        write_reg!(tim1, self.tim, CCMR1, OC1M: Frozen, CC1S: Output);

        // Don't prescale, run timer at full timer clock.
        write_reg!(tim1, self.tim, PSC, 0);

        // Set period per data write, with the request halfway through.
        write_reg!(tim1, self.tim, ARR, period - 1);
        write_reg!(tim1, self.tim, CCR1, period / 2);

        // Number of periods to run per trigger.
        write_reg!(tim1, self.tim, RCR, pulses - 1);

        // Generate an update to load the repetition counter, then drop the flag.
        write_reg!(tim1, self.tim, EGR, UG: Update);
        write_reg!(tim1, self.tim, SR, 0);
    }

    /// Enable or disable starting this timer from its trigger input.
    pub fn set_triggered(&self, enabled: bool) {
        // SMS=0b110 is trigger mode.
        let sms = if enabled { 0b110 } else { 0 };
        modify_reg!(tim1, self.tim, SMCR, SMS: sms);
    }

    /// Configure timer for drawing tick generation.
    ///
    /// Enables interrupt generation.
    pub fn setup_tick(&self, psc: u32, period: u32) {
        // Ensure timer is disabled.
        write_reg!(tim1, self.tim, CR1, CEN: Disabled);
        write_reg!(tim1, self.tim, CR2, 0);

        // Enable interrupt on update.
        write_reg!(tim1, self.tim, DIER, UIE: Enabled);

        // Prescale by provided prescaler.
        write_reg!(tim1, self.tim, PSC, psc);

        // Set ARR to provided period.
        write_reg!(tim1, self.tim, ARR, period - 1);
    }
}
