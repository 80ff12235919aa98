use stm32ral::{gpio, write_reg};

type Gpio = gpio::Instance;

/// HUB75 interface.
///
/// Provides the register addresses the refresh DMA streams write to.
/// All other HUB75 signals are driven by timer outputs.
pub struct Hub {
    addr_bsrr: u32,
    data_odr: u32,
}

impl Hub {
    /// Get the address of the bit set/reset register for address lines A-E.
    pub fn bsrr(&self) -> u32 {
        self.addr_bsrr
    }

    /// Get the address of the data register to DMA into for
    /// R1, G1, B1, R2, G2, B2, CLK signals.
    pub fn odr(&self) -> u32 {
        self.data_odr
    }
}

/// Pins container.
///
/// Contains the results of setting up the GPIOs.
#[allow(clippy::manual_non_exhaustive)]
pub struct Pins {
    pub hub: Hub,
    _private: (),
}

pub fn setup(gpioa: Gpio, gpioc: Gpio, gpioe: Gpio) -> Pins {
    // GPIOA
    // PA0-7: Unused
    // PA8: AF1, TIM1_CH1, HUB_OE
    // PA9: AF1, TIM1_CH2, HUB_LAT
    // PA10-12: Unused
    // PA13: AF0 SWDIO pulled up
    // PA14: AF0 SWCLK pulled down
    // PA15: Unused.
    // Start with OE high so the panel is dark before TIM1 takes over.
    write_reg!(gpio, gpioa, ODR, ODR8: 1);
    write_reg!(gpio, gpioa, MODER, MODER8: Alternate, MODER9: Alternate,
                                   MODER13: Alternate, MODER14: Alternate);
    write_reg!(gpio, gpioa, OSPEEDR, OSPEEDR8: MediumSpeed, OSPEEDR9: MediumSpeed);
    write_reg!(gpio, gpioa, PUPDR, PUPDR8: PullUp, PUPDR13: PullUp, PUPDR14: PullDown);
    write_reg!(gpio, gpioa, AFRH, AFR8: 1, AFR9: 1, AFR13: 0, AFR14: 0);

    // GPIOC
    // PC0: Output, HUB_R1
    // PC1: Output, HUB_G1
    // PC2: Output, HUB_B1
    // PC3: Output, HUB_R2
    // PC4: Output, HUB_G2
    // PC5: Output, HUB_B2
    // PC6: Output, HUB_CLK
    // PC7-PC15: Unused
    // HUB pins need to be medium speed <=60MHz.
    // The clock is part of the data written by DMA, each column written twice
    // with CLK low then high, so all seven lines change together.
    write_reg!(gpio, gpioc, ODR, 0);
    write_reg!(gpio, gpioc, MODER, MODER0: Output, MODER1: Output, MODER2: Output, MODER3: Output,
                                   MODER4: Output, MODER5: Output, MODER6: Output);
    write_reg!(gpio, gpioc, OSPEEDR, OSPEEDR0: MediumSpeed, OSPEEDR1: MediumSpeed,
                                     OSPEEDR2: MediumSpeed, OSPEEDR3: MediumSpeed,
                                     OSPEEDR4: MediumSpeed, OSPEEDR5: MediumSpeed,
                                     OSPEEDR6: MediumSpeed);

    // GPIOE
    // PE0-2: Unused
    // PE3: Output, LED
    // PE4: Unused
    // PE5: Output, HUB_A
    // PE6: Output, HUB_B
    // PE7: Output, HUB_C
    // PE8: Output, HUB_D
    // PE9: Output, HUB_E
    // PE10-15: Unused
    write_reg!(gpio, gpioe, ODR, 0);
    write_reg!(gpio, gpioe, MODER, MODER3: Output, MODER5: Output, MODER6: Output,
                                   MODER7: Output, MODER8: Output, MODER9: Output);
    write_reg!(gpio, gpioe, OSPEEDR, OSPEEDR3: LowSpeed,
                                     OSPEEDR5: MediumSpeed, OSPEEDR6: MediumSpeed,
                                     OSPEEDR7: MediumSpeed, OSPEEDR8: MediumSpeed,
                                     OSPEEDR9: MediumSpeed);

    let hub = Hub {
        addr_bsrr: &gpioe.BSRR as *const _ as u32,
        data_odr: &gpioc.ODR as *const _ as u32,
    };

    Pins {
        hub,
        _private: (),
    }
}

/// Force on the onboard LED from any context.
pub fn led_on() {
    // NOTE(unsafe): Atomic write-only register.
    unsafe {
        write_reg!(gpio, GPIOE, BSRR, BS3: 1);
    }
}

/// Force off the onboard LED from any context.
pub fn led_off() {
    // NOTE(unsafe): Atomic write-only register.
    unsafe {
        write_reg!(gpio, GPIOE, BSRR, BR3: 1);
    }
}
