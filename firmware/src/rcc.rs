use stm32ral::{rcc, pwr, flash, read_reg, write_reg, modify_reg};

/// Frequencies for each clock in the system, in Hz.
#[derive(Copy, Clone, Debug)]
pub struct Clocks {
    pub sys_ck: u32,
    pub ahb_ck: u32,
    pub apb_ck: u32,
    pub tim_ck: u32,
}

/// Configure device clocks.
///
/// Uses a 25MHz HSE crystal oscillator.
pub fn setup(rcc: rcc::Instance, pwr: pwr::Instance, flash: flash::Instance) -> Clocks {
    // Initialise power control.
    write_reg!(pwr, pwr, CR3, SCUEN: 1, LDOEN: 1, BYPASS: 0);
    while read_reg!(pwr, pwr, CSR1, ACTVOSRDY == 0) {}

    // Set VOS to Scale 2, where f_cpu max 300MHz, f_hclk max 150MHz, f_pclk max 75MHz.
    // Note: scale 3 is 0b01, scale 2 is 0b10, scale 1 is 0b11.
    write_reg!(pwr, pwr, D3CR, VOS: 0b10);
    while read_reg!(pwr, pwr, D3CR, VOSRDY == 0) {}

    // Set flash wait states.
    // For VOS2 and hclk=150MHz, use WS=2.
    write_reg!(flash, flash, ACR, WRHIGHFREQ: 0b01, LATENCY: 2);

    // Return to HSI with the PLL off in case of a soft reset.
    write_reg!(rcc, rcc, CR, HSION: On, HSEON: Off, PLL1ON: Off);
    while read_reg!(rcc, rcc, CR, HSIRDY != Ready) {}
    while read_reg!(rcc, rcc, CR, HSIDIVF != Propagated) {}
    write_reg!(rcc, rcc, CFGR, SW: HSI);
    while read_reg!(rcc, rcc, CFGR, SWS != HSI) {}

    // Enable HSE.
    modify_reg!(rcc, rcc, CR, HSEON: On);
    while read_reg!(rcc, rcc, CR, HSERDY != Ready) {}

    // Configure and enable PLL1.
    // Input is 25M hse_ck, DIVM=25 to give ref1_ck=1MHz.
    // DIVN1=300 for vco1ck=300M, DIVP1=0 for pll1_p_ck=300M.
    write_reg!(rcc, rcc, PLLCKSELR, PLLSRC: HSE, DIVM1: 25);
    write_reg!(rcc, rcc, PLLCFGR, DIVP1EN: Enabled, PLL1RGE: Range1, PLL1VCOSEL: MediumVCO);
    write_reg!(rcc, rcc, PLL1DIVR, DIVP1: 0, DIVN1: 300 - 1);
    modify_reg!(rcc, rcc, CR, PLL1ON: On);
    while read_reg!(rcc, rcc, CR, PLL1RDY != Ready) {}

    // Configure clock dividers.
    // D1CPRE=/1 -> d1_ck = sys_ck = 300MHz
    //   HPRE=/2 -> rcc_hclk3 = rcc_aclk = sys_d1cpre_ck/2 = 150MHz
    // D1PPRE=/2 -> rcc_pclk3 = rcc_hclk3/2 = 75MHz
    write_reg!(rcc, rcc, D1CFGR, D1CPRE: Div1, HPRE: Div2, D1PPRE: Div2);
    // D2PPRE1=/2 -> rcc_pclk1 = rcc_hclk1 / 2 = 75MHz, timers on APB1 at 150MHz
    // D2PPRE2=/2 -> rcc_pclk2 = rcc_hclk1 / 2 = 75MHz, timers on APB2 at 150MHz
    write_reg!(rcc, rcc, D2CFGR, D2PPRE1: Div2, D2PPRE2: Div2);
    // D3PPRE=/2 -> rcc_pclk4 = rcc_hclk4 / 2 = 75MHz
    write_reg!(rcc, rcc, D3CFGR, D3PPRE: Div2);

    // Swap system clock source to PLL1.
    modify_reg!(rcc, rcc, CFGR, SW: PLL1);
    while read_reg!(rcc, rcc, CFGR, SWS != PLL1) {}

    // Enable AHB peripherals: DMA1, SRAM1, GPIOs.
    // DMAMUX1 is clocked along with DMA1.
    write_reg!(rcc, rcc, AHB1ENR, DMA1EN: Enabled);
    write_reg!(rcc, rcc, AHB2ENR, SRAM1EN: Enabled);
    write_reg!(rcc, rcc, AHB4ENR, GPIOAEN: Enabled, GPIOCEN: Enabled, GPIOEEN: Enabled);

    // Enable APB1 peripherals: TIM4 for the drawing tick.
    write_reg!(rcc, rcc, APB1LENR, TIM4EN: Enabled);

    // Enable APB2 peripherals: TIM1 latch timer, TIM8 pixel clock.
    write_reg!(rcc, rcc, APB2ENR, TIM1EN: Enabled, TIM8EN: Enabled);

    // Return generated clock frequencies for easy reference elsewhere.
    Clocks {
        sys_ck: 300_000_000,
        ahb_ck: 150_000_000,
        apb_ck: 75_000_000,
        tim_ck: 150_000_000,
    }
}
