#![no_std]
#![no_main]

use panic_rtt_target as _;
mod dma;
mod gpio;
mod hub75;
mod rcc;
mod tim;

#[rtic::app(device=stm32ral::stm32h7::stm32h743v, dispatchers=[WKUP])]
mod app {
    use crate::{
        dma, gpio, rcc, tim,
        hub75::{self, Engine, Calc, Shift, State, Layer, CAP, DEPTH, HEIGHT, WIDTH},
    };
    use rtt_target::{rtt_init_print, rprintln, rprint};
    use stm32ral::stm32h7::stm32h743v::Interrupt;
    use embedded_graphics::{
        mono_font::{ascii::FONT_6X10, MonoTextStyle},
        pixelcolor::Rgb888,
        prelude::*,
        primitives::{Circle, PrimitiveStyle, Rectangle},
        text::{Baseline, Text},
    };
    use hubrefresh::{
        Control, Destinations, FrameBuf, FrameSwap, RowCalculator, ShiftComplete, TransferChain,
    };

    /// Double-buffered RGB888 frame buffers, drawn by the tick task and read by the
    /// row calculator.
    static mut FBUFS: [FrameBuf<WIDTH, HEIGHT>; 2] = [FrameBuf::new(), FrameBuf::new()];

    /// Hands freshly drawn frame buffers to the refresh layer.
    static SWAP: FrameSwap<WIDTH, HEIGHT> = FrameSwap::new();

    /// Row buffers and queue for the refresh engine, which are read by DMA1 so go in SRAM1.
    ///
    /// NOTE: Despite being set to `new()`, SRAM1 is not initialised by the runtime,
    /// so this starts life uninitialised and is overwritten in `init` before use.
    #[link_section=".sram1.state"]
    static mut STATE: State = State::new();

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        shift: Shift,
        calc: Calc,
        control: Control<'static, CAP>,
        tick_tim: tim::Tim,
    }

    #[init]
    fn init(mut cx: init::Context) -> (Shared, Local, init::Monotonics) {
        rtt_init_print!();
        rprintln!("hubrefresh initialising...");

        // Set up clocks, including PWR voltage scaling and flash wait states.
        rprint!("  RCC...      ");
        let clocks = rcc::setup(cx.device.RCC, cx.device.PWR, cx.device.FLASH);
        rprintln!("OK, sys {}MHz, AHB {}MHz, APB {}MHz", clocks.sys_ck / 1_000_000,
                  clocks.ahb_ck / 1_000_000, clocks.apb_ck / 1_000_000);

        rprint!("  ICACHE...   ");
        cx.core.SCB.enable_icache();
        rprintln!("OK");

        rprint!("  GPIO...     ");
        let pins = gpio::setup(cx.device.GPIOA, cx.device.GPIOC, cx.device.GPIOE);
        rprintln!("OK");

        rprint!("  Config...   ");
        let config = match hub75::CONFIG.validate::<DEPTH, WIDTH, CAP>() {
            Ok(config) => config,
            Err(e) => panic!("Invalid refresh configuration: {:?}", e),
        };
        let idle = config.params.idle_pair();
        rprintln!("OK, {}Hz ({}Hz to {}Hz)", config.refresh_rate,
                  config.params.min_refresh_rate(), config.params.max_refresh_rate());

        rprint!("  TIM...      ");
        // TIM1 is the HUB75 latch timer at 30MHz, generating LAT and nOE and pacing
        //   the timer pair and row address DMA.
        // TIM8 is the HUB75 data clock, writing data bytes at 15MHz for each block.
        // TIM4 is used to generate the 20Hz drawing ticks, prescaled to 10kHz.
        let tim1 = tim::Tim::from_tim1(cx.device.TIM1);
        tim1.setup_latch(clocks.tim_ck / hub75::TIMER_FREQUENCY - 1,
                         config.params.latch_ticks, 1, idle.period, idle.oe);
        let tim8 = tim::Tim::from_tim8(cx.device.TIM8);
        tim8.setup_pixel_clock(clocks.tim_ck / hub75::DATA_FREQUENCY, 2 * WIDTH as u32);
        let tim4 = tim::Tim::from_tim4(cx.device.TIM4);
        tim4.setup_tick(clocks.tim_ck / 10_000, 500);
        rprintln!("OK");

        rprint!("  DMA...      ");
        // ID 47  TIM8_CH1  => DMAMUX 0  => DMA1 stream 0, pixel data
        // ID 15  TIM1_UP   => DMAMUX 1  => DMA1 stream 1, timer pairs
        // ID 13  TIM1_CH3  => DMAMUX 2  => DMA1 stream 2, row address
        let dmamux = dma::DMAMux1::new(cx.device.DMAMUX1);
        dmamux.set(0, 47);
        dmamux.set(1, 15);
        dmamux.set(2, 13);
        let dma1 = dma::DMA::new(cx.device.DMA1);
        let data = Engine::new(dma1.s0, dma::Size::Bits8);
        let timer = Engine::new(dma1.s1, dma::Size::Bits16).with_link(tim8);
        let address = match config.addresses {
            Some(_) => Some(Engine::new(dma1.s2, dma::Size::Bits32)),
            None => None,
        };
        let destinations = Destinations {
            address: pins.hub.bsrr() as usize,
            timer: tim1.dmar() as usize,
            data: pins.hub.odr() as usize,
        };
        let chain = TransferChain::new(address, timer, data, &destinations);
        rprintln!("OK");

        rprint!("  HUB...      ");
        // NOTE(unsafe): STATE is reset here before anything reads it, and from then on
        // NOTE(unsafe): only accessed through the handles split from this reference.
        let state = unsafe {
            STATE = State::new();
            &mut STATE
        };
        let (producer, consumer, control) =
            state.split(idle, config.refresh_rate, config.brightness);
        // NOTE(unsafe): We manage frame buffer swapping through SWAP, with the shared
        // NOTE(unsafe): reference created here being read by the refresh layer until it
        // NOTE(unsafe): picks up a freshly drawn buffer.
        let layer = Layer::new(unsafe { &FBUFS[0] }, &SWAP, DEPTH);
        let mut calc: Calc = RowCalculator::new(producer, &config, layer, kick_shift as fn());
        calc.prime();
        let mut shift: Shift = ShiftComplete::new(
            consumer, chain, pend_row_calc as fn(), on_underrun as fn());
        shift.start();
        tim1.start();
        rprintln!("OK");

        rprintln!("Initialisation complete.");

        // Start timer for 20Hz drawing ticks.
        tim4.start();

        (
            Shared {},

            Local {
                shift,
                calc,
                control,
                tick_tim: tim4,
            },

            init::Monotonics {}
        )
    }

    /// Empty idle handler prevents low-power sleep mode
    /// between interrupts, which takes long enough to resume
    /// from that it can interfere with HUB75 timing.
    #[idle]
    fn idle(_: idle::Context) -> ! {
        loop {}
    }

    /// Re-enter the shift-complete handler to leave the starved state.
    fn kick_shift() {
        rtic::pend(Interrupt::DMA_STR0);
    }

    /// Request row calculation. Requests made while one is queued are merged.
    fn pend_row_calc() {
        let _ = row_calc::spawn();
    }

    /// Show underruns on the LED until the next tick reports them.
    fn on_underrun() {
        gpio::led_on();
    }

    /// HUB75 pixel data DMA completion interrupt.
    ///
    /// Also pended by the row calculator to restart the engines after an underrun.
    #[task(binds=DMA_STR0, priority=5, local=[shift])]
    fn dma_hub75(cx: dma_hub75::Context) {
        cx.local.shift.on_interrupt();
    }

    /// Fill every free row buffer.
    #[task(priority=1, local=[calc])]
    fn row_calc(cx: row_calc::Context) {
        cx.local.calc.on_interrupt();
    }

    /// Drawing 20Hz timer tick.
    ///
    /// Reports refresh events, then draws the next frame into whichever buffer
    /// is not on display and presents it.
    #[task(
        binds=TIM4,
        priority=2,
        local=[control, tick_tim, fbuf_idx: usize = 1, frame: u32 = 0, underruns: u32 = 0],
    )]
    fn tim_tick(cx: tim_tick::Context) {
        cx.local.tick_tim.clear_uif();
        let control = cx.local.control;

        if control.take_underrun() {
            *cx.local.underruns += 1;
            // Rate-limit printing just to avoid spamming rtt console.
            if *cx.local.underruns % 32 == 1 {
                rprintln!("Refresh underrun #{} at {}Hz", *cx.local.underruns,
                          control.refresh_rate());
            }
        } else {
            gpio::led_off();
        }

        if control.take_refresh_rate_lowered() {
            rprintln!("Refresh rate lowered to {}Hz", control.refresh_rate());
        }

        // Fade in over the first 255 ticks.
        if *cx.local.frame < 255 {
            control.set_brightness(*cx.local.frame as u8 + 1);
        }

        // The last presented buffer has not been picked up yet,
        // so the other buffer may still be on display.
        if SWAP.is_pending() {
            return;
        }

        // NOTE(unsafe): Get the frame buffer not currently read by the refresh layer,
        // NOTE(unsafe): we'll draw into it and then present it.
        let fbuf = unsafe { &mut FBUFS[*cx.local.fbuf_idx] };
        draw(fbuf, *cx.local.frame);

        // NOTE(unsafe): Not written again until a later frame has replaced it.
        SWAP.present(unsafe { &FBUFS[*cx.local.fbuf_idx] });

        // Use next framebuffer next time.
        *cx.local.fbuf_idx ^= 1;
        *cx.local.frame = cx.local.frame.wrapping_add(1);
    }

    /// Draw a bordered test scene with a ball bouncing across the panel.
    fn draw(fbuf: &mut FrameBuf<WIDTH, HEIGHT>, frame: u32) {
        fbuf.clear_black();

        let size = Size::new(WIDTH as u32, HEIGHT as u32);
        Rectangle::new(Point::zero(), size)
            .into_styled(PrimitiveStyle::with_stroke(Rgb888::new(0, 0, 160), 1))
            .draw(fbuf).ok();

        let font = MonoTextStyle::new(&FONT_6X10, Rgb888::new(255, 160, 0));
        Text::with_baseline("HUB75", Point::new(17, 3), font, Baseline::Top).draw(fbuf).ok();

        // Bounce back and forth across the lower half.
        let span = WIDTH as u32 - 14;
        let pos = frame % (2 * span);
        let x = if pos < span { pos } else { 2 * span - pos };
        Circle::new(Point::new(x as i32 + 2, 40), 10)
            .into_styled(PrimitiveStyle::with_fill(Rgb888::new(0, 200, 60)))
            .draw(fbuf).ok();
    }
}
