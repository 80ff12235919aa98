use std::cell::Cell;
use std::rc::Rc;

use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{Circle, PrimitiveStyle, Rectangle, Triangle},
    text::{Baseline, Text},
};
use embedded_graphics_simulator::{OutputSettings, SimulatorDisplay};
use hubrefresh::{
    AddressPair, DataPins, Destinations, FrameBuf, FrameBufLayer, FrameSwap, PanelConfig,
    RefreshConfig, RefreshState, RefreshStatus, RowCalculator, ShiftComplete, Source,
    TimerConfig, TimerPair, TransferChain, TransferDescriptor,
};

const DEPTH: usize = 8;
const WIDTH: usize = 64;
const HEIGHT: usize = 64;
const CAP: usize = 4;
const ROWS: usize = HEIGHT / 2;
const ADDRESS_PINS: &[u8] = &[5, 6, 7, 8, 9];

/// Frames to integrate into the output image.
const FRAMES: usize = 24;
/// Rows between injected underruns.
const UNDERRUN_EVERY: usize = 200;

const CONFIG: RefreshConfig = RefreshConfig {
    panel: PanelConfig {
        rows_per_frame: ROWS as u16,
        address_pins: ADDRESS_PINS,
        data_pins: DataPins::new(),
    },
    timer: TimerConfig { transfer_ns_per_32: 4_300, ..TimerConfig::new(30_000_000) },
    refresh_rate: 120,
    brightness: 255,
    lower_rate_on_underrun: true,
};

/// GPIOE BSRR, TIM1 DMAR and GPIOC ODR, as on the firmware's target.
const DESTINATIONS: Destinations = Destinations {
    address: 0x5802_1018,
    timer: 0x4001_004C,
    data: 0x5802_0814,
};

/// A transfer engine which only records its source, for the virtual panel to read.
#[derive(Clone, Default)]
struct SimEngine(Rc<Cell<Option<Source>>>);

impl SimEngine {
    /// All bytes one pass over the current source reads.
    fn read(&self) -> Vec<u8> {
        let src = match self.0.get() {
            Some(src) => src,
            None => return Vec::new(),
        };
        let mut out = Vec::with_capacity(src.len * src.count);
        for i in 0..src.count {
            let offset = if src.increment { i * src.len } else { 0 };
            // NOTE(unsafe): Sources only ever point into the leaked refresh state,
            // NOTE(unsafe): which lives for the rest of the program.
            out.extend_from_slice(unsafe {
                std::slice::from_raw_parts((src.addr + offset) as *const u8, src.len)
            });
        }
        out
    }

    fn timer_pairs(&self) -> Vec<TimerPair> {
        self.read()
            .chunks_exact(6)
            .map(|c| TimerPair {
                period: u16::from_ne_bytes([c[0], c[1]]),
                repetition: u16::from_ne_bytes([c[2], c[3]]),
                oe: u16::from_ne_bytes([c[4], c[5]]),
            })
            .collect()
    }

    fn address_pairs(&self) -> Vec<AddressPair> {
        self.read()
            .chunks_exact(4)
            .map(|c| AddressPair {
                set: u16::from_ne_bytes([c[0], c[1]]),
                clear: u16::from_ne_bytes([c[2], c[3]]),
            })
            .collect()
    }
}

impl TransferDescriptor for SimEngine {
    fn set_source(&mut self, source: Source) {
        self.0.set(Some(source));
    }

    fn set_destination(&mut self, _addr: usize) {}

    fn arm(&mut self) {}

    fn link_next(&mut self, _enabled: bool) {}

    fn on_complete(&mut self, _interrupt: bool) {}

    fn clear_complete(&mut self) {}
}

/// Accumulates how long each LED is lit, which is what the eye sees of BCM.
struct Panel {
    pins: DataPins,
    port: u16,
    lit: Vec<[u64; 3]>,
    ticks: u64,
    dark_ticks: u64,
}

impl Panel {
    fn new(pins: DataPins) -> Self {
        Panel { pins, port: 0, lit: vec![[0; 3]; WIDTH * HEIGHT], ticks: 0, dark_ticks: 0 }
    }

    /// Run every block of the row the engines point at.
    fn show_row(&mut self, address: &SimEngine, timer: &SimEngine, data: &SimEngine) {
        let addresses = address.address_pairs();
        let bytes = data.read();
        let pins = self.pins;
        let channels = [(pins.r1, pins.r2), (pins.g1, pins.g2), (pins.b1, pins.b2)];

        for (plane, pair) in timer.timer_pairs().iter().enumerate() {
            if let Some(a) = addresses.get(plane) {
                self.port = a.apply(self.port);
            }
            let row = self.row();
            let on = u64::from(pair.on_time());
            self.ticks += u64::from(pair.period);

            let columns = &bytes[plane * 2 * WIDTH..(plane + 1) * 2 * WIDTH];
            for (x, column) in columns.chunks_exact(2).enumerate() {
                let byte = column[0];
                for (c, (upper, lower)) in channels.iter().enumerate() {
                    if (byte >> upper) & 1 == 1 {
                        self.lit[row * WIDTH + x][c] += on;
                    }
                    if (byte >> lower) & 1 == 1 {
                        self.lit[(row + ROWS) * WIDTH + x][c] += on;
                    }
                }
            }
        }
    }

    /// Run the blanking blocks the timer engine loops on while parked.
    fn idle(&mut self, timer: &SimEngine) {
        let ticks: u64 = timer.timer_pairs().iter().map(|p| u64::from(p.period)).sum();
        self.ticks += ticks;
        self.dark_ticks += ticks;
    }

    /// Scan row currently selected on the address lines.
    fn row(&self) -> usize {
        ADDRESS_PINS.iter().enumerate()
            .map(|(bit, pin)| usize::from((self.port >> pin) & 1) << bit)
            .sum()
    }

    /// Draw average light output, with the brightest LED at full scale.
    fn render(&self, display: &mut SimulatorDisplay<Rgb888>) {
        let max = self.lit.iter().flat_map(|p| p.iter()).copied().max().unwrap_or(0).max(1);
        for (i, lit) in self.lit.iter().enumerate() {
            // Undo the layer's gamma so the image looks like the panel does.
            let [r, g, b] = lit.map(|v| ((v as f64 / max as f64).powf(1.0 / 2.2) * 255.0) as u8);
            let point = Point::new((i % WIDTH) as i32, (i / WIDTH) as i32);
            Pixel(point, Rgb888::new(r, g, b)).draw(display).ok();
        }
    }
}

/// Draw the test scene: colour ramps to show every bit-plane, and some shapes.
fn draw_scene(fbuf: &mut FrameBuf<WIDTH, HEIGHT>) {
    fbuf.clear_black();

    Rectangle::new(Point::zero(), Size::new(WIDTH as u32, HEIGHT as u32))
        .into_styled(PrimitiveStyle::with_stroke(Rgb888::new(0, 0, 160), 1))
        .draw(fbuf).ok();

    let font = MonoTextStyle::new(&FONT_6X10, Rgb888::new(255, 160, 0));
    Text::with_baseline("HUB75", Point::new(17, 3), font, Baseline::Top).draw(fbuf).ok();

    Circle::new(Point::new(6, 16), 20)
        .into_styled(PrimitiveStyle::with_fill(Rgb888::new(0, 200, 60)))
        .draw(fbuf).ok();
    Triangle::new(Point::new(36, 35), Point::new(57, 35), Point::new(46, 16))
        .into_styled(PrimitiveStyle::with_fill(Rgb888::new(200, 0, 120)))
        .draw(fbuf).ok();

    for x in 1..WIDTH - 1 {
        let level = (x * 255 / (WIDTH - 2)) as u8;
        for y in 44..52 {
            fbuf.set(x, y, [level, 0, 0]);
        }
        for y in 52..HEIGHT - 1 {
            fbuf.set(x, y, [level, level, level]);
        }
    }
}

pub fn main() {
    let path = std::env::args().nth(1).unwrap_or_else(|| "panel.png".to_string());

    let config = CONFIG.validate::<DEPTH, WIDTH, CAP>().expect("Invalid refresh configuration");
    println!("Refresh rate {}Hz, valid from {}Hz to {}Hz",
             config.refresh_rate, config.params.min_refresh_rate(), config.params.max_refresh_rate());

    let scene: &'static mut FrameBuf<WIDTH, HEIGHT> = Box::leak(Box::new(FrameBuf::new()));
    draw_scene(scene);
    let scene: &'static FrameBuf<WIDTH, HEIGHT> = scene;
    let blank: &'static FrameBuf<WIDTH, HEIGHT> = Box::leak(Box::new(FrameBuf::new()));
    let swap: &'static FrameSwap<WIDTH, HEIGHT> = Box::leak(Box::new(FrameSwap::new()));
    swap.present(scene);

    let state = Box::leak(Box::new(RefreshState::<DEPTH, WIDTH, CAP>::new()));
    let (producer, consumer, control) =
        state.split(config.params.idle_pair(), config.refresh_rate, config.brightness);

    let calc_pending = Rc::new(Cell::new(false));
    let kick_pending = Rc::new(Cell::new(false));
    let kick = {
        let kick_pending = kick_pending.clone();
        move || kick_pending.set(true)
    };
    let pend = {
        let calc_pending = calc_pending.clone();
        move || calc_pending.set(true)
    };

    let layer = FrameBufLayer::new(blank, swap, DEPTH);
    let mut calc = RowCalculator::new(producer, &config, layer, kick);
    calc.prime();

    let (address, timer, data) = (SimEngine::default(), SimEngine::default(), SimEngine::default());
    let chain = TransferChain::new(Some(address.clone()), timer.clone(), data.clone(), &DESTINATIONS);
    let mut shift = ShiftComplete::new(consumer, chain, pend, || println!("  underrun"));
    shift.start();

    let mut panel = Panel::new(config.data_pins);
    let mut stall = 0;
    for n in 0..ROWS * FRAMES {
        // Hold off row calculation long enough to drain the queue.
        if n % UNDERRUN_EVERY == UNDERRUN_EVERY / 2 {
            stall = CAP + 2;
        }

        match shift.status() {
            RefreshStatus::Running => {
                panel.show_row(&address, &timer, &data);
                shift.on_interrupt();
            }
            RefreshStatus::Starved => panel.idle(&timer),
        }

        if stall > 0 {
            stall -= 1;
        } else if calc_pending.replace(false) {
            calc.on_interrupt();
        }
        if kick_pending.replace(false) {
            shift.on_interrupt();
        }

        if n % ROWS == ROWS - 1 && control.take_refresh_rate_lowered() {
            println!("  refresh rate lowered to {}Hz", control.refresh_rate());
        }
    }

    println!("Simulated {} frames: {} underruns, {:.1}% of time blanked while starved",
             FRAMES, shift.underruns(), 100.0 * panel.dark_ticks as f64 / panel.ticks.max(1) as f64);
    if control.take_underrun() {
        println!("Refresh rate now {}Hz", control.refresh_rate());
    }

    let mut display = SimulatorDisplay::new(Size::new(WIDTH as u32, HEIGHT as u32));
    panel.render(&mut display);
    let settings = OutputSettings { scale: 8, pixel_spacing: 2, ..Default::default() };
    display.to_rgb_output_image(&settings).save_png(&path).expect("Error writing image");
    println!("Wrote {}", path);
}
