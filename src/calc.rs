//! Row calculation handler.
//!
//! Runs at the lower of the two priorities, pended by the shift-complete
//! handler after each row. It fills every free row buffer from the layer,
//! in scan order, and applies deferred settings at the start of each frame.

use crate::address::AddressTable;
use crate::config::ValidConfig;
use crate::layer::Layer;
use crate::row::{DataPins, Sample};
use crate::state::RowProducer;
use crate::timing::{TimingParams, TimingTable};

pub struct RowCalculator<'a, L, K, const DEPTH: usize, const WIDTH: usize, const CAP: usize> {
    producer: RowProducer<'a, DEPTH, WIDTH, CAP>,
    layer: L,
    kick: K,
    rows_per_frame: u16,
    pins: DataPins,
    addresses: Option<AddressTable>,
    params: TimingParams,
    timing: TimingTable<DEPTH>,
    refresh_rate: u16,
    brightness: u8,
    lower_rate_on_underrun: bool,
    row: u16,
    sequence: u32,
    upper: [Sample; WIDTH],
    lower: [Sample; WIDTH],
}

impl<'a, L, K, const DEPTH: usize, const WIDTH: usize, const CAP: usize>
    RowCalculator<'a, L, K, DEPTH, WIDTH, CAP>
where
    L: Layer<WIDTH>,
    K: FnMut(),
{
    /// `kick` must trigger the shift-complete handler; it is called after a
    /// row is committed while the shift engine is starved.
    pub fn new(producer: RowProducer<'a, DEPTH, WIDTH, CAP>, config: &ValidConfig, layer: L, kick: K) -> Self {
        let timing = TimingTable::generate(&config.params, config.refresh_rate, config.brightness);
        producer.set_active(config.refresh_rate, config.brightness);
        RowCalculator {
            producer,
            layer,
            kick,
            rows_per_frame: config.rows_per_frame,
            pins: config.data_pins,
            addresses: config.addresses.clone(),
            params: config.params,
            timing,
            refresh_rate: config.refresh_rate,
            brightness: config.brightness,
            lower_rate_on_underrun: config.lower_rate_on_underrun,
            row: 0,
            sequence: 0,
            upper: [[0; 3]; WIDTH],
            lower: [[0; 3]; WIDTH],
        }
    }

    /// Fill the queue before the engines are started.
    pub fn prime(&mut self) {
        while self.calculate_row() {}
        debug!("primed {} rows", self.producer.len());
    }

    /// Handle a row calculation request: fill every free buffer.
    pub fn on_interrupt(&mut self) {
        while self.calculate_row() {}
    }

    /// Calculate and commit the next row if a buffer is free.
    ///
    /// Returns false if the queue was already full.
    pub fn calculate_row(&mut self) -> bool {
        if !self.producer.is_free() {
            return false;
        }
        if self.row == 0 {
            self.begin_frame();
        }

        let row = usize::from(self.row);
        self.layer.fill_row(row, &mut self.upper);
        self.layer.fill_row(row + usize::from(self.rows_per_frame), &mut self.lower);
        let address = self.addresses.as_ref().map(|a| a.get(row)).unwrap_or_default();

        let buf = match self.producer.next_write_slot() {
            Some(buf) => buf,
            None => return false,
        };
        buf.fill_header(self.row, self.sequence, address, &self.timing);
        buf.encode_pixels(&self.pins, &self.upper, &self.lower);
        self.producer.commit_write();

        self.sequence = self.sequence.wrapping_add(1);
        self.row = (self.row + 1) % self.rows_per_frame;

        if self.producer.is_starved() {
            (self.kick)();
        }
        true
    }

    pub fn layer(&self) -> &L {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut L {
        &mut self.layer
    }

    pub fn timing(&self) -> &TimingTable<DEPTH> {
        &self.timing
    }

    pub fn refresh_rate(&self) -> u16 {
        self.refresh_rate
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Scan row the next call to [`calculate_row`](Self::calculate_row) fills.
    pub fn next_row(&self) -> u16 {
        self.row
    }

    fn begin_frame(&mut self) {
        let mut retime = false;

        if let Some(brightness) = self.producer.take_brightness() {
            retime |= brightness != self.brightness;
            self.brightness = brightness;
        }

        let mut rate = self.refresh_rate;
        if let Some(requested) = self.producer.take_refresh_rate() {
            rate = self.params.clamp_refresh_rate(requested);
        }
        if self.producer.take_frame_underrun()
            && self.lower_rate_on_underrun
            && rate > self.params.min_refresh_rate()
        {
            rate -= 1;
            self.producer.flag_refresh_rate_lowered();
            warn!("lowering refresh rate to {} after underrun", rate);
        }
        if rate != self.refresh_rate {
            self.refresh_rate = rate;
            self.layer.on_refresh_rate_changed(rate);
            retime = true;
        }

        if let Some(rotation) = self.producer.take_rotation() {
            self.layer.on_rotation_changed(rotation);
        }

        if retime {
            self.timing = TimingTable::generate(&self.params, self.refresh_rate, self.brightness);
            self.producer.set_active(self.refresh_rate, self.brightness);
            trace!("timing {:?}", self.timing.pairs());
        }

        self.layer.on_frame_start();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PanelConfig, RefreshConfig, TimerConfig};
    use crate::layer::Rotation;
    use crate::state::RefreshState;

    const CONFIG: RefreshConfig = RefreshConfig {
        panel: PanelConfig { rows_per_frame: 4, address_pins: &[0, 1], data_pins: DataPins::new() },
        timer: TimerConfig::new(10_000_000),
        refresh_rate: 200,
        brightness: 255,
        lower_rate_on_underrun: true,
    };

    /// Every pixel in panel row `r` has red level `r`.
    #[derive(Default)]
    struct Stripes {
        frames: u32,
        rates: [u16; 4],
        rate_changes: usize,
        rotation: Option<Rotation>,
    }

    impl Layer<2> for Stripes {
        fn fill_row(&mut self, row: usize, out: &mut [Sample; 2]) {
            *out = [[row as u16, 0, 0]; 2];
        }
        fn on_frame_start(&mut self) {
            self.frames += 1;
        }
        fn on_refresh_rate_changed(&mut self, rate: u16) {
            self.rates[self.rate_changes % 4] = rate;
            self.rate_changes += 1;
        }
        fn on_rotation_changed(&mut self, rotation: Rotation) {
            self.rotation = Some(rotation);
        }
    }

    #[test]
    fn fills_rows_in_scan_order() {
        let config = CONFIG.validate::<4, 2, 3>().unwrap();
        let mut state = RefreshState::<4, 2, 3>::new();
        let (producer, mut consumer, _control) = state.split(config.params.idle_pair(), 200, 255);
        let mut calc = RowCalculator::new(producer, &config, Stripes::default(), || {});

        calc.prime();
        assert_eq!(calc.next_row(), 3);
        assert!(!calc.calculate_row());

        for (seq, row) in [0u16, 1, 2].iter().enumerate() {
            let buf = consumer.next_read_slot().unwrap();
            assert_eq!(buf.row(), *row);
            assert_eq!(buf.sequence(), seq as u32);
            assert_eq!(buf.block(0).address, config.addresses.as_ref().unwrap().get(usize::from(*row)));
            // Upper half red is the row number; lower half red is row + 4.
            let expected = DataPins::new().encode(&[*row, 0, 0], &[*row + 4, 0, 0], 0);
            assert_eq!(buf.block(0).data[1], [expected, expected | 0x40]);
            consumer.commit_read();
        }

        calc.on_interrupt();
        assert_eq!(calc.next_row(), 2);
        let buf = consumer.next_read_slot().unwrap();
        assert_eq!((buf.row(), buf.sequence()), (3, 3));
        assert_eq!(calc.layer().frames, 2);
    }

    #[test]
    fn applies_settings_at_frame_start() {
        let config = CONFIG.validate::<4, 2, 2>().unwrap();
        let mut state = RefreshState::<4, 2, 2>::new();
        let (producer, mut consumer, control) = state.split(config.params.idle_pair(), 200, 255);
        let mut calc = RowCalculator::new(producer, &config, Stripes::default(), || {});
        calc.prime();
        let bright = *calc.timing();

        control.set_brightness(100);
        control.set_refresh_rate(150);
        control.set_rotation(Rotation::Rotate90);

        // Rows 2 and 3 of the current frame keep the old settings.
        for _ in 0..2 {
            consumer.commit_read();
            calc.on_interrupt();
        }
        assert_eq!(calc.brightness(), 255);
        assert_eq!(control.brightness(), 255);

        consumer.commit_read();
        calc.on_interrupt();
        assert_eq!(calc.brightness(), 100);
        assert_eq!(calc.refresh_rate(), 150);
        assert_eq!(control.refresh_rate(), 150);
        assert_eq!(calc.layer().rates[0], 150);
        assert_eq!(calc.layer().rotation, Some(Rotation::Rotate90));
        assert_ne!(*calc.timing(), bright);
        assert_eq!(*calc.timing(), TimingTable::generate(&config.params, 150, 100));
    }

    #[test]
    fn lowers_rate_after_underrun() {
        let config = CONFIG.validate::<4, 2, 2>().unwrap();
        let mut state = RefreshState::<4, 2, 2>::new();
        let (producer, mut consumer, control) = state.split(config.params.idle_pair(), 200, 255);
        let mut calc = RowCalculator::new(producer, &config, Stripes::default(), || {});
        calc.prime();

        consumer.flag_underrun();
        for _ in 0..2 {
            consumer.commit_read();
            calc.on_interrupt();
        }
        assert_eq!(calc.refresh_rate(), 200);
        consumer.commit_read();
        calc.on_interrupt();
        assert_eq!(calc.refresh_rate(), 199);
        assert!(control.take_refresh_rate_lowered());
        assert!(control.take_underrun());
        assert_eq!(calc.layer().rate_changes, 1);
    }

    #[test]
    fn kicks_when_starved() {
        let config = CONFIG.validate::<4, 2, 2>().unwrap();
        let mut state = RefreshState::<4, 2, 2>::new();
        let (producer, mut consumer, _control) = state.split(config.params.idle_pair(), 200, 255);
        let kicks = core::cell::Cell::new(0);
        let mut calc = RowCalculator::new(producer, &config, Stripes::default(),
                                          || kicks.set(kicks.get() + 1));
        calc.prime();
        assert_eq!(kicks.get(), 0);

        consumer.commit_read();
        consumer.set_starved(true);
        calc.on_interrupt();
        assert_eq!(kicks.get(), 1);
    }
}
