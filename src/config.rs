use crate::address::{AddressTable, MAX_ROWS};
use crate::error::{Error, Result};
use crate::row::DataPins;
use crate::timing::TimingParams;

const COUNTER_MAX: u64 = crate::timing::COUNTER_MAX as u64;

/// Most bit-planes the 16-bit sample levels can carry.
pub const MAX_DEPTH: usize = 16;

/// Physical panel wiring.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PanelConfig {
    /// Number of scan rows; the panel is twice this many pixels tall.
    pub rows_per_frame: u16,
    /// Port pin for each address bit, least significant first. Empty when the
    /// panel has no address lines driven by a separate engine.
    pub address_pins: &'static [u8],
    pub data_pins: DataPins,
}

/// Latch timer clock and the panel's worst-case signal timing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimerConfig {
    /// Latch timer tick frequency in Hz.
    pub frequency: u32,
    pub latch_pulse_ns: u32,
    /// Delay after the latch before pixel data may be clocked again.
    pub latch_to_clock_ns: u32,
    /// Longest time taken to shift 32 columns of pixel data.
    pub transfer_ns_per_32: u32,
    /// Ticks the MSB block is shortened by per fitting iteration.
    pub step: u16,
}

impl TimerConfig {
    /// Typical HUB75 timing for a latch timer running at `frequency`.
    pub const fn new(frequency: u32) -> Self {
        TimerConfig {
            frequency,
            latch_pulse_ns: 100,
            latch_to_clock_ns: 400,
            transfer_ns_per_32: 1400,
            step: 10,
        }
    }
}

/// Everything needed to start refreshing a panel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RefreshConfig {
    pub panel: PanelConfig,
    pub timer: TimerConfig,
    /// Initial refresh rate in frames per second, clamped into the valid range.
    pub refresh_rate: u16,
    /// Initial brightness, 255 for full output.
    pub brightness: u8,
    /// Lower the refresh rate by one at the next frame start after an underrun.
    pub lower_rate_on_underrun: bool,
}

/// A configuration checked against the engine dimensions, with derived tables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidConfig {
    pub rows_per_frame: u16,
    pub data_pins: DataPins,
    pub addresses: Option<AddressTable>,
    pub params: TimingParams,
    pub refresh_rate: u16,
    pub brightness: u8,
    pub lower_rate_on_underrun: bool,
}

fn ns_to_ticks(frequency: u32, ns: u64) -> Option<u64> {
    u64::from(frequency).checked_mul(ns).map(|t| t / 1_000_000_000)
}

impl RefreshConfig {
    /// Check this configuration for an engine `DEPTH` planes deep, `WIDTH`
    /// columns wide, with `CAP` row buffers.
    pub fn validate<const DEPTH: usize, const WIDTH: usize, const CAP: usize>(
        &self,
    ) -> Result<ValidConfig> {
        if DEPTH == 0 || DEPTH > MAX_DEPTH {
            return Err(Error::InvalidDepth(DEPTH));
        }
        if WIDTH == 0 {
            return Err(Error::InvalidWidth);
        }
        if CAP < 2 {
            return Err(Error::QueueTooSmall(CAP));
        }

        let rows = self.panel.rows_per_frame;
        if rows == 0 || usize::from(rows) > MAX_ROWS {
            return Err(Error::InvalidRows(rows));
        }
        self.panel.data_pins.validate()?;
        let addresses = if self.panel.address_pins.is_empty() {
            None
        } else {
            Some(AddressTable::new(self.panel.address_pins, rows)?)
        };

        let params = self.timer.params(rows, DEPTH, WIDTH)?;
        let (min, max) = (params.min_refresh_rate(), params.max_refresh_rate());
        if min > max {
            return Err(Error::NoValidRefreshRate { min, max });
        }

        Ok(ValidConfig {
            rows_per_frame: rows,
            data_pins: self.panel.data_pins,
            addresses,
            params,
            refresh_rate: params.clamp_refresh_rate(self.refresh_rate),
            brightness: self.brightness,
            lower_rate_on_underrun: self.lower_rate_on_underrun,
        })
    }
}

impl TimerConfig {
    /// Convert nanosecond timings into ticks for a panel `width` columns wide.
    ///
    /// The minimum block is the time to settle after the latch and shift a
    /// whole line, `latch_to_clock_ns + transfer_ns_per_32 * width / 32`.
    pub fn params(&self, rows_per_frame: u16, depth: usize, width: usize) -> Result<TimingParams> {
        let shift_ns = u64::from(self.transfer_ns_per_32)
            .checked_mul(width as u64)
            .map(|ns| ns / 32)
            .and_then(|ns| ns.checked_add(u64::from(self.latch_to_clock_ns)));
        let min_block = shift_ns.and_then(|ns| ns_to_ticks(self.frequency, ns));
        let latch = ns_to_ticks(self.frequency, u64::from(self.latch_pulse_ns));
        let (min_block, latch) = match (min_block, latch) {
            (Some(m), Some(l)) if m > 0 && m <= COUNTER_MAX && l <= COUNTER_MAX => (m, l),
            _ => return Err(Error::TimerTooSlow),
        };

        Ok(TimingParams {
            timer_frequency: self.frequency,
            rows_per_frame,
            depth,
            latch_ticks: latch as u16,
            min_block_ticks: min_block as u16,
            step: self.step,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: RefreshConfig = RefreshConfig {
        panel: PanelConfig {
            rows_per_frame: 16,
            address_pins: &[8, 9, 10, 11],
            data_pins: DataPins::new(),
        },
        timer: TimerConfig::new(30_000_000),
        refresh_rate: 120,
        brightness: 255,
        lower_rate_on_underrun: false,
    };

    #[test]
    fn derives_ticks() {
        let v = CONFIG.validate::<8, 64, 4>().unwrap();
        assert_eq!(v.params.latch_ticks, 3);
        // (400 + 1400 * 64 / 32) ns at 30MHz
        assert_eq!(v.params.min_block_ticks, 96);
        assert_eq!(v.refresh_rate, 120);
        assert_eq!(v.addresses.as_ref().map(|a| a.len()), Some(16));
    }

    #[test]
    fn min_block_scales_with_width() {
        // (400 + 1400 * 48 / 32) ns at 30MHz, no rounding up to whole chunks.
        let v = CONFIG.validate::<8, 48, 4>().unwrap();
        assert_eq!(v.params.min_block_ticks, 75);
        let narrow = CONFIG.validate::<8, 16, 4>().unwrap();
        assert_eq!(narrow.params.min_block_ticks, 33);
        assert!(narrow.params.max_refresh_rate() > v.params.max_refresh_rate());
    }

    #[test]
    fn clamps_initial_rate() {
        let fast = RefreshConfig { refresh_rate: u16::MAX, ..CONFIG };
        let v = fast.validate::<8, 64, 4>().unwrap();
        assert_eq!(v.refresh_rate, v.params.max_refresh_rate());
    }

    #[test]
    fn no_address_pins() {
        let cfg = RefreshConfig {
            panel: PanelConfig { address_pins: &[], ..CONFIG.panel },
            ..CONFIG
        };
        assert_eq!(cfg.validate::<8, 64, 4>().unwrap().addresses, None);
    }

    #[test]
    fn rejects_dimensions() {
        assert_eq!(CONFIG.validate::<0, 64, 4>(), Err(Error::InvalidDepth(0)));
        assert_eq!(CONFIG.validate::<17, 64, 4>(), Err(Error::InvalidDepth(17)));
        assert_eq!(CONFIG.validate::<8, 0, 4>(), Err(Error::InvalidWidth));
        assert_eq!(CONFIG.validate::<8, 64, 1>(), Err(Error::QueueTooSmall(1)));
    }

    #[test]
    fn rejects_slow_timer() {
        let cfg = RefreshConfig { timer: TimerConfig::new(100_000), ..CONFIG };
        assert_eq!(cfg.validate::<8, 64, 4>(), Err(Error::TimerTooSlow));
    }

    #[test]
    fn rejects_overflowing_timings() {
        let timer = TimerConfig {
            latch_to_clock_ns: u32::MAX,
            transfer_ns_per_32: u32::MAX,
            ..TimerConfig::new(u32::MAX)
        };
        let cfg = RefreshConfig { timer, ..CONFIG };
        assert_eq!(cfg.validate::<8, 64, 4>(), Err(Error::TimerTooSlow));
        assert_eq!(timer.params(16, 8, usize::MAX), Err(Error::TimerTooSlow));
    }

    #[test]
    fn rejects_impossible_rates() {
        // Deep planes with a long shift time leave no rate between the limits.
        let timer = TimerConfig { transfer_ns_per_32: 2_000_000, ..TimerConfig::new(1_000_000) };
        let cfg = RefreshConfig { timer, ..CONFIG };
        assert!(matches!(
            cfg.validate::<16, 64, 4>(),
            Err(Error::NoValidRefreshRate { .. })
        ));
    }
}
