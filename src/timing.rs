//! BCM timing tables.
//!
//! Every scan row is displayed as `DEPTH` consecutive blocks, one per bit-plane.
//! Each block is one period of the latch timer: the latch pulse marks its start,
//! output enable is asserted at the `oe` compare value, and the block ends when
//! the counter reaches `period`. Block `i` lasts roughly twice as long as block
//! `i - 1`, so the least significant plane is lit for the shortest time and the
//! sum over all planes gives `2^DEPTH` grey levels.
//!
//! The table is generated to fit a per-row budget of timer ticks, derived from
//! the target refresh rate, while keeping every block at least as long as it
//! takes to shift a full line of pixel data into the panel.

/// Largest value the latch timer counter can hold.
pub const COUNTER_MAX: u32 = 0xFFFF;

/// Brightness value for full output; the dimming factor is `DIMMING_MAX - brightness`.
pub const DIMMING_MAX: u32 = 255;

/// Period and output-enable compare value for one bit-plane block.
///
/// The output is blanked while the counter is below `oe` and lit from `oe` until
/// `period`. `repetition` is always zero, and sits between the two so that a
/// three-register timer burst (auto-reload, repetition counter, compare) can load
/// a whole pair from one request.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TimerPair {
    pub period: u16,
    pub repetition: u16,
    pub oe: u16,
}

impl TimerPair {
    pub const fn new(period: u16, oe: u16) -> Self {
        TimerPair { period, repetition: 0, oe }
    }

    /// A block which never asserts output enable.
    pub const fn blank(period: u16) -> Self {
        TimerPair::new(period, period)
    }

    /// Number of ticks the output is lit during this block.
    pub fn on_time(&self) -> u16 {
        self.period.saturating_sub(self.oe)
    }
}

/// Tick budget and hardware constraints for a single scan row.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RowBudget {
    /// Timer ticks available for all blocks of one row.
    pub ticks_per_row: u32,
    /// Fixed overhead added to every block for the latch pulse.
    pub latch_ticks: u16,
    /// Shortest block the hardware can shift a line of data within.
    pub min_block_ticks: u16,
    /// Amount the MSB block is shortened by on each fitting iteration.
    pub step: u16,
}

/// Timer-domain parameters derived from a validated configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimingParams {
    pub timer_frequency: u32,
    pub rows_per_frame: u16,
    pub depth: usize,
    pub latch_ticks: u16,
    pub min_block_ticks: u16,
    pub step: u16,
}

impl TimingParams {
    /// Ticks available to each scan row at `refresh_rate` frames per second.
    pub fn ticks_per_row(&self, refresh_rate: u16) -> u32 {
        let rate = u32::from(refresh_rate.max(1));
        self.timer_frequency / (rate * u32::from(self.rows_per_frame))
    }

    /// Slowest refresh rate whose MSB block still fits in the timer counter.
    pub fn min_refresh_rate(&self) -> u16 {
        let rows = u32::from(self.rows_per_frame);
        let mut rate = self.timer_frequency / COUNTER_MAX / rows / 2 + 1;
        // The latch overhead is added on top of the ideal MSB width.
        while rate < u32::from(u16::MAX)
            && self.ticks_per_row(rate as u16) / 2 + u32::from(self.latch_ticks) > COUNTER_MAX
        {
            rate += 1;
        }
        rate.min(u32::from(u16::MAX)) as u16
    }

    /// Fastest refresh rate at which `depth` minimum-width blocks still fit in a row.
    pub fn max_refresh_rate(&self) -> u16 {
        let floor = u32::from(self.min_block_ticks.max(self.latch_ticks)).max(1);
        let depth = self.depth.max(1) as u32;
        let rate = self.timer_frequency / (u32::from(self.rows_per_frame) * depth * floor);
        rate.min(u32::from(u16::MAX)) as u16
    }

    /// Clamp a requested refresh rate into the range the hardware can produce.
    pub fn clamp_refresh_rate(&self, refresh_rate: u16) -> u16 {
        refresh_rate.max(self.min_refresh_rate()).min(self.max_refresh_rate())
    }

    /// Row budget for `refresh_rate`, which should already be clamped.
    pub fn budget(&self, refresh_rate: u16) -> RowBudget {
        RowBudget {
            ticks_per_row: self.ticks_per_row(refresh_rate),
            latch_ticks: self.latch_ticks,
            min_block_ticks: self.min_block_ticks,
            step: self.step,
        }
    }

    /// Timer pair loaded while the row queue is empty: shortest safe block, never lit.
    pub fn idle_pair(&self) -> TimerPair {
        TimerPair::blank(self.min_block_ticks)
    }
}

/// Per-plane timer pairs for one refresh rate and brightness, LSB plane first.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimingTable<const DEPTH: usize> {
    pairs: [TimerPair; DEPTH],
    msb_ticks: u32,
}

impl<const DEPTH: usize> TimingTable<DEPTH> {
    /// Generate the table for `refresh_rate` (clamped to the valid range) and `brightness`.
    pub fn generate(params: &TimingParams, refresh_rate: u16, brightness: u8) -> Self {
        let rate = params.clamp_refresh_rate(refresh_rate);
        Self::fit(&params.budget(rate), brightness)
    }

    /// Fit the blocks into `budget`.
    ///
    /// Starts from an MSB block of half the row and shortens it by `budget.step`
    /// until the sum of all block periods, each clamped up to the minimum block
    /// period, fits within the row.
    ///
    /// The MSB block never starts longer than the counter can time, so budgets
    /// beyond what [`TimingParams`] produces give saturated rather than
    /// wrapped periods.
    pub fn fit(budget: &RowBudget, brightness: u8) -> Self {
        let step = u32::from(budget.step.max(1));
        let longest = COUNTER_MAX - u32::from(budget.latch_ticks);
        let mut msb_ticks = (budget.ticks_per_row / 2).min(longest) + step;
        loop {
            msb_ticks = msb_ticks.saturating_sub(step);
            let used: u64 = (0..DEPTH).map(|i| Self::block_ticks(budget, msb_ticks, i)).sum();
            if used <= u64::from(budget.ticks_per_row) || msb_ticks == 0 {
                break;
            }
        }

        let factor = u64::from(DIMMING_MAX - u32::from(brightness));
        let latch = u64::from(budget.latch_ticks);
        let min_block = u64::from(budget.min_block_ticks);
        let mut pairs = [TimerPair::default(); DEPTH];
        for (i, pair) in pairs.iter_mut().enumerate() {
            let ticks = Self::plane_ticks(msb_ticks, i);
            let mut period = ticks + latch;
            let mut oe = (ticks * factor) / u64::from(DIMMING_MAX) + latch;

            // Pad short blocks up to the minimum, keeping the lit time unchanged.
            if period < min_block {
                let padding = min_block - period;
                period += padding;
                oe += padding;
            }

            *pair = TimerPair::new(saturate(period), saturate(oe));
        }

        TimingTable { pairs, msb_ticks }
    }

    pub fn pairs(&self) -> &[TimerPair; DEPTH] {
        &self.pairs
    }

    /// Unpadded width of the most significant plane after fitting.
    pub fn msb_ticks(&self) -> u32 {
        self.msb_ticks
    }

    /// Sum of all block periods, which is the time one row takes to display.
    pub fn total_ticks(&self) -> u32 {
        self.pairs.iter().map(|p| u32::from(p.period)).sum()
    }

    /// Ideal width of `plane`; planes more than 31 below the MSB round to zero.
    fn plane_ticks(msb_ticks: u32, plane: usize) -> u64 {
        let shift = (DEPTH - 1 - plane).min(32) as u32;
        u64::from(msb_ticks.checked_shr(shift).unwrap_or(0))
    }

    fn block_ticks(budget: &RowBudget, msb_ticks: u32, plane: usize) -> u64 {
        let ticks = Self::plane_ticks(msb_ticks, plane) + u64::from(budget.latch_ticks);
        ticks.max(u64::from(budget.min_block_ticks))
    }
}

fn saturate(ticks: u64) -> u16 {
    ticks.min(u64::from(u16::MAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGET: RowBudget = RowBudget {
        ticks_per_row: 1000, latch_ticks: 5, min_block_ticks: 40, step: 10,
    };

    fn periods<const D: usize>(t: &TimingTable<D>) -> [u16; D] {
        let mut out = [0; D];
        for (o, p) in out.iter_mut().zip(t.pairs().iter()) {
            *o = p.period;
        }
        out
    }

    #[test]
    fn ideal_msb_fits_without_reduction() {
        let t = TimingTable::<4>::fit(&BUDGET, 255);
        assert_eq!(t.msb_ticks(), 500);
        assert_eq!(periods(&t), [67, 130, 255, 505]);
        assert_eq!(t.total_ticks(), 957);
        // Full brightness asserts OE straight after the latch.
        assert!(t.pairs().iter().all(|p| p.oe == 5));
        assert_eq!(t.pairs()[3].on_time(), 500);
    }

    #[test]
    fn msb_is_reduced_until_row_fits() {
        let budget = RowBudget { latch_ticks: 50, ..BUDGET };
        let t = TimingTable::<4>::fit(&budget, 255);
        assert_eq!(t.msb_ticks(), 420);
        assert_eq!(periods(&t), [102, 155, 260, 470]);
        assert_eq!(t.total_ticks(), 987);
    }

    #[test]
    fn padded_blocks_keep_their_lit_time() {
        let budget = RowBudget { min_block_ticks: 100, ..BUDGET };
        let t = TimingTable::<4>::fit(&budget, 255);
        let lsb = t.pairs()[0];
        assert_eq!(lsb.period, 100);
        assert_eq!(lsb.oe, 38);
        assert_eq!(lsb.on_time(), 62);
    }

    #[test]
    fn zero_brightness_is_dark() {
        let t = TimingTable::<4>::fit(&BUDGET, 0);
        assert!(t.pairs().iter().all(|p| p.on_time() == 0));
    }

    #[test]
    fn half_brightness_scales_on_time() {
        let t = TimingTable::<4>::fit(&BUDGET, 128);
        // oe = 500 * 127 / 255 + 5
        assert_eq!(t.pairs()[3].oe, 254);
        assert_eq!(t.pairs()[3].on_time(), 251);
    }

    #[test]
    fn generator_stops_when_nothing_fits() {
        let budget = RowBudget { ticks_per_row: 100, ..BUDGET };
        let t = TimingTable::<4>::fit(&budget, 255);
        assert_eq!(t.msb_ticks(), 0);
        assert!(t.pairs().iter().all(|p| p.period == 40));
    }

    #[test]
    fn oversized_budget_saturates() {
        let budget = RowBudget { ticks_per_row: u32::MAX, ..BUDGET };
        let t = TimingTable::<40>::fit(&budget, 128);
        assert_eq!(t.msb_ticks(), 0xFFFF - 5);
        assert_eq!(t.pairs()[39].period, 0xFFFF);
        // oe = 65530 * 127 / 255 + 5
        assert_eq!(t.pairs()[39].oe, 32641);
        // Planes far below the MSB are blank minimum blocks.
        assert_eq!(t.pairs()[0], TimerPair::blank(40));
        assert!(t.pairs().iter().all(|p| p.oe <= p.period));
    }

    fn params() -> TimingParams {
        TimingParams {
            timer_frequency: 30_000_000, rows_per_frame: 16, depth: 8,
            latch_ticks: 3, min_block_ticks: 45, step: 10,
        }
    }

    #[test]
    fn refresh_rate_limits() {
        let p = params();
        // 30M / 65535 / 16 / 2 + 1
        assert_eq!(p.min_refresh_rate(), 15);
        assert!(p.ticks_per_row(p.min_refresh_rate()) / 2 + 3 <= COUNTER_MAX);
        // 30M / (16 * 8 * 45)
        assert_eq!(p.max_refresh_rate(), 5208);
        assert_eq!(p.clamp_refresh_rate(1), 15);
        assert_eq!(p.clamp_refresh_rate(120), 120);
        assert_eq!(p.clamp_refresh_rate(u16::MAX), 5208);
    }

    #[test]
    fn idle_pair_is_blank_minimum_block() {
        let idle = params().idle_pair();
        assert_eq!(idle, TimerPair::new(45, 45));
        assert_eq!(idle.on_time(), 0);
    }

    #[test]
    fn generate_clamps_rate() {
        let p = params();
        let slow = TimingTable::<8>::generate(&p, 0, 255);
        let min = TimingTable::<8>::generate(&p, p.min_refresh_rate(), 255);
        assert_eq!(slow, min);
        assert!(slow.total_ticks() <= p.ticks_per_row(p.min_refresh_rate()));
    }
}
