//! Property-based tests for timing generation, address tables and the row queue.

use hubrefresh::{AddressTable, RowBudget, RowQueue, TimingParams, TimingTable};
use proptest::prelude::*;

fn budget() -> impl Strategy<Value = RowBudget> {
    (1u32..130_000, 0u16..200, 1u16..2_000, 1u16..100).prop_map(
        |(ticks_per_row, latch_ticks, min_block_ticks, step)| RowBudget {
            ticks_per_row, latch_ticks, min_block_ticks, step,
        },
    )
}

proptest! {
    /// Generated blocks fit the row unless even a zero MSB cannot fit.
    #[test]
    fn blocks_fit_the_row(budget in budget(), brightness in 0u8..=255) {
        let t = TimingTable::<8>::fit(&budget, brightness);
        if t.msb_ticks() > 0 {
            prop_assert!(t.total_ticks() <= budget.ticks_per_row,
                "{:?} uses {} ticks of {}", budget, t.total_ticks(), budget.ticks_per_row);
        }
        for p in t.pairs() {
            prop_assert!(p.period >= budget.min_block_ticks);
            prop_assert!(p.oe <= p.period);
            prop_assert!(p.oe >= budget.latch_ticks.min(p.period));
            prop_assert_eq!(p.repetition, 0);
        }
    }

    /// Each plane is lit at least as long as the one below it.
    #[test]
    fn planes_are_ordered(budget in budget(), brightness in 0u8..=255) {
        let t = TimingTable::<6>::fit(&budget, brightness);
        for w in t.pairs().windows(2) {
            prop_assert!(w[0].on_time() <= w[1].on_time());
        }
    }

    /// Raising brightness never shortens any plane's lit time.
    #[test]
    fn brightness_is_monotonic(budget in budget(), a in 0u8..=255, b in 0u8..=255) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let dim = TimingTable::<8>::fit(&budget, lo);
        let bright = TimingTable::<8>::fit(&budget, hi);
        prop_assert_eq!(dim.msb_ticks(), bright.msb_ticks());
        for (d, b) in dim.pairs().iter().zip(bright.pairs().iter()) {
            prop_assert_eq!(d.period, b.period);
            prop_assert!(d.on_time() <= b.on_time());
        }
    }

    /// Same inputs give the same table.
    #[test]
    fn generation_is_deterministic(budget in budget(), brightness in 0u8..=255) {
        prop_assert_eq!(TimingTable::<5>::fit(&budget, brightness), TimingTable::<5>::fit(&budget, brightness));
    }

    /// Any requested rate is clamped into a range whose table fits the counter.
    #[test]
    fn clamped_rates_fit_the_counter(
        freq in 1_000_000u32..480_000_000,
        rows in 1u16..=32,
        latch in 1u16..50,
        min_block in 10u16..3_000,
        rate in 0u16..=u16::MAX,
    ) {
        let params = TimingParams {
            timer_frequency: freq, rows_per_frame: rows, depth: 8,
            latch_ticks: latch, min_block_ticks: min_block, step: 10,
        };
        prop_assume!(params.min_refresh_rate() <= params.max_refresh_rate());
        let clamped = params.clamp_refresh_rate(rate);
        prop_assert!(clamped >= params.min_refresh_rate());
        prop_assert!(clamped <= params.max_refresh_rate());

        let t = TimingTable::<8>::generate(&params, rate, 255);
        prop_assert!(t.total_ticks() <= params.ticks_per_row(clamped));
        prop_assert!(t.msb_ticks() + u32::from(latch) <= 0xFFFF);
    }

    /// Every row's address pair drives each pin exactly one way and selects that row.
    #[test]
    fn address_pairs_select_rows(rows in 1u16..=32, offset in 0u8..11) {
        let pins: Vec<u8> = (0..5).map(|i| i + offset).collect();
        let table = AddressTable::new(&pins, rows).unwrap();
        for row in 0..usize::from(rows) {
            let pair = table.get(row);
            prop_assert_eq!(pair.set & pair.clear, 0);
            prop_assert_eq!(pair.set | pair.clear, table.mask());
            prop_assert_eq!(usize::from(pair.apply(0) >> offset), row);
        }
    }

    /// The queue agrees with a simple counting model under any interleaving.
    #[test]
    fn queue_matches_model(ops in proptest::collection::vec(any::<bool>(), 0..200)) {
        let q = RowQueue::<3>::new();
        let mut written = 0usize;
        let mut read = 0usize;
        for write in ops {
            if write && !q.is_full() {
                prop_assert_eq!(q.next_write_slot(), written % 3);
                q.commit_write();
                written += 1;
            } else if !write && !q.is_empty() {
                prop_assert_eq!(q.next_read_slot(), read % 3);
                q.commit_read();
                read += 1;
            }
            prop_assert_eq!(q.len(), written - read);
            prop_assert!(q.len() <= 3);
        }
    }
}
