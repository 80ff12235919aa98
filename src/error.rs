/// Reasons a [`crate::RefreshConfig`] can be rejected.
///
/// These are only produced while validating configuration, before any
/// hardware is touched. Once an engine is running nothing can fail.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Bit depth must be between 1 and 16 planes.
    InvalidDepth(usize),
    /// Panel width must be at least one column.
    InvalidWidth,
    /// Row queue needs at least two slots so one can be shifted while the other is filled.
    QueueTooSmall(usize),
    /// Rows per frame must be between 1 and [`crate::address::MAX_ROWS`].
    InvalidRows(u16),
    /// Address pins cannot select every scan row.
    NotEnoughAddressPins { rows: u16, pins: usize },
    /// Address pin number outside the 16 pins of a port, or used twice.
    InvalidAddressPin(u8),
    /// Data pin bit outside the 8-bit output byte, or two signals on the same bit.
    InvalidDataPins,
    /// Timer frequency is too low to resolve a minimum-width block.
    TimerTooSlow,
    /// No refresh rate fits both the counter width and the minimum block period.
    NoValidRefreshRate { min: u16, max: u16 },
}

pub type Result<T> = core::result::Result<T, Error>;
