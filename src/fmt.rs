//! Logging macros.
//!
//! With the `rtt` feature these print through `rtt-target`, which the
//! firmware initialises with `rtt_init_print!()`. Without it they compile
//! to nothing, but the arguments are still type-checked.

#![allow(unused_macros)]

#[cfg(feature = "rtt")]
macro_rules! log {
    ($level:literal, $($arg:tt)*) => {
        rtt_target::rprintln!(concat!("[", $level, "] {}"), format_args!($($arg)*))
    };
}

#[cfg(not(feature = "rtt"))]
macro_rules! log {
    ($level:literal, $($arg:tt)*) => {
        { let _ = format_args!($($arg)*); }
    };
}

macro_rules! trace {
    ($($arg:tt)*) => { log!("TRACE", $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { log!("DEBUG", $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { log!("WARN", $($arg)*) };
}
