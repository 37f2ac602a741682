//! Fatal-assertion facility.
//!
//! Heap corruption and caller misuse stop the kernel instead of returning.
//! The message is logged at `error` level, then the kernel panics and the
//! panic handler halts the machine. Under test harnesses the stop is an
//! ordinary panic.

use core::fmt;

/// Logs `args` at `error` level and stops.
///
/// # Panics
/// Always. This is the stop itself.
#[cold]
#[inline(never)]
#[track_caller]
pub fn halt(args: fmt::Arguments<'_>) -> ! {
    log::error!("{args}");
    panic!("{args}")
}

/// Stops the kernel with a formatted message.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)+) => {
        $crate::fatal::halt(::core::format_args!($($arg)+))
    };
}

/// Like `assert!`, but routed through [`halt`] so the failure is logged.
#[macro_export]
macro_rules! fatal_assert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::fatal!($($arg)+);
        }
    };
}
