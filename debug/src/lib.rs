#![no_std]
//! Serial debug logger.
//!
//! The wire transport (which UART, which baud rate) is a hardware concern
//! and lives outside this crate; `pbio-debug` only owns the log-level
//! filtering and the `core::fmt::Write` plumbing. A board hookup calls
//! [`set_sink`] once at startup with a byte-sink callback; every `sprint!`/
//! `logln!` call after that goes through it under a short critical section.

use core::fmt::{self, Write};
use critical_section::Mutex;
use core::cell::Cell;

/// Flow control timeout limits how long `putc` waits to drain a full TX buffer.
const FLOW_CONTROL_TIMEOUT_MS: usize = 5;

#[derive(Copy, Clone, PartialOrd, PartialEq)]
#[allow(dead_code)]
pub enum LL {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

static LOG_LEVEL: Mutex<Cell<LL>> = Mutex::new(Cell::new(LL::Info));
static SINK: Mutex<Cell<Option<fn(u8)>>> = Mutex::new(Cell::new(None));

pub fn set_log_level(level: LL) {
    critical_section::with(|cs| LOG_LEVEL.borrow(cs).set(level));
}

pub fn log_level() -> LL {
    critical_section::with(|cs| LOG_LEVEL.borrow(cs).get())
}

/// Installs the byte-sink used by `Uart::putc`. Call once during board bring-up.
pub fn set_sink(putc: fn(u8)) {
    critical_section::with(|cs| SINK.borrow(cs).set(Some(putc)));
}

pub struct Uart {}
impl Uart {
    /// Write to the installed sink, if any. Silently drops bytes when no sink
    /// has been installed yet (e.g. before board bring-up completes), matching
    /// a board with no debug UART wired up.
    pub fn putc(&self, c: u8) {
        let sink = critical_section::with(|cs| SINK.borrow(cs).get());
        if let Some(putc) = sink {
            putc(c);
        }
    }
}

impl Write for Uart {
    fn write_str(&mut self, s: &str) -> Result<(), fmt::Error> {
        for c in s.bytes() {
            self.putc(c);
        }
        Ok(())
    }
}

/// How long (in abstract retry units) to wait for TX flow control before giving up.
/// Exposed so a board's `putc` implementation can size its own backoff loop.
pub const FLOW_CONTROL_RETRIES: usize = FLOW_CONTROL_TIMEOUT_MS;

#[macro_export]
macro_rules! sprint {
    ($($args:tt)+) => ({
        use core::fmt::Write;
        let _ = write!($crate::Uart {}, $($args)+);
    });
}

#[macro_export]
macro_rules! sprintln {
    () => ({
        $crate::sprint!("\r\n")
    });
    ($fmt:expr) => ({
        $crate::sprint!(concat!($fmt, "\r\n"))
    });
    ($fmt:expr, $($args:tt)+) => ({
        $crate::sprint!(concat!($fmt, "\r\n"), $($args)+)
    });
}

#[macro_export]
macro_rules! log {
    ($level:expr, $($e:expr),+) => {
        if $level as u8 >= $crate::log_level() as u8 {
            $crate::sprint!($($e),+)
        }
    }
}

#[macro_export]
macro_rules! logln {
    ($level:expr, $($e:expr),*) => {
        if $level as u8 >= $crate::log_level() as u8 {
            $crate::sprintln!($($e),*)
        }
    }
}

/// Logs a label followed by a value formatted as hex, no trailing newline.
#[macro_export]
macro_rules! loghex {
    ($level:expr, $label:expr, $val:expr) => {
        if $level as u8 >= $crate::log_level() as u8 {
            $crate::sprint!("{}{:x}", $label, $val)
        }
    }
}

/// Logs a label followed by a value formatted as hex, with a trailing newline.
#[macro_export]
macro_rules! loghexln {
    ($level:expr, $label:expr, $val:expr) => {
        if $level as u8 >= $crate::log_level() as u8 {
            $crate::sprintln!("{}{:x}", $label, $val)
        }
    }
}
