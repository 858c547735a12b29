//! # Serial Console and Logging
//!
//! Everything the kernel prints goes out of COM1. `println!` writes raw
//! formatted text; the [`log`] facade is routed through [`SerialLogger`] so
//! subsystems can use `log::info!` and friends with a level filter.
//!
//! The serial lock is always taken with interrupts disabled, otherwise an IRQ
//! handler that logs while the main flow holds the port would deadlock.

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicBool, Ordering};

use log::{Log, Metadata, Record};
use spin::Mutex;
use uart_16550::SerialPort;

use crate::config::{LOG_LEVEL, SERIAL_PORT};

pub static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(SERIAL_PORT) });

static LOGGER: SerialLogger = SerialLogger;
static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::logging::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => {
        $crate::print!("{}\n", format_args!($($arg)*))
    };
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    x86_64::instructions::interrupts::without_interrupts(|| {
        let _ = SERIAL.lock().write_fmt(args);
    });
}

/// Zero-sized `fmt::Write` handle onto the serial port, for APIs that stream
/// into a writer (like the heap layout dump).
pub struct SerialWriter;

impl Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        x86_64::instructions::interrupts::without_interrupts(|| SERIAL.lock().write_str(s))
    }
}

/// `log` backend printing `[LEVEL] target: message` lines to COM1.
pub struct SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= LOG_LEVEL
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            crate::println!("[{:>5}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Bring up the UART and install the logger. Calling it again is harmless.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::AcqRel) {
        return;
    }

    x86_64::instructions::interrupts::without_interrupts(|| SERIAL.lock().init());

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LOG_LEVEL);
    }
}
