//! PL011 UART log backend
//!
//! Implements `log::Log` on top of the PL011 transmit FIFO. The base
//! address comes from the host DTB (`dtb::platform_info().uart_base`).
//! Lines look like `[INFO smc_dispatch::registry] smc: ...`.

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

const UART_DR: usize = 0x00; // Data Register
const UART_FR: usize = 0x18; // Flag Register

/// Flag Register: transmit FIFO full
const UART_FR_TXFF: u32 = 1 << 5;

pub struct Uart {
    base: usize,
}

impl Uart {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    pub fn putc(&self, c: u8) {
        while self.read_reg(UART_FR) & UART_FR_TXFF != 0 {
            core::hint::spin_loop();
        }
        self.write_reg(UART_DR, c as u32);
    }

    pub fn puts(&self, s: &str) {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.putc(b'\r');
            }
            self.putc(byte);
        }
    }

    #[inline]
    fn read_reg(&self, offset: usize) -> u32 {
        unsafe { core::ptr::read_volatile((self.base + offset) as *const u32) }
    }

    #[inline]
    fn write_reg(&self, offset: usize, value: u32) {
        unsafe { core::ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }
}

impl fmt::Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.puts(s);
        Ok(())
    }
}

/// Write one log line (with trailing newline) to `out`.
pub fn format_record<W: Write>(out: &mut W, record: &Record<'_>) -> fmt::Result {
    writeln!(out, "[{} {}] {}", record.level(), record.target(), record.args())
}

pub struct UartLogger;

static LOGGER: UartLogger = UartLogger;

impl Log for UartLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut uart = Uart::new(crate::dtb::platform_info().uart_base as usize);
        let _ = format_record(&mut uart, record);
    }

    fn flush(&self) {}
}

/// Install the UART logger. Fails if another logger is already set.
pub fn init_logger(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}
