//! COM1 log sink for PC bring-up.

use core::fmt::{self, Write};
use spin::Mutex;
use uart_16550::SerialPort;

use crate::logger::{self, LogLevel, LogSink};

const COM1: u16 = 0x3F8;

struct SerialPortWrapper {
    port: Option<SerialPort>,
}

impl SerialPortWrapper {
    const fn new() -> Self {
        Self { port: None }
    }

    fn ensure_init(&mut self) {
        if self.port.is_none() {
            let mut port = unsafe { SerialPort::new(COM1) };
            port.init();
            self.port = Some(port);
        }
    }

    fn write_line(&mut self, level: LogLevel, timestamp_us: u64, args: fmt::Arguments<'_>) {
        self.ensure_init();
        if let Some(ref mut port) = self.port {
            port.write_str(level.serial_color()).ok();
            logger::format_line(port, level, timestamp_us, args).ok();
            port.write_str("\x1b[0m\n").ok();
        }
    }
}

static SERIAL1: Mutex<SerialPortWrapper> = Mutex::new(SerialPortWrapper::new());

/// Log sink writing coloured lines to COM1.
pub struct SerialSink;

impl LogSink for SerialSink {
    fn write_line(&self, level: LogLevel, timestamp_us: u64, args: fmt::Arguments<'_>) {
        SERIAL1.lock().write_line(level, timestamp_us, args);
    }
}

static SERIAL_SINK: SerialSink = SerialSink;

/// Initialise COM1 and route driver logging to it.
pub fn init() {
    SERIAL1.lock().ensure_init();
    logger::set_sink(&SERIAL_SINK);
}
