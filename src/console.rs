//! Line-buffered console input, backed by the UART, with the device
//! read/write entry points `file.rs` wires to the console major number.

use core::num::Wrapping;

use crate::error::SysError;
use crate::proc::{self, Channel};
use crate::spinlock::SpinLock;
use crate::uart;
use crate::vm::VA;

const INPUT_BUF_SIZE: usize = 128;

const CTRL_U: u8 = 0x15;
const CTRL_D: u8 = 0x04;
const CTRL_H: u8 = 0x08;
const BACKSPACE: u8 = 0x7f;

pub static CONSOLE: SpinLock<Console> = SpinLock::new(Console::new(), "console");

pub struct Console {
    buf: [u8; INPUT_BUF_SIZE],
    /// Next index to read
    r: Wrapping<usize>,
    /// Next index to write
    w: Wrapping<usize>,
    /// Next index for an in-progress line to edit
    e: Wrapping<usize>,
}

impl Console {
    const fn new() -> Self {
        Self {
            buf: [0; INPUT_BUF_SIZE],
            r: Wrapping(0),
            w: Wrapping(0),
            e: Wrapping(0),
        }
    }
}

impl SpinLock<Console> {
    /// Handles one input character from the UART interrupt handler: echoes
    /// it and, on newline or EOF, wakes any reader blocked on a full line.
    pub fn interrupt_char(&self, c: u8) {
        let mut console = self.lock();

        match c {
            CTRL_U => {
                while console.e != console.w
                    && console.buf[(console.e - Wrapping(1)).0 % INPUT_BUF_SIZE] != b'\n'
                {
                    console.e -= 1;
                    uart::putc_sync(BACKSPACE);
                }
            }
            CTRL_H | BACKSPACE => {
                if console.e != console.w {
                    console.e -= 1;
                    uart::putc_sync(BACKSPACE);
                }
            }
            _ => {
                if c != 0 && (console.e - console.r).0 < INPUT_BUF_SIZE {
                    let c = if c == b'\r' { b'\n' } else { c };
                    uart::putc_sync(c);

                    let idx = console.e.0 % INPUT_BUF_SIZE;
                    console.buf[idx] = c;
                    console.e += 1;

                    if c == b'\n' || c == CTRL_D || (console.e - console.r).0 == INPUT_BUF_SIZE {
                        console.w = console.e;
                        proc::wakeup(Channel::Lock(&console.r as *const _ as usize));
                    }
                }
            }
        }
    }

}

/// Reads up to one line into a user-space buffer, blocking until a full
/// line (or EOF) is available. Matches the `fn(VA, usize) -> ...` shape
/// the device table expects.
pub fn read(addr: VA, n: usize) -> Result<usize, SysError> {
    let mut target = n;
    let mut dst = addr.0;
    let mut console = CONSOLE.lock();

    while target > 0 {
        while console.r == console.w {
            if proc::current_proc().is_killed() {
                return Err(SysError::IoError);
            }
            let chan = Channel::Lock(&console.r as *const _ as usize);
            console = proc::sleep(chan, console);
        }

        let idx = console.r.0 % INPUT_BUF_SIZE;
        let c = console.buf[idx];
        console.r += 1;

        if c == CTRL_D {
            if target < n {
                // Return this run without consuming the EOF marker, so
                // the next read sees it immediately.
                console.r -= 1;
            }
            break;
        }

        let byte = [c];
        if unsafe { proc::copy_to_user(&byte, VA(dst)) }.is_err() {
            break;
        }
        dst += 1;
        target -= 1;

        if c == b'\n' {
            break;
        }
    }

    Ok(n - target)
}

/// Writes a user-space buffer out to the UART, one byte at a time.
pub fn write(addr: VA, n: usize) -> Result<usize, SysError> {
    for i in 0..n {
        let mut byte = [0u8];
        proc::copy_from_user(VA(addr.0 + i), &mut byte).map_err(SysError::from)?;
        uart::UART.putc(byte[0]);
    }
    Ok(n)
}

/// # Safety
/// Must be called only once during kernel initialization.
pub unsafe fn init() {
    unsafe { uart::init() };
}
