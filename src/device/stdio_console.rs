//! `Console` implementation backed by the process's standard streams, used
//! by the demo binary in place of the out-of-scope console device model.

use std::io::{Read, Write};
use std::sync::Mutex;

use super::Console;

/// Console wired to `stdin`/`stdout`.
///
/// The original wraps two semaphores and two locks so a reader and a
/// writer may proceed concurrently while readers serialize among
/// themselves (ditto writers, `spec.md` §6). `std::io::Stdin`/`Stdout`
/// already serialize internally, and readers/writers here go through
/// independent locks, giving the same cross-direction concurrency.
pub struct StdioConsole {
    stdin: Mutex<std::io::Stdin>,
    stdout: Mutex<std::io::Stdout>,
}

impl StdioConsole {
    /// Creates a console wired to the process's standard streams.
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(std::io::stdin()),
            stdout: Mutex::new(std::io::stdout()),
        }
    }
}

impl Default for StdioConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdioConsole {
    fn read_char(&self) -> u8 {
        let mut byte = [0u8; 1];
        let mut stdin = self.stdin.lock().unwrap();
        match stdin.read_exact(&mut byte) {
            Ok(()) => byte[0],
            Err(_) => 0,
        }
    }

    fn write_char(&self, ch: u8) {
        let mut stdout = self.stdout.lock().unwrap();
        let _ = stdout.write_all(&[ch]);
        let _ = stdout.flush();
    }
}
