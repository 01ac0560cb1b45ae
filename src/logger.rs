//! A minimal logging collaborator, in the spirit of the teacher's
//! `env::Logger`/`PosixLogger` split: a trait the core never constructs
//! concretely, plus one timestamped implementation for real use and one
//! no-op for tests that don't care. [`crate::log::UndoLog`] holds one of
//! these and reports its spill/rehydrate/clear cycles through it.

use std::fmt;
use std::sync::Mutex;

use chrono::Local;

pub trait Logger: fmt::Debug {
    fn log(&self, message: &str);
}

/// Writes timestamped lines to stderr, matching the format the teacher's
/// `PosixLogger` produced (`YYYY/MM/DD-HH:MM:SS.ffffff thread-id message`),
/// minus the thread id since the undo log's single-actor model (§5) never
/// multiplexes threads through one logger instance.
#[derive(Debug)]
pub struct StderrLogger {
    // Serializes interleaved writes from spill/rehydrate diagnostics; the
    // undo log itself is single-threaded, but a logger may be shared
    // across sessions by the embedding engine.
    lock: Mutex<()>,
}

impl Default for StderrLogger {
    fn default() -> Self {
        Self { lock: Mutex::new(()) }
    }
}

impl Logger for StderrLogger {
    fn log(&self, message: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        eprintln!("{} {}", Local::now().format("%Y/%m/%d-%H:%M:%S%.6f"), message);
    }
}

#[derive(Debug, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_logger_accepts_any_message() {
        let logger = NullLogger;
        logger.log("spill triggered at offset 128");
    }

    #[test]
    fn test_stderr_logger_does_not_panic() {
        let logger = StderrLogger::default();
        logger.log("rehydration window [3, 5] restored");
    }
}
