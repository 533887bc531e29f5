//! Serialized progress output.
//!
//! Workers finish in any order; every block of lines is written under one
//! lock so concurrent output never interleaves mid-line.

use std::io::Write;
use std::sync::Mutex;

use tracing::debug;

/// Line-oriented writer shared by all workers.
pub struct ProgressLog {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ProgressLog {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Writes to standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Discards everything.
    pub fn disabled() -> Self {
        Self::new(std::io::sink())
    }

    /// Writes one line.
    pub fn line(&self, line: impl AsRef<str>) {
        self.block(std::slice::from_ref(&line.as_ref().to_string()));
    }

    /// Writes several lines without any other output in between.
    pub fn block(&self, lines: &[String]) {
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            // A panicking writer leaves no partial state worth protecting.
            Err(poisoned) => poisoned.into_inner(),
        };
        let result = lines
            .iter()
            .try_for_each(|line| writeln!(writer, "{}", line))
            .and_then(|_| writer.flush());
        if let Err(e) = result {
            debug!(error = %e, "Failed to write progress output");
        }
    }
}

impl Default for ProgressLog {
    fn default() -> Self {
        Self::stdout()
    }
}

impl std::fmt::Debug for ProgressLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressLog").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_concurrent_blocks_stay_contiguous() {
        let capture = Capture::default();
        let log = Arc::new(ProgressLog::new(capture.clone()));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        log.block(&[format!("begin {}", worker), format!("end {}", worker)]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 8 * 20 * 2);
        for pair in lines.chunks(2) {
            let worker = pair[0].strip_prefix("begin ").unwrap();
            assert_eq!(pair[1], format!("end {}", worker));
        }
    }
}
