use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::HardwareError;
use crate::gpio::{GpioBackend, Level, PinHandle};

/// In-memory backend. Lines keep their level, and faults can be injected
/// per line.
#[derive(Clone)]
pub struct MockGpioBackend {
    lines: Arc<Mutex<FxHashMap<u32, MockLine>>>, // keyed by line number
}

#[derive(Debug, Clone)]
struct MockLine {
    level: Level,
    output: bool,
    fail_writes: bool,
    fail_reads: bool,
    writes: Vec<Level>,
    reads: usize,
}

impl Default for MockLine {
    fn default() -> Self {
        Self {
            level: Level::Low,
            output: false,
            fail_writes: false,
            fail_reads: false,
            writes: Vec::new(),
            reads: 0,
        }
    }
}

impl Default for MockGpioBackend {
    fn default() -> Self {
        Self::new(0..=27)
    }
}

impl MockGpioBackend {
    pub fn new(lines: impl IntoIterator<Item = u32>) -> Self {
        let lines = lines
            .into_iter()
            .map(|line| (line, MockLine::default()))
            .collect();
        Self {
            lines: Arc::new(Mutex::new(lines)),
        }
    }

    pub fn level(&self, line: u32) -> Option<Level> {
        self.lines.lock().get(&line).map(|l| l.level)
    }

    pub fn is_output(&self, line: u32) -> Option<bool> {
        self.lines.lock().get(&line).map(|l| l.output)
    }

    /// Simulate an external signal on an input line.
    pub fn drive_input(&self, line: u32, level: Level) {
        if let Some(l) = self.lines.lock().get_mut(&line) {
            l.level = level;
        }
    }

    pub fn fail_writes(&self, line: u32, fail: bool) {
        if let Some(l) = self.lines.lock().get_mut(&line) {
            l.fail_writes = fail;
        }
    }

    pub fn fail_reads(&self, line: u32, fail: bool) {
        if let Some(l) = self.lines.lock().get_mut(&line) {
            l.fail_reads = fail;
        }
    }

    /// Every level successfully written to `line`, oldest first.
    pub fn write_log(&self, line: u32) -> Vec<Level> {
        self.lines
            .lock()
            .get(&line)
            .map(|l| l.writes.clone())
            .unwrap_or_default()
    }

    pub fn read_count(&self, line: u32) -> usize {
        self.lines.lock().get(&line).map(|l| l.reads).unwrap_or(0)
    }

    pub fn total_reads(&self) -> usize {
        self.lines.lock().values().map(|l| l.reads).sum()
    }
}

impl GpioBackend for MockGpioBackend {
    type Pin = MockPin;

    fn resolve(&self, pin: u32) -> Result<MockPin, HardwareError> {
        if !self.lines.lock().contains_key(&pin) {
            return Err(HardwareError::NotFound(pin));
        }
        Ok(MockPin {
            line: pin,
            lines: Arc::clone(&self.lines),
        })
    }
}

pub struct MockPin {
    line: u32,
    lines: Arc<Mutex<FxHashMap<u32, MockLine>>>,
}

impl MockPin {
    fn with_line<T>(
        &self,
        f: impl FnOnce(&mut MockLine) -> Result<T, HardwareError>,
    ) -> Result<T, HardwareError> {
        let mut lines = self.lines.lock();
        let line = lines
            .get_mut(&self.line)
            .ok_or(HardwareError::NotFound(self.line))?;
        f(line)
    }
}

impl PinHandle for MockPin {
    fn set_level(&mut self, level: Level) -> Result<(), HardwareError> {
        let n = self.line;
        self.with_line(|line| {
            if line.fail_writes {
                return Err(HardwareError::Io(format!("injected write fault on line {n}")));
            }
            line.output = true;
            line.level = level;
            line.writes.push(level);
            Ok(())
        })
    }

    fn read_level(&self) -> Result<Level, HardwareError> {
        let n = self.line;
        self.with_line(|line| {
            if line.fail_reads {
                return Err(HardwareError::Io(format!("injected read fault on line {n}")));
            }
            line.reads += 1;
            Ok(line.level)
        })
    }

    fn configure_input(&mut self) -> Result<(), HardwareError> {
        let n = self.line;
        self.with_line(|line| {
            if line.fail_writes {
                return Err(HardwareError::Io(format!("injected mode fault on line {n}")));
            }
            line.output = false;
            Ok(())
        })
    }
}
