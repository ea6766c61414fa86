use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{GpioError, HardwareError};
use crate::metrics::{MetricsSink, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "in", alias = "input")]
    Input,
    #[serde(rename = "out", alias = "output")]
    Output,
}

impl FromStr for Direction {
    type Err = GpioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" | "input" => Ok(Direction::Input),
            "out" | "output" => Ok(Direction::Output),
            _ => Err(GpioError::InvalidDirection(s.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("in"),
            Direction::Output => f.write_str("out"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value { Level::High } else { Level::Low }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level.is_high()
    }
}

/// A controllable line obtained from a [`GpioBackend`].
///
/// The registry owns each handle exclusively; `&mut self` methods are only
/// called while the registry write lock is held.
pub trait PinHandle: Send + Sync {
    fn set_level(&mut self, level: Level) -> Result<(), HardwareError>;
    fn read_level(&self) -> Result<Level, HardwareError>;
    /// Switch the line to a floating input with no edge detection.
    fn configure_input(&mut self) -> Result<(), HardwareError>;
}

pub trait GpioBackend: Send + Sync {
    type Pin: PinHandle;

    fn resolve(&self, pin: u32) -> Result<Self::Pin, HardwareError>;
}

pub(crate) type PinCallback = Box<dyn Fn(u32, bool) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PinSnapshot {
    pub number: u32,
    pub direction: Direction,
    pub last_level: bool,
}

struct PinEntry<P> {
    direction: Direction,
    handle: P,
    last_level: bool,
}

struct Registry<P> {
    pins: FxHashMap<u32, PinEntry<P>>,
    callbacks: Vec<PinCallback>,
}

/// Outcome of forcing every registered pin low.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub lowered: Vec<u32>,
    pub failed: Vec<(u32, String)>,
}

pub struct GpioManager<B: GpioBackend> {
    backend: Arc<B>,
    metrics: Arc<dyn MetricsSink>,
    registry: RwLock<Registry<B::Pin>>,
}

impl<B: GpioBackend> GpioManager<B> {
    pub fn new(backend: Arc<B>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            backend,
            metrics,
            registry: RwLock::new(Registry {
                pins: FxHashMap::default(),
                callbacks: Vec::new(),
            }),
        }
    }

    pub fn configure(&self, pin: u32, direction: Direction) -> Result<(), GpioError> {
        let mut registry = self.registry.write();

        if registry.pins.contains_key(&pin) {
            return Err(GpioError::AlreadyConfigured(pin));
        }

        let unavailable = |e: HardwareError| GpioError::HardwareUnavailable {
            pin,
            reason: e.to_string(),
        };

        let mut handle = self.backend.resolve(pin).map_err(unavailable)?;
        match direction {
            Direction::Output => handle.set_level(Level::Low),
            Direction::Input => handle.configure_input(),
        }
        .map_err(unavailable)?;

        registry.pins.insert(
            pin,
            PinEntry {
                direction,
                handle,
                last_level: false,
            },
        );
        self.metrics.record_operation(Operation::Setup, pin);
        info!("Configured pin {pin} as {direction}");

        Ok(())
    }

    pub fn write(&self, pin: u32, value: bool) -> Result<(), GpioError> {
        let mut registry = self.registry.write();
        let Registry { pins, callbacks } = &mut *registry;

        let entry = pins.get_mut(&pin).ok_or(GpioError::NotConfigured(pin))?;
        if entry.direction != Direction::Output {
            return Err(GpioError::WrongDirection(pin));
        }

        entry
            .handle
            .set_level(value.into())
            .map_err(|e| GpioError::HardwareFault {
                pin,
                reason: e.to_string(),
            })?;
        entry.last_level = value;

        self.metrics.record_operation(Operation::Write, pin);
        self.metrics.record_state(pin, value);
        debug!("Wrote pin {pin} = {value}");

        dispatch(callbacks, pin, value);

        Ok(())
    }

    pub fn read(&self, pin: u32) -> Result<bool, GpioError> {
        let registry = self.registry.read();

        let entry = registry.pins.get(&pin).ok_or(GpioError::NotConfigured(pin))?;
        let level = entry
            .handle
            .read_level()
            .map_err(|e| GpioError::HardwareFault {
                pin,
                reason: e.to_string(),
            })?;

        self.metrics.record_operation(Operation::Read, pin);

        Ok(level.is_high())
    }

    /// Add an observer notified with `(pin, value)` after every successful
    /// write, in registration order.
    ///
    /// Callbacks run synchronously on the writing thread while the registry
    /// write lock is held. A callback must return quickly and must never call
    /// back into this manager, or it deadlocks. A panicking callback is
    /// logged and skipped; the remaining callbacks still run and the write
    /// still succeeds.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(u32, bool) + Send + Sync + 'static,
    {
        self.registry.write().callbacks.push(Box::new(callback));
    }

    pub fn pin(&self, pin: u32) -> Option<PinSnapshot> {
        self.registry.read().pins.get(&pin).map(|entry| PinSnapshot {
            number: pin,
            direction: entry.direction,
            last_level: entry.last_level,
        })
    }

    pub fn pins(&self) -> Vec<PinSnapshot> {
        let registry = self.registry.read();
        let mut pins: Vec<PinSnapshot> = registry
            .pins
            .iter()
            .map(|(number, entry)| PinSnapshot {
                number: *number,
                direction: entry.direction,
                last_level: entry.last_level,
            })
            .collect();
        pins.sort_by_key(|p| p.number);
        pins
    }

    /// Drive every registered pin low, whatever its direction.
    ///
    /// Waits for the exclusive lock, so in-flight operations complete first.
    /// A failing pin is reported and skipped.
    pub(crate) fn drive_all_low(&self) -> SweepReport {
        let mut registry = self.registry.write();
        let mut numbers: Vec<u32> = registry.pins.keys().copied().collect();
        numbers.sort_unstable();

        let mut report = SweepReport::default();
        for number in numbers {
            let Some(entry) = registry.pins.get_mut(&number) else {
                continue;
            };
            match entry.handle.set_level(Level::Low) {
                Ok(()) => {
                    entry.last_level = false;
                    report.lowered.push(number);
                }
                Err(e) => {
                    warn!("Failed to drive pin {number} low: {e}");
                    report.failed.push((number, e.to_string()));
                }
            }
        }
        report
    }
}

fn dispatch(callbacks: &[PinCallback], pin: u32, value: bool) {
    for (idx, callback) in callbacks.iter().enumerate() {
        if catch_unwind(AssertUnwindSafe(|| callback(pin, value))).is_err() {
            warn!("Callback #{idx} panicked on pin {pin} write, skipping");
        }
    }
}
