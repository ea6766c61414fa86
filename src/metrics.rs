//! Operation counters and pin state gauges.
//!
//! The manager reports into a [`MetricsSink`] handed to it at construction.
//! Recording never fails from the caller's point of view: a sink that cannot
//! record logs the problem and carries on.
//!
//! Metrics exported by [`PrometheusMetrics`]:
//!
//! - `gpio_operations_total{operation, pin}` - setup/read/write counts
//! - `gpio_pin_state{pin}` - last written level, 0 or 1

use log::warn;
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Setup,
    Read,
    Write,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Setup => "setup",
            Operation::Read => "read",
            Operation::Write => "write",
        }
    }
}

pub trait MetricsSink: Send + Sync {
    fn record_operation(&self, operation: Operation, pin: u32);
    fn record_state(&self, pin: u32, level: bool);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_operation(&self, _operation: Operation, _pin: u32) {}
    fn record_state(&self, _pin: u32, _level: bool) {}
}

pub struct PrometheusMetrics {
    registry: Registry,
    operations: IntCounterVec,
    state: GaugeVec,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new("gpio_operations_total", "Total GPIO operations"),
            &["operation", "pin"],
        )?;
        let state = GaugeVec::new(
            Opts::new("gpio_pin_state", "Current GPIO pin state"),
            &["pin"],
        )?;

        registry.register(Box::new(operations.clone()))?;
        registry.register(Box::new(state.clone()))?;

        Ok(Self {
            registry,
            operations,
            state,
        })
    }

    pub fn operation_count(&self, operation: Operation, pin: u32) -> u64 {
        let pin = pin.to_string();
        self.operations
            .get_metric_with_label_values(&[operation.as_str(), &pin])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    pub fn state(&self, pin: u32) -> Option<f64> {
        let pin = pin.to_string();
        self.state
            .get_metric_with_label_values(&[&pin])
            .ok()
            .map(|g| g.get())
    }

    /// Render every metric in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MetricsSink for PrometheusMetrics {
    fn record_operation(&self, operation: Operation, pin: u32) {
        let pin = pin.to_string();
        match self
            .operations
            .get_metric_with_label_values(&[operation.as_str(), &pin])
        {
            Ok(counter) => counter.inc(),
            Err(e) => warn!("Failed to record {} on pin {pin}: {e}", operation.as_str()),
        }
    }

    fn record_state(&self, pin: u32, level: bool) {
        let label = pin.to_string();
        match self.state.get_metric_with_label_values(&[&label]) {
            Ok(gauge) => gauge.set(if level { 1.0 } else { 0.0 }),
            Err(e) => warn!("Failed to record state of pin {pin}: {e}"),
        }
    }
}
