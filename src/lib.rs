pub mod backend;
pub mod config;
pub mod error;
pub mod gpio;
pub mod metrics;
pub mod routes;
pub mod shutdown;

pub use config::{AppConfig, GpioConfig, HttpConfig, PinPreset};
pub use error::{AppError, GpioError, HardwareError};
pub use gpio::{Direction, GpioBackend, GpioManager, Level, PinHandle, PinSnapshot};
pub use metrics::{MetricsSink, NoopMetrics, Operation, PrometheusMetrics};
pub use routes::AppState;
pub use shutdown::{ExitPolicy, ShutdownCoordinator, SweepReport};

#[cfg(feature = "hardware-gpio")]
pub use backend::LibgpiodBackend;
pub use backend::MockGpioBackend;
