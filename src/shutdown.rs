use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use crate::gpio::{GpioBackend, GpioManager};

pub use crate::gpio::SweepReport;

/// What to do once the sweep has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Terminate the process with status 0.
    Exit,
    /// Return to the caller; later signals are ignored.
    Stay,
}

/// Forces every configured pin low when the process is asked to terminate.
///
/// The sweep runs at most once per coordinator, no matter how many signals
/// arrive or how many callers invoke [`ShutdownCoordinator::sweep`].
pub struct ShutdownCoordinator<B: GpioBackend> {
    manager: Arc<GpioManager<B>>,
    policy: ExitPolicy,
    fired: AtomicBool,
}

pub struct ShutdownTask {
    handle: JoinHandle<()>,
}

impl ShutdownTask {
    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<B: GpioBackend + 'static> ShutdownCoordinator<B> {
    pub fn new(manager: Arc<GpioManager<B>>, policy: ExitPolicy) -> Self {
        Self {
            manager,
            policy,
            fired: AtomicBool::new(false),
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Drive all registered pins low. Returns `None` if a sweep already ran
    /// or is running.
    pub fn sweep(&self) -> Option<SweepReport> {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Shutdown sweep already fired, ignoring");
            return None;
        }

        let report = self.manager.drive_all_low();
        if report.failed.is_empty() {
            info!("Shutdown sweep drove {} pin(s) low", report.lowered.len());
        } else {
            warn!(
                "Shutdown sweep drove {} pin(s) low, {} failed",
                report.lowered.len(),
                report.failed.len()
            );
        }
        Some(report)
    }

    /// Listen for SIGINT and SIGTERM in a background task.
    #[cfg(unix)]
    pub fn spawn(self: Arc<Self>) -> std::io::Result<ShutdownTask> {
        use tokio::signal::unix::{self, SignalKind};

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        let handle = tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    Some(()) = sigint.recv() => "SIGINT",
                    Some(()) = sigterm.recv() => "SIGTERM",
                    else => break,
                };
                self.handle_signal(name).await;
            }
        });

        Ok(ShutdownTask { handle })
    }

    /// Wait for `trigger`, then handle it as a termination signal.
    pub async fn run_until<F>(self: Arc<Self>, trigger: F) -> Option<SweepReport>
    where
        F: Future<Output = ()>,
    {
        trigger.await;
        self.handle_signal("shutdown trigger").await
    }

    async fn handle_signal(self: &Arc<Self>, name: &str) -> Option<SweepReport> {
        info!("Received {name}.");

        let this = Arc::clone(self);
        let report = match tokio::task::spawn_blocking(move || this.sweep()).await {
            Ok(report) => report,
            Err(e) => {
                error!("Shutdown sweep task failed: {e}");
                None
            }
        };

        if report.is_some() && self.policy == ExitPolicy::Exit {
            info!("Exiting.");
            std::process::exit(0);
        }
        report
    }
}
