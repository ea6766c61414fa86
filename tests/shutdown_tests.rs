use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use gpio_manager::{
    Direction, ExitPolicy, GpioManager, Level, MockGpioBackend, NoopMetrics, ShutdownCoordinator,
};
use tokio::sync::oneshot;

fn manager_with(
    backend: &Arc<MockGpioBackend>,
    pins: &[(u32, Direction, bool)],
) -> Arc<GpioManager<MockGpioBackend>> {
    let manager = Arc::new(GpioManager::new(backend.clone(), Arc::new(NoopMetrics)));
    for &(pin, direction, level) in pins {
        manager.configure(pin, direction).unwrap();
        if direction == Direction::Output {
            manager.write(pin, level).unwrap();
        }
    }
    manager
}

#[test]
fn sweep_drives_every_pin_low() {
    let backend = Arc::new(MockGpioBackend::default());
    let manager = manager_with(
        &backend,
        &[
            (5, Direction::Output, true),
            (6, Direction::Output, false),
            (7, Direction::Output, true),
            (8, Direction::Input, false),
        ],
    );
    backend.drive_input(8, Level::High);

    let coordinator = ShutdownCoordinator::new(manager.clone(), ExitPolicy::Stay);
    let report = coordinator.sweep().expect("first sweep runs");

    assert_eq!(report.lowered, vec![5, 6, 7, 8]);
    assert!(report.failed.is_empty());
    for pin in [5, 6, 7, 8] {
        assert_eq!(backend.level(pin), Some(Level::Low), "pin {pin}");
        assert!(!manager.pin(pin).unwrap().last_level);
    }
}

#[test]
fn sweep_runs_at_most_once() {
    let backend = Arc::new(MockGpioBackend::default());
    let manager = manager_with(&backend, &[(5, Direction::Output, true)]);
    let coordinator = ShutdownCoordinator::new(manager.clone(), ExitPolicy::Stay);

    assert!(!coordinator.has_fired());
    assert!(coordinator.sweep().is_some());
    assert!(coordinator.has_fired());

    manager.write(5, true).unwrap();
    assert!(coordinator.sweep().is_none());
    assert_eq!(backend.level(5), Some(Level::High));
}

#[test]
fn sweep_continues_past_faulty_pin() {
    let backend = Arc::new(MockGpioBackend::default());
    let manager = manager_with(
        &backend,
        &[
            (5, Direction::Output, true),
            (6, Direction::Output, true),
            (7, Direction::Output, true),
        ],
    );
    backend.fail_writes(6, true);

    let coordinator = ShutdownCoordinator::new(manager.clone(), ExitPolicy::Stay);
    let report = coordinator.sweep().unwrap();

    assert_eq!(report.lowered, vec![5, 7]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 6);
    assert_eq!(backend.level(5), Some(Level::Low));
    assert_eq!(backend.level(6), Some(Level::High));
    assert_eq!(backend.level(7), Some(Level::Low));
    assert!(manager.pin(6).unwrap().last_level);
}

#[test]
fn sweep_with_no_pins_is_empty() {
    let backend = Arc::new(MockGpioBackend::default());
    let manager = manager_with(&backend, &[]);
    let coordinator = ShutdownCoordinator::new(manager, ExitPolicy::Stay);

    let report = coordinator.sweep().unwrap();
    assert!(report.lowered.is_empty());
    assert!(report.failed.is_empty());
}

#[actix_rt::test]
async fn trigger_runs_sweep_once() {
    let backend = Arc::new(MockGpioBackend::default());
    let manager = manager_with(
        &backend,
        &[(5, Direction::Output, true), (7, Direction::Output, true)],
    );
    let coordinator = Arc::new(ShutdownCoordinator::new(manager, ExitPolicy::Stay));

    let (tx, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(coordinator.clone().run_until(async move {
        let _ = rx.await;
    }));

    assert_eq!(backend.level(5), Some(Level::High));
    tx.send(()).unwrap();

    let report = task.await.unwrap().expect("sweep ran");
    assert_eq!(report.lowered, vec![5, 7]);
    assert_eq!(backend.level(5), Some(Level::Low));
    assert_eq!(backend.level(7), Some(Level::Low));

    // a second trigger is a no-op
    let again = coordinator.run_until(async {}).await;
    assert!(again.is_none());
}

#[actix_rt::test]
async fn independent_coordinators_do_not_interfere() {
    let backend_a = Arc::new(MockGpioBackend::default());
    let backend_b = Arc::new(MockGpioBackend::default());
    let a = ShutdownCoordinator::new(
        manager_with(&backend_a, &[(5, Direction::Output, true)]),
        ExitPolicy::Stay,
    );
    let b = ShutdownCoordinator::new(
        manager_with(&backend_b, &[(5, Direction::Output, true)]),
        ExitPolicy::Stay,
    );

    assert!(a.sweep().is_some());
    assert_eq!(backend_a.level(5), Some(Level::Low));
    assert_eq!(backend_b.level(5), Some(Level::High));
    assert!(!b.has_fired());
}

#[cfg(unix)]
#[actix_rt::test]
async fn signal_listener_starts_and_stops() {
    let backend = Arc::new(MockGpioBackend::default());
    let manager = manager_with(&backend, &[(5, Direction::Output, true)]);
    let coordinator = Arc::new(ShutdownCoordinator::new(manager, ExitPolicy::Stay));

    let task = coordinator.clone().spawn().expect("install signal handlers");
    assert!(!task.is_finished());
    task.stop();

    assert!(!coordinator.has_fired());
    assert_eq!(backend.level(5), Some(Level::High));
}

#[test]
fn sweep_waits_for_in_flight_write() {
    let backend = Arc::new(MockGpioBackend::default());
    let manager = manager_with(&backend, &[(5, Direction::Output, false)]);

    let (entered_tx, entered_rx) = mpsc::channel();
    manager.register_callback(move |_, _| {
        let _ = entered_tx.send(());
        thread::sleep(Duration::from_millis(200));
    });

    let writer = {
        let manager = manager.clone();
        thread::spawn(move || manager.write(5, true))
    };

    // the writer now holds the registry lock inside its callback
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback entered");

    let coordinator = ShutdownCoordinator::new(manager.clone(), ExitPolicy::Stay);
    let report = coordinator.sweep().expect("first sweep runs");
    writer.join().unwrap().unwrap();

    assert_eq!(report.lowered, vec![5]);
    assert!(report.failed.is_empty());
    assert_eq!(backend.level(5), Some(Level::Low));
    assert_eq!(backend.write_log(5), vec![Level::Low, Level::Low, Level::High, Level::Low]);
    assert!(!manager.pin(5).unwrap().last_level);
}
