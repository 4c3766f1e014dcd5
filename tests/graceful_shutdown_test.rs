//! Tests for application shutdown with work still in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};
use wavefinder::config::{AppConfig, AxisDefinition, GalilConfig};
use wavefinder::gui::{JogDirection, WavefinderApp};
use wavefinder::hardware::{GalilAdapter, Monochromator, MonochromatorStatus, SimulatedMonochromator};
use wavefinder::transport::{MockConnector, MockTransport};

fn config() -> AppConfig {
    AppConfig {
        galil: Some(GalilConfig {
            address: "192.168.1.19".into(),
            timeout_ms: 1000,
            update_interval_ms: 100,
            axes: vec![
                AxisDefinition {
                    name: "elevation".into(),
                    channel: "A".into(),
                },
                AxisDefinition {
                    name: "azimuth".into(),
                    channel: "B".into(),
                },
            ],
        }),
        ..Default::default()
    }
}

#[test]
fn test_shutdown_cancels_slow_commands_promptly() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let config = config();

    let mock = MockTransport::with_axes("AB");
    let observer = mock.clone();
    let adapter = runtime
        .block_on(GalilAdapter::connect(
            &MockConnector::new(mock),
            "192.168.1.19",
            &config.galil.as_ref().unwrap().axis_names(),
        ))
        .unwrap();
    // after discovery, every controller command takes far longer than shutdown may
    let _ = observer.clone().with_latency(Duration::from_secs(60));
    let adapter = Arc::new(adapter);

    let device = Arc::new(
        SimulatedMonochromator::from_config(&config.monochromator)
            .with_latency(Duration::from_secs(60)),
    );
    let mut app = WavefinderApp::start(&config, runtime.handle().clone(), device.clone(), Some(adapter));

    app.monochromator().jog(JogDirection::Up).unwrap();
    app.gimbal().unwrap().jog("azimuth", JogDirection::Up).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(device.status(), MonochromatorStatus::Busy);

    let started = Instant::now();
    app.shutdown();
    let elapsed = started.elapsed();

    assert!(
        elapsed < Duration::from_secs(5),
        "Shutdown took too long: {elapsed:?}"
    );
    assert_eq!(app.running_loops(), 0);
    assert_eq!(device.status(), MonochromatorStatus::Ok);
    assert!(!observer.is_connected());
}

#[test]
fn test_drop_shuts_down() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let config = config();
    let mock = MockTransport::with_axes("AB");
    let observer = mock.clone();
    let adapter = runtime
        .block_on(GalilAdapter::connect(
            &MockConnector::new(mock),
            "192.168.1.19",
            &config.galil.as_ref().unwrap().axis_names(),
        ))
        .unwrap();
    let device = Arc::new(SimulatedMonochromator::from_config(&config.monochromator));

    let app = WavefinderApp::start(&config, runtime.handle().clone(), device, Some(Arc::new(adapter)));
    std::thread::sleep(Duration::from_millis(50));
    drop(app);

    assert!(!observer.is_connected());
}
