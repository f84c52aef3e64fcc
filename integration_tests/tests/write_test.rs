use std::time::Duration;

use assertables::assert_contains;
use elster_common::{bus_config::BusConfig, CanMember, ElsterType};
use elster_node::{Engine, EndpointHandle, Reading, RegisterError, WriteError};
use integration_tests::{heat_pump::SimHeatPump, sim_bus::SimBus};

mod utils;
use utils::{capture, tick, BusLogger, MS, SECOND};

const COMFORT_TEMP: u16 = 0x0005;

fn register_comfort_temp(engine: &mut Engine) -> EndpointHandle {
    engine
        .register_write_endpoint(
            CanMember::Hk1,
            COMFORT_TEMP,
            ElsterType::Dec,
            Duration::from_secs(30),
            15.0,
            25.0,
        )
        .unwrap()
}

#[test]
fn test_write_and_read_back() {
    let bus = SimBus::new(vec![SimHeatPump::new(CanMember::Hk1).with_value(COMFORT_TEMP, 200)]);
    let _logger = BusLogger::new(bus.new_receiver());
    let mut sender = bus.new_sender();
    let mut rx = bus.new_receiver();

    let mut engine = Engine::new(CanMember::Client, Duration::ZERO);
    let handle = register_comfort_temp(&mut engine);
    let readings = capture(&mut engine, handle);

    tick(&mut engine, &mut sender, &mut rx, 0);
    assert_eq!(vec![Reading::Value(20.0)], *readings.borrow());

    engine.push_write_value(handle, 21.5).unwrap();
    tick(&mut engine, &mut sender, &mut rx, SECOND);
    let writes = bus.with_member(CanMember::Hk1, |m| m.writes().to_vec()).unwrap();
    assert_eq!(vec![(COMFORT_TEMP, 215)], writes);

    // The value is read back half a second after the write
    tick(&mut engine, &mut sender, &mut rx, SECOND + 400 * MS);
    assert_eq!(1, readings.borrow().len());
    tick(&mut engine, &mut sender, &mut rx, SECOND + 500 * MS);
    assert_eq!(
        vec![Reading::Value(20.0), Reading::Value(21.5)],
        *readings.borrow()
    );

    // And the regular polling continues
    tick(&mut engine, &mut sender, &mut rx, 30 * SECOND);
    assert_eq!(3, readings.borrow().len());
}

#[test]
fn test_read_back_reports_device_value() {
    let bus = SimBus::new(vec![SimHeatPump::new(CanMember::Hk1)
        .with_value(COMFORT_TEMP, 200)
        .with_read_only(COMFORT_TEMP)]);
    let mut sender = bus.new_sender();
    let mut rx = bus.new_receiver();

    let mut engine = Engine::new(CanMember::Client, Duration::ZERO);
    let handle = register_comfort_temp(&mut engine);
    let readings = capture(&mut engine, handle);

    tick(&mut engine, &mut sender, &mut rx, 0);
    engine.push_write_value(handle, 22.0).unwrap();
    tick(&mut engine, &mut sender, &mut rx, SECOND);
    tick(&mut engine, &mut sender, &mut rx, 2 * SECOND);

    assert_eq!(
        vec![Reading::Value(20.0), Reading::Value(20.0)],
        *readings.borrow()
    );
}

#[test]
fn test_rejected_writes_are_not_sent() {
    let bus = SimBus::new(vec![SimHeatPump::new(CanMember::Hk1)]);
    let mut sender = bus.new_sender();
    let mut rx = bus.new_receiver();

    let mut engine = Engine::new(CanMember::Client, Duration::ZERO);
    let number = register_comfort_temp(&mut engine);
    let sensor = engine
        .register_read_endpoint(
            CanMember::Hk1,
            0x000F,
            ElsterType::Dec,
            Duration::from_secs(60),
        )
        .unwrap();
    let removed = engine
        .register_read_endpoint(
            CanMember::Hk1,
            0x0010,
            ElsterType::Dec,
            Duration::from_secs(60),
        )
        .unwrap();
    engine.unregister(removed);

    assert_eq!(
        Err(WriteError::ValueOutOfRange {
            value: 25.5,
            min: 15.0,
            max: 25.0
        }),
        engine.push_write_value(number, 25.5)
    );
    assert_eq!(
        Err(WriteError::ReadOnly { handle: sensor }),
        engine.push_write_value(sensor, 20.0)
    );
    assert_eq!(
        Err(WriteError::UnknownEndpoint { handle: removed }),
        engine.push_write_value(removed, 20.0)
    );

    tick(&mut engine, &mut sender, &mut rx, 0);
    let writes = bus.with_member(CanMember::Hk1, |m| m.writes().len()).unwrap();
    assert_eq!(0, writes);

    // The bounds themselves are accepted
    engine.push_write_value(number, 15.0).unwrap();
    engine.push_write_value(number, 25.0).unwrap();
}

#[test]
fn test_latest_pending_write_wins() {
    let bus = SimBus::new(vec![SimHeatPump::new(CanMember::Hk1).with_value(COMFORT_TEMP, 200)]);
    let mut sender = bus.new_sender();
    let mut rx = bus.new_receiver();

    let mut engine = Engine::new(CanMember::Client, Duration::ZERO);
    let handle = register_comfort_temp(&mut engine);

    engine.push_write_value(handle, 18.0).unwrap();
    engine.push_write_value(handle, 19.0).unwrap();
    tick(&mut engine, &mut sender, &mut rx, 0);

    let writes = bus.with_member(CanMember::Hk1, |m| m.writes().to_vec()).unwrap();
    assert_eq!(vec![(COMFORT_TEMP, 190)], writes);
}

#[test]
fn test_failed_send_is_retried() {
    let bus = SimBus::new(vec![SimHeatPump::new(CanMember::Hk1).with_value(0x000F, 225)]);
    let mut sender = bus.new_sender();
    let mut rx = bus.new_receiver();

    let mut engine = Engine::new(CanMember::Client, Duration::ZERO);
    let handle = engine
        .register_read_endpoint(
            CanMember::Hk1,
            0x000F,
            ElsterType::Dec,
            Duration::from_secs(60),
        )
        .unwrap();
    let readings = capture(&mut engine, handle);

    bus.set_offline(true);
    tick(&mut engine, &mut sender, &mut rx, 0);
    assert_eq!(1, engine.stats().send_failures);
    assert_eq!(1, engine.pending_frames());
    assert!(readings.borrow().is_empty());

    bus.set_offline(false);
    tick(&mut engine, &mut sender, &mut rx, 10 * MS);
    assert_eq!(0, engine.pending_frames());
    assert_eq!(vec![Reading::Value(22.5)], *readings.borrow());
}

const CONFIG: &str = r#"
sender = "CLIENT"
tx_interval_ms = 0

[[sensors]]
name = "Flow temperature"
elster_index = 0x000F
elster_type = "DEC"
target = "HK1"
update_interval = "60s"

[[numbers]]
name = "Comfort temperature"
elster_index = 0x0005
elster_type = "DEC"
target = "HK1"
min_value = 15.0
max_value = 25.0
"#;

#[test]
fn test_engine_from_config() {
    let bus = SimBus::new(vec![SimHeatPump::new(CanMember::Hk1)
        .with_value(0x000F, 225)
        .with_value(COMFORT_TEMP, 200)]);
    let mut sender = bus.new_sender();
    let mut rx = bus.new_receiver();

    let config = BusConfig::load_from_str(CONFIG).unwrap();
    let (mut engine, handles) = Engine::from_config(&config).unwrap();
    assert_eq!(2, handles.len());
    let flow = capture(&mut engine, handles["Flow temperature"]);
    let comfort = handles["Comfort temperature"];

    engine.push_write_value(comfort, 21.0).unwrap();
    tick(&mut engine, &mut sender, &mut rx, 0);

    assert_eq!(vec![Reading::Value(22.5)], *flow.borrow());
    let value = bus.with_member(CanMember::Hk1, |m| m.value(COMFORT_TEMP)).unwrap();
    assert_eq!(Some(210), value);
}

#[test]
fn test_config_with_conflicting_numbers() {
    let config = format!(
        "{CONFIG}
[[numbers]]
name = \"Comfort temperature again\"
elster_index = 0x0005
target = \"HK1\"
min_value = 0.0
max_value = 100.0
"
    );
    let config = BusConfig::load_from_str(&config).unwrap();
    let err = Engine::from_config(&config).unwrap_err();
    assert_eq!("Comfort temperature again", err.name);
    assert_contains!(
        err.to_string().as_str(),
        "Failed to register 'Comfort temperature again'"
    );
    assert!(matches!(
        err.source,
        RegisterError::DuplicateWriteTarget {
            target: CanMember::Hk1,
            index: 0x0005,
            ..
        }
    ));
}
