use std::time::Duration;

use elster_common::{traits::CanSender, CanMember, ElsterFrame, ElsterType};
use elster_node::{Engine, Reading};
use integration_tests::{heat_pump::SimHeatPump, sim_bus::SimBus};

mod utils;
use utils::{capture, run_ticks, tick, BusLogger, MS, SECOND};

fn minute() -> Duration {
    Duration::from_secs(60)
}

#[test]
fn test_sensors_polled_and_decoded() {
    let bus = SimBus::new(vec![
        SimHeatPump::new(CanMember::Hk1)
            .with_value(0x000F, 225)
            .with_value(0x0011, 0xFFEC),
        SimHeatPump::new(CanMember::Wpm)
            .with_value(0x01A3, 1234)
            .with_value(0x0016, 4567),
    ]);
    let _logger = BusLogger::new(bus.new_receiver());
    let mut sender = bus.new_sender();
    let mut rx = bus.new_receiver();

    let mut engine = Engine::new(CanMember::Client, Duration::ZERO);
    let flow = engine
        .register_read_endpoint(CanMember::Hk1, 0x000F, ElsterType::Dec, minute())
        .unwrap();
    let outside = engine
        .register_read_endpoint(CanMember::Hk1, 0x0011, ElsterType::Dec, minute())
        .unwrap();
    let hours = engine
        .register_read_endpoint(CanMember::Wpm, 0x01A3, ElsterType::Default, minute())
        .unwrap();
    let pressure = engine
        .register_read_endpoint(CanMember::Wpm, 0x0016, ElsterType::Cent, minute())
        .unwrap();
    let flow_readings = capture(&mut engine, flow);
    let outside_readings = capture(&mut engine, outside);
    let hours_readings = capture(&mut engine, hours);
    let pressure_readings = capture(&mut engine, pressure);

    assert_eq!(vec![0x480, 0x601], engine.filter_hint());

    tick(&mut engine, &mut sender, &mut rx, 0);

    assert_eq!(vec![Reading::Value(22.5)], *flow_readings.borrow());
    assert_eq!(vec![Reading::Value(-2.0)], *outside_readings.borrow());
    assert_eq!(vec![Reading::Value(1234.0)], *hours_readings.borrow());
    assert_eq!(vec![Reading::Value(45.67)], *pressure_readings.borrow());

    let stats = engine.stats();
    assert_eq!(4, stats.frames_sent);
    assert_eq!(4, stats.values_decoded);
    // The engine hears its own requests on the simulated bus
    assert_eq!(4, stats.ignored_kind);
}

#[test]
fn test_unavailable_value() {
    let bus = SimBus::new(vec![SimHeatPump::new(CanMember::Hk1)]);
    let mut sender = bus.new_sender();
    let mut rx = bus.new_receiver();

    let mut engine = Engine::new(CanMember::Client, Duration::ZERO);
    let handle = engine
        .register_read_endpoint(CanMember::Hk1, 0x0101, ElsterType::Dec, minute())
        .unwrap();
    let readings = capture(&mut engine, handle);

    tick(&mut engine, &mut sender, &mut rx, 0);

    assert_eq!(vec![Reading::Unavailable], *readings.borrow());
    assert_eq!(1, engine.stats().unavailable);
}

#[test]
fn test_poll_intervals() {
    let bus = SimBus::new(vec![SimHeatPump::new(CanMember::Hk1)
        .with_value(0x000F, 225)
        .with_value(0x0005, 200)]);
    let mut sender = bus.new_sender();
    let mut rx = bus.new_receiver();

    let mut engine = Engine::new(CanMember::Client, Duration::ZERO);
    let sensor = engine
        .register_read_endpoint(CanMember::Hk1, 0x000F, ElsterType::Dec, minute())
        .unwrap();
    engine
        .register_write_endpoint(
            CanMember::Hk1,
            0x0005,
            ElsterType::Dec,
            Duration::from_secs(30),
            15.0,
            25.0,
        )
        .unwrap();
    let readings = capture(&mut engine, sensor);

    run_ticks(&mut engine, &mut sender, &mut rx, 0, 300 * SECOND, 100 * MS);

    let reads = bus.with_member(CanMember::Hk1, |m| m.reads().to_vec()).unwrap();
    assert_eq!(6, reads.iter().filter(|i| **i == 0x000F).count());
    assert_eq!(11, reads.iter().filter(|i| **i == 0x0005).count());
    assert_eq!(6, readings.borrow().len());
}

#[test]
fn test_transmit_pacing() {
    let bus = SimBus::new(vec![SimHeatPump::new(CanMember::Hk1)]);
    let mut sender = bus.new_sender();
    let mut rx = bus.new_receiver();

    let mut engine = Engine::new(CanMember::Client, Duration::from_millis(50));
    for index in 0..5 {
        engine
            .register_read_endpoint(CanMember::Hk1, index, ElsterType::Dec, minute())
            .unwrap();
    }

    run_ticks(&mut engine, &mut sender, &mut rx, 0, 120 * MS, 10 * MS);
    let reads = bus.with_member(CanMember::Hk1, |m| m.reads().to_vec()).unwrap();
    assert_eq!(vec![0, 1, 2], reads);
    assert_eq!(2, engine.pending_frames());

    run_ticks(&mut engine, &mut sender, &mut rx, 130 * MS, 200 * MS, 10 * MS);
    let reads = bus.with_member(CanMember::Hk1, |m| m.reads().to_vec()).unwrap();
    assert_eq!(vec![0, 1, 2, 3, 4], reads);
    assert_eq!(0, engine.pending_frames());
}

#[test]
fn test_responses_to_other_receivers_are_used() {
    let bus = SimBus::new(vec![]);
    let mut rx = bus.new_receiver();
    let mut other_device = bus.new_sender();

    let mut engine = Engine::new(CanMember::Client, Duration::ZERO);
    let handle = engine
        .register_read_endpoint(CanMember::Hk1, 0x000F, ElsterType::Dec, minute())
        .unwrap();
    let readings = capture(&mut engine, handle);

    // A room control unit polls the heating circuit, and the gateway listens in
    let response = ElsterFrame::response(CanMember::Hk1, CanMember::Fet, 0x000F, [0x00, 0xD7]);
    other_device.send(response.into()).unwrap();
    utils::drain(&mut engine, &mut rx);

    assert_eq!(vec![Reading::Value(21.5)], *readings.borrow());
}

#[test]
fn test_short_form_responses() {
    let bus = SimBus::new(vec![SimHeatPump::new(CanMember::Kessel)
        .with_value(0x000C, 0x0123)
        .with_short_form()]);
    let mut sender = bus.new_sender();
    let mut rx = bus.new_receiver();

    let mut engine = Engine::new(CanMember::Client, Duration::ZERO);
    let handle = engine
        .register_read_endpoint(CanMember::Kessel, 0x000C, ElsterType::Dec, minute())
        .unwrap();
    let readings = capture(&mut engine, handle);

    tick(&mut engine, &mut sender, &mut rx, 0);

    assert_eq!(vec![Reading::Value(29.1)], *readings.borrow());
}

#[test]
fn test_unregistered_endpoint_is_silent() {
    let bus = SimBus::new(vec![SimHeatPump::new(CanMember::Hk1).with_value(0x000F, 225)]);
    let mut sender = bus.new_sender();
    let mut rx = bus.new_receiver();

    let mut engine = Engine::new(CanMember::Client, Duration::ZERO);
    let handle = engine
        .register_read_endpoint(CanMember::Hk1, 0x000F, ElsterType::Dec, minute())
        .unwrap();
    let readings = capture(&mut engine, handle);
    tick(&mut engine, &mut sender, &mut rx, 0);
    assert!(engine.unregister(handle).is_some());

    run_ticks(&mut engine, &mut sender, &mut rx, SECOND, 180 * SECOND, SECOND);

    assert_eq!(1, readings.borrow().len());
    let reads = bus.with_member(CanMember::Hk1, |m| m.reads().len()).unwrap();
    assert_eq!(1, reads);
    assert!(engine.filter_hint().is_empty());
}
