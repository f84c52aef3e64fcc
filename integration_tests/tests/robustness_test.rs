use std::time::Duration;

use elster_common::{traits::CanSender, CanId, CanMember, CanMessage, ElsterType};
use elster_node::{Engine, Reading};
use integration_tests::sim_bus::SimBus;

mod utils;
use utils::{capture, drain};

fn setup() -> (Engine, std::rc::Rc<std::cell::RefCell<Vec<Reading>>>) {
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
    (engine, readings)
}

#[test]
fn test_malformed_frames_are_dropped() {
    let bus = SimBus::new(vec![]);
    let mut rx = bus.new_receiver();
    let mut device = bus.new_sender();
    let (mut engine, readings) = setup();

    let hk1 = CanId::std(0x601);
    let frames = [
        // Too short
        CanMessage::new(hk1, &[0xD2, 0x22]),
        // Too long
        CanMessage::new(hk1, &[0xD2, 0x22, 0xFA, 0x00, 0x0F, 0x00, 0xE1, 0x00]),
        // Extended index form without the index
        CanMessage::new(hk1, &[0xD2, 0x22, 0xFA, 0x00]),
        // Not a bus member
        CanMessage::new(CanId::std(0x123), &[0xD2, 0x22, 0xFA, 0x00, 0x0F, 0x00, 0xE1]),
        CanMessage::new(
            CanId::extended(0x601),
            &[0xD2, 0x22, 0xFA, 0x00, 0x0F, 0x00, 0xE1],
        ),
        // A read request, not a response
        CanMessage::new(hk1, &[0xD1, 0x22, 0xFA, 0x00, 0x0F, 0x00, 0x00]),
        // A response for an index nobody asked for
        CanMessage::new(hk1, &[0xD2, 0x22, 0xFA, 0x00, 0x10, 0x00, 0xE1]),
    ];
    for msg in frames {
        device.send(msg).unwrap();
    }
    drain(&mut engine, &mut rx);

    let stats = engine.stats();
    assert_eq!(7, stats.frames_received);
    assert_eq!(3, stats.invalid_frames);
    assert_eq!(2, stats.unknown_member);
    assert_eq!(1, stats.ignored_kind);
    assert_eq!(1, stats.unmatched);
    assert!(readings.borrow().is_empty());
}

#[test]
fn test_response_without_value() {
    let bus = SimBus::new(vec![]);
    let mut rx = bus.new_receiver();
    let mut device = bus.new_sender();
    let (mut engine, readings) = setup();

    let hk1 = CanId::std(0x601);
    // Extended form, truncated before the value
    device
        .send(CanMessage::new(hk1, &[0xD2, 0x22, 0xFA, 0x00, 0x0F]))
        .unwrap();
    // Short form with the unavailable sentinel
    device
        .send(CanMessage::new(hk1, &[0xD2, 0x22, 0x0F, 0x80, 0x00]))
        .unwrap();
    // Short form carrying a value
    device
        .send(CanMessage::new(hk1, &[0xD2, 0x22, 0x0F, 0x00, 0xE1]))
        .unwrap();
    drain(&mut engine, &mut rx);

    assert_eq!(
        vec![
            Reading::Unavailable,
            Reading::Unavailable,
            Reading::Value(22.5)
        ],
        *readings.borrow()
    );
    assert_eq!(2, engine.stats().unavailable);
}

#[test]
fn test_random_frames() {
    let bus = SimBus::new(vec![]);
    let mut rx = bus.new_receiver();
    let mut device = bus.new_sender();
    let (mut engine, _readings) = setup();

    // Deterministic pseudo random frames from members and strangers
    let mut state: u32 = 0x1234_5678;
    let mut next = move || {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (state >> 16) as u8
    };
    let ids = [0x601, 0x180, 0x480, 0x123, 0x6A2];
    for _ in 0..1000 {
        let id = ids[next() as usize % ids.len()];
        let len = next() as usize % 9;
        let data: Vec<u8> = (0..len).map(|_| next()).collect();
        device.send(CanMessage::new(CanId::std(id), &data)).unwrap();
    }
    drain(&mut engine, &mut rx);

    let stats = engine.stats();
    assert_eq!(1000, stats.frames_received);
    assert!(stats.invalid_frames > 0);
    assert!(stats.unknown_member > 0);
}
