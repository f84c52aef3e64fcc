#![allow(dead_code)]
use std::{cell::RefCell, rc::Rc};

use elster_common::{frame::Dump, traits::AsyncCanReceiver};
use elster_node::{Engine, EndpointHandle, Reading};
use integration_tests::sim_bus::{SimBusReceiver, SimBusSender};

pub const MS: u64 = 1_000;
pub const SECOND: u64 = 1_000_000;

/// Hand every message waiting in `rx` to the engine
pub fn drain(engine: &mut Engine, rx: &mut SimBusReceiver) {
    while let Ok(Some(msg)) = rx.try_recv() {
        engine.handle_message(msg);
    }
}

/// Process the engine at `now_us`, and deliver any replies
pub fn tick(engine: &mut Engine, sender: &mut SimBusSender, rx: &mut SimBusReceiver, now_us: u64) {
    engine.process(now_us, sender);
    drain(engine, rx);
}

/// Tick the engine every `step_us` from `start_us` through `end_us`
pub fn run_ticks(
    engine: &mut Engine,
    sender: &mut SimBusSender,
    rx: &mut SimBusReceiver,
    start_us: u64,
    end_us: u64,
    step_us: u64,
) {
    let mut now_us = start_us;
    while now_us <= end_us {
        tick(engine, sender, rx, now_us);
        now_us += step_us;
    }
}

/// Collect every reading delivered for an endpoint
pub fn capture(engine: &mut Engine, handle: EndpointHandle) -> Rc<RefCell<Vec<Reading>>> {
    let readings = Rc::new(RefCell::new(Vec::new()));
    let sink = readings.clone();
    engine
        .on_value_decoded(handle, move |r| sink.borrow_mut().push(r))
        .unwrap();
    readings
}

/// Prints the message history of the bus when dropped
pub struct BusLogger {
    rx: SimBusReceiver,
}

impl BusLogger {
    pub fn new(rx: SimBusReceiver) -> Self {
        Self { rx }
    }

    pub fn print(&mut self) {
        println!("Bus message history");
        println!("-------------------");
        while let Ok(Some(msg)) = self.rx.try_recv() {
            println!("{}", Dump(&msg));
        }
    }
}

impl Drop for BusLogger {
    fn drop(&mut self) {
        self.print();
    }
}
