//! Simulated Elster bus for end-to-end tests of the engine
pub mod heat_pump;
pub mod sim_bus;
