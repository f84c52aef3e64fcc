//! Reassembly of composite values
//!
//! A frame carries a single 16-bit value. Larger counters, such as energy totals, are spread over
//! two or three consecutive indices holding three decimal digits each. The parts of one polling
//! cycle are collected here until all of them have arrived.
use elster_common::ElsterType;

const MAX_PARTS: usize = 3;

/// Collects the parts of one composite value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeParts {
    elster_type: ElsterType,
    parts: [Option<f64>; MAX_PARTS],
}

impl CompositeParts {
    /// Create an empty collector for `elster_type`
    pub fn new(elster_type: ElsterType) -> Self {
        Self {
            elster_type,
            parts: [None; MAX_PARTS],
        }
    }

    /// Forget all collected parts
    pub fn reset(&mut self) {
        self.parts = [None; MAX_PARTS];
    }

    /// Store the value of part `part`
    ///
    /// Returns the combined value if every part is known after the update. Parts outside the type
    /// are ignored.
    pub fn update(&mut self, part: usize, value: f64) -> Option<f64> {
        let count = self.elster_type.parts();
        if part >= count {
            return None;
        }
        self.parts[part] = Some(value);

        let mut values = [0.0; MAX_PARTS];
        for (dst, src) in values.iter_mut().zip(&self.parts[..count]) {
            *dst = (*src)?;
        }
        self.elster_type.combine(&values[..count])
    }
}
