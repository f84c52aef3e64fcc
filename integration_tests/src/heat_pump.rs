//! Simulated bus members
//!
//! A [SimHeatPump] answers read requests addressed to it from a table of raw values, and applies
//! write requests to the table.
use std::collections::{BTreeMap, BTreeSet};

use elster_common::{
    address::{header_for, MessageKind, EXTENDED_INDEX},
    frame::VALUE_UNAVAILABLE,
    CanId, CanMember, CanMessage, ElsterFrame,
};

#[derive(Debug, Clone)]
pub struct SimHeatPump {
    member: CanMember,
    values: BTreeMap<u16, u16>,
    read_only: BTreeSet<u16>,
    writes: Vec<(u16, u16)>,
    reads: Vec<u16>,
    short_form: bool,
}

impl SimHeatPump {
    pub fn new(member: CanMember) -> Self {
        Self {
            member,
            values: BTreeMap::new(),
            read_only: BTreeSet::new(),
            writes: Vec::new(),
            reads: Vec::new(),
            short_form: false,
        }
    }

    pub fn with_value(mut self, index: u16, raw: u16) -> Self {
        self.values.insert(index, raw);
        self
    }

    /// Writes to `index` are accepted on the bus, but do not change the value
    pub fn with_read_only(mut self, index: u16) -> Self {
        self.read_only.insert(index);
        self
    }

    /// Answer with the short index form where the index fits in one byte
    pub fn with_short_form(mut self) -> Self {
        self.short_form = true;
        self
    }

    pub fn member(&self) -> CanMember {
        self.member
    }

    pub fn value(&self, index: u16) -> Option<u16> {
        self.values.get(&index).copied()
    }

    pub fn set_value(&mut self, index: u16, raw: u16) {
        self.values.insert(index, raw);
    }

    /// Every write received, as (index, raw value)
    pub fn writes(&self) -> &[(u16, u16)] {
        &self.writes
    }

    /// The index of every read request received
    pub fn reads(&self) -> &[u16] {
        &self.reads
    }

    /// Handle a message seen on the bus, and return the reply if there is one
    pub fn handle_message(&mut self, msg: CanMessage) -> Option<CanMessage> {
        let frame = ElsterFrame::try_from(msg).ok()?;
        if frame.receiver != Some(self.member.can_id()) {
            return None;
        }
        match frame.kind {
            MessageKind::Read => {
                self.reads.push(frame.index);
                let raw = self.value(frame.index).unwrap_or(VALUE_UNAVAILABLE);
                Some(self.reply(frame.sender, frame.index, raw))
            }
            MessageKind::Write => {
                let raw = frame.raw_value()?;
                self.writes.push((frame.index, raw));
                if !self.read_only.contains(&frame.index) {
                    self.values.insert(frame.index, raw);
                }
                None
            }
            _ => None,
        }
    }

    fn reply(&self, receiver: CanMember, index: u16, raw: u16) -> CanMessage {
        let [v0, v1] = raw.to_be_bytes();
        if self.short_form && index < EXTENDED_INDEX as u16 {
            let [h0, h1] = header_for(receiver.can_id(), MessageKind::Response);
            CanMessage::new(
                CanId::std(self.member.can_id()),
                &[h0, h1, index as u8, v0, v1],
            )
        } else {
            ElsterFrame::response(self.member, receiver, index, [v0, v1]).into()
        }
    }
}
