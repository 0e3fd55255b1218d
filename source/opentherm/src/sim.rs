//! A simulated pair of OpenTherm links for tests
//!
//! Replies are delivered the same way real hardware delivers them: the
//! simulated wire holds the frame, and the bound slot's interrupt handler is
//! invoked through [LinkTable::on_interrupt()].

use core::cell::{Cell, RefCell};
use std::{boxed::Box, collections::BTreeMap, collections::VecDeque, sync::Mutex, vec::Vec};

use embassy_time::Duration;

use crate::{
    binding::{Binding, EdgeSampler, LinkPort, LinkTable},
    connection::ConnectionConfig,
    frame::{DataId, Frame, MessageType},
    Error, Transceiver,
};

pub(crate) use futures::executor::block_on;

/// Response timeout used by simulated master connections
pub(crate) const SIM_TIMEOUT: Duration = Duration::from_millis(10);

/// How the simulated boiler answers the next request
#[derive(Debug, Clone, Copy)]
pub(crate) enum Reply {
    /// Answer with the paired response carrying this payload
    Answer(u16),
    /// Answer with exactly this frame
    Frame(Frame),
    /// Do not answer at all
    Silent,
}

#[derive(Debug, PartialEq)]
pub(crate) enum SimError {
    Broken,
}

struct SimWire {
    pending: Mutex<Option<Frame>>,
}

impl EdgeSampler for SimWire {
    fn on_edge(&self, port: &LinkPort) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(frame) = pending.take() {
                port.frame_received(frame);
            }
        }
    }
}

#[derive(Default)]
struct SideState {
    sent: Vec<Frame>,
    script: VecDeque<Reply>,
    registers: BTreeMap<u8, u16>,
    broken: bool,
}

struct Side {
    wire: SimWire,
    index: Cell<Option<usize>>,
    state: RefCell<SideState>,
}

impl Side {
    fn leak() -> &'static Side {
        Box::leak(Box::new(Side {
            wire: SimWire {
                pending: Mutex::new(None),
            },
            index: Cell::new(None),
            state: RefCell::new(SideState::default()),
        }))
    }

    /// Put a frame on the wire and raise the pin interrupt
    fn deliver(&self, table: &LinkTable, frame: Frame) {
        let index = self.index.get().expect("side is not bound");
        *self.wire.pending.lock().unwrap() = Some(frame);
        table.on_interrupt(index);
    }
}

/// The transceiver half of one simulated link
pub(crate) struct SimTransceiver {
    side: &'static Side,
    table: &'static LinkTable,
    answers: bool,
}

impl Transceiver for SimTransceiver {
    type Error = SimError;

    async fn transmit(&mut self, frame: Frame) -> Result<(), Error<SimError>> {
        let reply = {
            let mut state = self.side.state.borrow_mut();
            if state.broken {
                return Err(SimError::Broken.into());
            }
            state.sent.push(frame);
            if !self.answers {
                return Ok(());
            }
            respond(&mut state, frame)
        };
        if let Some(reply) = reply {
            self.side.deliver(self.table, reply);
        }
        Ok(())
    }
}

fn respond(state: &mut SideState, request: Frame) -> Option<Frame> {
    if let Some(scripted) = state.script.pop_front() {
        return match scripted {
            Reply::Answer(payload) => Some(request.response(payload)),
            Reply::Frame(frame) => Some(frame),
            Reply::Silent => None,
        };
    }

    let id = request.data_id();
    match request.message_type() {
        MessageType::ReadData => Some(match state.registers.get(&id.0) {
            Some(value) => request.response(*value),
            None => Frame::build(MessageType::UnknownDataId, id, 0),
        }),
        MessageType::WriteData => {
            state.registers.insert(id.0, request.payload());
            Some(request.response(request.payload()))
        }
        _ => None,
    }
}

/// A boiler link and a thermostat link sharing one private link table
pub(crate) struct Bus {
    table: &'static LinkTable,
    boiler: &'static Side,
    thermostat: &'static Side,
}

impl Bus {
    pub(crate) fn new() -> Self {
        Self {
            table: Box::leak(Box::new(LinkTable::new())),
            boiler: Side::leak(),
            thermostat: Side::leak(),
        }
    }

    fn bind(&self, side: &'static Side, answers: bool) -> (SimTransceiver, Binding) {
        let binding = self.table.bind(&side.wire).unwrap();
        side.index.set(Some(binding.index()));
        let sim = SimTransceiver {
            side,
            table: self.table,
            answers,
        };
        (sim, binding)
    }

    /// Bind the link toward the simulated boiler
    pub(crate) fn boiler(&self) -> (SimTransceiver, Binding) {
        self.bind(self.boiler, true)
    }

    /// Bind the link toward the simulated thermostat
    pub(crate) fn thermostat(&self) -> (SimTransceiver, Binding) {
        self.bind(self.thermostat, false)
    }

    /// Settings for the boiler link with a short response timeout
    pub(crate) fn boiler_config(&self) -> ConnectionConfig {
        ConnectionConfig::boiler().with_response_timeout(SIM_TIMEOUT)
    }

    /// Queue replies for the next requests. Afterwards, the registers answer.
    pub(crate) fn script_boiler<I: IntoIterator<Item = Reply>>(&self, replies: I) {
        self.boiler.state.borrow_mut().script.extend(replies);
    }

    pub(crate) fn set_register(&self, id: DataId, payload: u16) {
        self.boiler.state.borrow_mut().registers.insert(id.0, payload);
    }

    pub(crate) fn register(&self, id: DataId) -> Option<u16> {
        self.boiler.state.borrow().registers.get(&id.0).copied()
    }

    pub(crate) fn break_boiler(&self) {
        self.boiler.state.borrow_mut().broken = true;
    }

    pub(crate) fn repair_boiler(&self) {
        self.boiler.state.borrow_mut().broken = false;
    }

    /// Every request sent to the boiler so far
    pub(crate) fn boiler_sent(&self) -> Vec<Frame> {
        self.boiler.state.borrow().sent.clone()
    }

    /// Every response sent to the thermostat so far
    pub(crate) fn thermostat_received(&self) -> Vec<Frame> {
        self.thermostat.state.borrow().sent.clone()
    }

    /// The thermostat puts a request on the wire
    pub(crate) fn thermostat_sends(&self, frame: Frame) {
        self.thermostat.deliver(self.table, frame);
    }
}
