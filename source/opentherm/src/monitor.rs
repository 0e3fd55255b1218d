//! Traffic monitor
//!
//! A [TrafficLog] keeps the most recent frames seen on the links. It is fed by
//! [Tap]s, which are registered as observers on each [Connection][crate::connection::Connection].
//!
//! Records render as OTGW-style lines, e.g. `T80000200` for a thermostat
//! request or `B40000200` for a boiler response. Frames that are invalid for
//! their direction are prefixed with `E`.
//!
//! With the `postcard-helpers` feature, records can be encoded with postcard
//! for shipping to a host.

use core::{cell::RefCell, fmt::Write};

use heapless::{Deque, String};

use crate::{connection::FrameObserver, frame::Frame};

/// Which peer sent a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(
    feature = "postcard-helpers",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Origin {
    /// A request from the thermostat
    Thermostat,
    /// A response from the boiler
    Boiler,
}

impl Origin {
    /// The OTGW line prefix
    pub const fn tag(self) -> char {
        match self {
            Origin::Thermostat => 'T',
            Origin::Boiler => 'B',
        }
    }
}

/// One observed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(
    feature = "postcard-helpers",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TrafficRecord {
    /// The sending peer
    pub origin: Origin,
    /// The frame as received
    pub frame: Frame,
}

/// A rendered OTGW line, at most `E` + tag + 8 hex digits
pub type Line = String<10>;

impl TrafficRecord {
    /// Is the frame well-formed for the direction it travelled in?
    pub fn is_valid(&self) -> bool {
        match self.origin {
            Origin::Thermostat => self.frame.is_valid_request(),
            Origin::Boiler => self.frame.is_valid_response(),
        }
    }

    /// Render as an OTGW line
    pub fn render(&self) -> Line {
        let mut line = Line::new();
        // Fits by construction
        let _ = write!(
            line,
            "{}{}{:08X}",
            if self.is_valid() { "" } else { "E" },
            self.origin.tag(),
            self.frame.raw()
        );
        line
    }

    /// Encode the record into `buf`, returning the used part
    #[cfg(feature = "postcard-helpers")]
    pub fn encode<'b>(&self, buf: &'b mut [u8]) -> Option<&'b mut [u8]> {
        postcard::to_slice(self, buf).ok()
    }

    /// Decode a record produced by [TrafficRecord::encode()]
    #[cfg(feature = "postcard-helpers")]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        postcard::from_bytes(bytes).ok()
    }
}

/// A ring of the last `N` observed frames
pub struct TrafficLog<const N: usize> {
    records: RefCell<Deque<TrafficRecord, N>>,
}

impl<const N: usize> TrafficLog<N> {
    /// Create an empty log
    pub const fn new() -> Self {
        Self {
            records: RefCell::new(Deque::new()),
        }
    }

    /// Append a record, dropping the oldest one if full
    pub fn record(&self, origin: Origin, frame: Frame) {
        let mut records = self.records.borrow_mut();
        if records.is_full() {
            records.pop_front();
        }
        let _ = records.push_back(TrafficRecord { origin, frame });
    }

    /// The number of retained records
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Is the log empty?
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// The newest record
    pub fn latest(&self) -> Option<TrafficRecord> {
        self.records.borrow().back().copied()
    }

    /// Remove the oldest record
    pub fn pop(&self) -> Option<TrafficRecord> {
        self.records.borrow_mut().pop_front()
    }
}

impl<const N: usize> Default for TrafficLog<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Feeds a [TrafficLog] from one connection
pub struct Tap<'a, const N: usize> {
    origin: Origin,
    log: &'a TrafficLog<N>,
}

impl<'a, const N: usize> Tap<'a, N> {
    /// Create a tap labelling frames with `origin`
    pub const fn new(origin: Origin, log: &'a TrafficLog<N>) -> Self {
        Self { origin, log }
    }
}

impl<const N: usize> FrameObserver for Tap<'_, N> {
    fn on_frame(&self, frame: Frame) {
        self.log.record(self.origin, frame);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::connection::{Connection, ConnectionConfig};
    use crate::frame::DataId;
    use crate::gateway::Gateway;
    use crate::sim::{block_on, Bus, Reply};

    #[test]
    fn renders_otgw_lines() {
        let request = Frame::read_request(DataId::STATUS, 0x0200);
        let response = request.response(0x0200);
        let t = TrafficRecord {
            origin: Origin::Thermostat,
            frame: request,
        };
        let b = TrafficRecord {
            origin: Origin::Boiler,
            frame: response,
        };
        assert_eq!(t.render().as_str(), "T80000200");
        assert_eq!(b.render().as_str(), "B40000200");

        let none = TrafficRecord {
            origin: Origin::Boiler,
            frame: Frame::NONE,
        };
        assert_eq!(none.render().as_str(), "EB00000000");
    }

    #[test]
    fn log_keeps_the_newest_records() {
        let log = TrafficLog::<2>::new();
        assert!(log.is_empty());
        for raw in 1..=3 {
            log.record(Origin::Boiler, Frame::from_raw(raw));
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.latest().map(|r| r.frame.raw()), Some(3));
        assert_eq!(log.pop().map(|r| r.frame.raw()), Some(2));
        assert_eq!(log.pop().map(|r| r.frame.raw()), Some(3));
        assert_eq!(log.pop(), None);
    }

    #[test]
    fn taps_record_relayed_traffic() {
        let bus = Bus::new();
        let (b_sim, b_binding) = bus.boiler();
        let (t_sim, t_binding) = bus.thermostat();
        let log = TrafficLog::<8>::new();
        let t_tap = Tap::new(Origin::Thermostat, &log);
        let b_tap = Tap::new(Origin::Boiler, &log);
        let gateway = Gateway::new();
        let mut boiler = Connection::new(bus.boiler_config(), b_sim, &b_binding);
        let mut thermostat = Connection::new(ConnectionConfig::thermostat(), t_sim, &t_binding);
        thermostat.on_frame_observed(&t_tap).unwrap();
        gateway.attach(&mut thermostat).unwrap();
        boiler.on_frame_observed(&b_tap).unwrap();

        let request = Frame::read_request(DataId::TRET, 0);
        bus.script_boiler([Reply::Answer(0x2800)]);
        bus.thermostat_sends(request);
        block_on(gateway.step(&mut boiler, &mut thermostat)).unwrap();

        let lines: std::vec::Vec<_> = core::iter::from_fn(|| log.pop())
            .map(|r| r.render())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].as_str(), "T801C0000");
        assert_eq!(lines[1].as_str(), "B401C2800");
    }

    #[cfg(feature = "postcard-helpers")]
    #[test]
    fn records_encode_with_postcard() {
        let record = TrafficRecord {
            origin: Origin::Boiler,
            frame: Frame::read_request(DataId::TBOILER, 0).response(0x2D00),
        };
        let mut buf = [0u8; 16];
        let used = record.encode(&mut buf).unwrap();
        assert_eq!(used[0], 1);
        let len = used.len();
        assert_eq!(TrafficRecord::decode(&buf[..len]), Some(record));

        assert_eq!(record.encode(&mut [0u8; 2]), None);
    }
}
