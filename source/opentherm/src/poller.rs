//! Polling with piggybacking
//!
//! A [FieldPoller] keeps one data id fresh for its [Sink]. Each tick it needs
//! one fresh value. If the value already passed by on the connection since the
//! last tick (for example because the gateway relayed a thermostat's read of the
//! same id), that value is used and the tick sends nothing. Otherwise the tick
//! reads the field itself.
//!
//! For piggybacking to work, the poller must be registered as an observer of
//! the connection it polls, see [Connection::on_frame_observed()].

use core::cell::Cell;

use embassy_time::Duration;

use crate::{
    codec::Value,
    connection::{Connection, FrameObserver},
    field::{read_frame_with, Field},
    frame::Frame,
    Error, Transceiver,
};

/// The default tick interval for pollers and writers
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Whether the peer is answering for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum Health {
    /// The last exchange produced a value
    Ok,
    /// The last exchange got no valid response
    NoResponse,
}

/// The consumer of polled values
pub trait Sink {
    /// A new value was acquired
    fn publish(&self, value: Value);

    /// The field's health changed, or was confirmed
    fn health(&self, health: Health);
}

impl<S: Sink + ?Sized> Sink for &S {
    fn publish(&self, value: Value) {
        S::publish(self, value)
    }

    fn health(&self, health: Health) {
        S::health(self, health)
    }
}

/// How a tick acquired its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum Poll {
    /// An observed frame already satisfied the tick, nothing was sent
    Piggybacked,
    /// A read was sent and answered
    Polled,
    /// A read was sent and not answered
    NoResponse,
    /// A read was answered for a different data id
    Mismatch,
}

/// Keeps a single field fresh
///
/// Reads carry [Field::request] as their payload. A status poll on a boiler
/// that is also controlled by us should carry the master flags, see
/// [Field::with_request()], or the boiler is told to turn everything off.
pub struct FieldPoller<S: Sink> {
    field: Field,
    sink: S,
    stale: Cell<bool>,
}

impl<S: Sink> FieldPoller<S> {
    /// Create a poller, initially stale
    pub fn new(field: Field, sink: S) -> Self {
        Self {
            field,
            sink,
            stale: Cell::new(true),
        }
    }

    /// The polled field
    pub fn field(&self) -> Field {
        self.field
    }

    /// Does the next tick need to send a read?
    pub fn is_stale(&self) -> bool {
        self.stale.get()
    }

    /// Acquire one fresh value
    ///
    /// Sends at most one read. Afterwards the poller is stale again.
    pub async fn tick<T: Transceiver>(
        &self,
        conn: &mut Connection<'_, T>,
    ) -> Result<Poll, Error<T::Error>> {
        let poll = if !self.stale.get() {
            Poll::Piggybacked
        } else {
            match read_frame_with(conn, self.field.id, self.field.request).await? {
                None => {
                    self.sink.health(Health::NoResponse);
                    Poll::NoResponse
                }
                Some(frame) if frame.data_id() != self.field.id => {
                    ot_warn!(
                        "Asked {=str} for data id {=u8}, got {=u8}. Bug?",
                        conn.name(),
                        self.field.id.0,
                        frame.data_id().0
                    );
                    Poll::Mismatch
                }
                Some(frame) => {
                    // Already consumed if we are observing this connection
                    if self.stale.get() {
                        self.consume(frame);
                    }
                    Poll::Polled
                }
            }
        };
        self.stale.set(true);
        Ok(poll)
    }

    fn consume(&self, frame: Frame) {
        let value = self.field.codec.decode(frame.payload());
        self.sink.publish(value);
        self.sink.health(Health::Ok);
        self.stale.set(false);
    }
}

impl<S: Sink> FrameObserver for FieldPoller<S> {
    fn on_frame(&self, frame: Frame) {
        if !frame.is_valid_response() {
            ot_trace!("Poller ignores invalid {=u32:08x}", frame.raw());
            return;
        }
        if frame.data_id() != self.field.id {
            return;
        }
        if self.stale.get() {
            ot_trace!("Data id {=u8} satisfied by observed frame", self.field.id.0);
            self.consume(frame);
        }
    }
}

/// Writes a target value to a field on every tick
pub struct FieldWriter<S: Sink> {
    field: Field,
    sink: S,
    target: Cell<Option<Value>>,
}

impl<S: Sink> FieldWriter<S> {
    /// Create a writer without a target
    pub fn new(field: Field, sink: S) -> Self {
        Self {
            field,
            sink,
            target: Cell::new(None),
        }
    }

    /// The written field
    pub fn field(&self) -> Field {
        self.field
    }

    /// Set the value written from the next tick on
    pub fn set(&self, value: Value) {
        self.target.set(Some(value));
    }

    /// Stop writing
    pub fn clear(&self) {
        self.target.set(None);
    }

    /// The current target
    pub fn target(&self) -> Option<Value> {
        self.target.get()
    }

    /// Write the target, if any
    ///
    /// Returns `None` without sending anything if there is no target, otherwise
    /// whether the write was accepted. Accepted values are published.
    pub async fn tick<T: Transceiver>(
        &self,
        conn: &mut Connection<'_, T>,
    ) -> Result<Option<bool>, Error<T::Error>> {
        let Some(value) = self.target.get() else {
            return Ok(None);
        };
        let accepted = self.field.write(conn, value).await?;
        if accepted {
            self.sink.publish(value);
            self.sink.health(Health::Ok);
        } else {
            self.sink.health(Health::NoResponse);
        }
        Ok(Some(accepted))
    }
}
