//! # OpenTherm Gateway
//!
//! The core of an OpenTherm gateway. OpenTherm is the two-wire, half-duplex,
//! point-to-point protocol spoken between a room thermostat (the master) and a
//! boiler (the slave). Every transaction is a single 32-bit request frame from
//! the master, answered by a single 32-bit response frame from the slave.
//!
//! A gateway sits in the middle of that wire, with two physical links:
//!
//! 1. Toward the boiler, where the gateway acts as the master
//! 2. Toward the thermostat, where the gateway acts as the slave
//!
//! It relays every thermostat request to the boiler and every boiler answer
//! back to the thermostat, while also reading (and optionally writing) boiler
//! variables on its own behalf.
//!
//! ## Layers
//!
//! * [frame] and [codec]: the 32-bit frame, and the payload encodings
//! * [binding]: dispatch of pin-change interrupts to a fixed number of links
//! * [connection]: one link as seen from the main context, with blocking and
//!   async exchanges, and observers of arriving frames
//! * [gateway]: the thermostat to boiler relay
//! * [field] and [poller]: typed access to single data ids, with polls that
//!   piggyback on relayed traffic
//! * [boiler]: our own control writes, in standalone mode or on top of the relay
//! * [monitor]: an OTGW-style log of observed traffic
//!
//! ## Interrupts
//!
//! The bit-level transceiver is not part of this crate. It is split into two
//! halves:
//!
//! * The [EdgeSampler][binding::EdgeSampler], driven from the pin-change
//!   interrupt, which reports complete frames to its link's
//!   [LinkPort][binding::LinkPort]
//! * The [Transceiver], which sends frames from the main context
//!
//! Interrupt controllers only take a bare `fn()` as a handler, so links are
//! bound to the slots of a [LinkTable][binding::LinkTable], each with its own
//! handler. At most [MAX_LINKS][binding::MAX_LINKS] links can be bound.
//!
//! ## Timing
//!
//! The slave has to answer within 800ms. A master exchange that runs out of
//! time produces [Frame::NONE][frame::Frame::NONE], which is never a valid
//! response. Nothing is retried: the next tick simply asks again.
//!
//! ## Example
//!
//! A gateway task, once both links are bound:
//!
//! ```rust,ignore
//! let gateway = Gateway::new();
//! let mut boiler = Connection::new(ConnectionConfig::boiler(), boiler_tx, &boiler_link);
//! let mut thermostat = Connection::new(ConnectionConfig::thermostat(), thermostat_tx, &thermostat_link);
//! gateway.run(&mut boiler, &mut thermostat).await?;
//! ```

#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]
#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod binding;
pub mod boiler;
pub mod codec;
pub mod connection;
pub mod field;
pub mod frame;
pub mod gateway;
pub mod monitor;
pub mod poller;
#[cfg(test)]
mod sim;

pub use crate::{
    binding::{bind_link, BindError, Binding, EdgeSampler, LinkPort, LinkTable},
    connection::{Connection, ConnectionConfig, FrameObserver, Role},
    frame::{DataId, Frame, MessageType},
    gateway::Gateway,
};

/// An error on a [Connection]
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error<E> {
    /// Some error with the underlying transceiver
    Transceiver(E),
    /// The operation is not available in the connection's [Role]
    WrongRole,
    /// All observer slots of the connection are taken
    ObserversFull,
}

impl<E> From<E> for Error<E> {
    fn from(value: E) -> Self {
        Self::Transceiver(value)
    }
}

/// The main-context half of an OpenTherm transceiver
pub trait Transceiver {
    /// The error type of the underlying hardware
    type Error;

    /// Send a single frame.
    ///
    /// The future MUST not return until the frame is completely on the wire.
    /// Any answer is reported by the link's [EdgeSampler] through its
    /// [LinkPort], not by this function.
    ///
    /// This function MUST be cancellation safe, returning the line to idle.
    async fn transmit(&mut self, frame: Frame) -> Result<(), Error<Self::Error>>;
}
