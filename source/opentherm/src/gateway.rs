//! Gateway relay
//!
//! The [Gateway] sits between a thermostat and a boiler. Requests from the
//! thermostat are latched as they arrive, forwarded to the boiler, and the
//! boiler's answer is handed back to the thermostat.
//!
//! The relay never fabricates an answer. If the boiler stays silent, the
//! thermostat is sent [Frame::NONE], which it will treat as a missing
//! response.
//!
//! The gateway can be driven two ways:
//!
//! * [Gateway::step()] from a periodic tick, after [Gateway::attach()]
//! * [Gateway::run()] as a dedicated task, relaying as soon as a request arrives

use core::cell::Cell;

use crate::{
    connection::{Connection, FrameObserver},
    frame::Frame,
    Error, Transceiver,
};

/// An error on either side of the relay
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[non_exhaustive]
pub enum RelayError<B, T> {
    /// The boiler-side transceiver failed
    Boiler(Error<B>),
    /// The thermostat-side transceiver failed
    Thermostat(Error<T>),
}

/// Relay state: the pending request and the last exchange
pub struct Gateway {
    pending: Cell<Option<Frame>>,
    last_request: Cell<Option<Frame>>,
    last_response: Cell<Option<Frame>>,
}

impl Gateway {
    /// Create an idle gateway
    pub const fn new() -> Self {
        Self {
            pending: Cell::new(None),
            last_request: Cell::new(None),
            last_response: Cell::new(None),
        }
    }

    /// Subscribe to the requests arriving on the thermostat connection
    pub fn attach<'a, T: Transceiver>(
        &'a self,
        thermostat: &mut Connection<'a, T>,
    ) -> Result<(), Error<T::Error>> {
        thermostat.on_frame_observed(self)
    }

    /// The most recent request from the thermostat
    pub fn last_request(&self) -> Option<Frame> {
        self.last_request.get()
    }

    /// The most recent answer from the boiler
    ///
    /// [Frame::NONE] if the boiler did not answer the last forwarded request.
    pub fn last_response(&self) -> Option<Frame> {
        self.last_response.get()
    }

    /// Is a request waiting to be forwarded?
    pub fn is_pending(&self) -> bool {
        self.pending.get().is_some()
    }

    /// Pump the thermostat connection, then relay a pending request
    ///
    /// Returns the relayed answer, or `None` if no request was pending.
    pub async fn step<B, T>(
        &self,
        boiler: &mut Connection<'_, B>,
        thermostat: &mut Connection<'_, T>,
    ) -> Result<Option<Frame>, RelayError<B::Error, T::Error>>
    where
        B: Transceiver,
        T: Transceiver,
    {
        thermostat.process();
        self.forward(boiler, thermostat).await
    }

    /// Relay every request as soon as it arrives
    ///
    /// Transceiver failures while relaying are logged and the relay carries
    /// on with the next request. Only returns if the thermostat connection can
    /// not receive at all, e.g. because it was not set up as [Role::Slave][crate::Role::Slave].
    /// The gateway does not need to be attached for this.
    pub async fn run<B, T>(
        &self,
        boiler: &mut Connection<'_, B>,
        thermostat: &mut Connection<'_, T>,
    ) -> Result<(), RelayError<B::Error, T::Error>>
    where
        B: Transceiver,
        T: Transceiver,
    {
        loop {
            let request = thermostat
                .next_frame()
                .await
                .map_err(RelayError::Thermostat)?;
            // Attached gateways have already latched the request
            if !self.is_pending() {
                self.on_frame(request);
            }
            if self.forward(boiler, thermostat).await.is_err() {
                ot_error!("Relay of {=u32:08x} failed", request.raw());
            }
        }
    }

    async fn forward<B, T>(
        &self,
        boiler: &mut Connection<'_, B>,
        thermostat: &mut Connection<'_, T>,
    ) -> Result<Option<Frame>, RelayError<B::Error, T::Error>>
    where
        B: Transceiver,
        T: Transceiver,
    {
        let Some(request) = self.pending.take() else {
            return Ok(None);
        };

        let (response, boiler_err) = match boiler.send_request(request).await {
            Ok(response) => (response, None),
            Err(e) => (Frame::NONE, Some(e)),
        };
        self.last_response.set(Some(response));

        if response == Frame::NONE {
            ot_warn!(
                "No answer from {=str} to {=u32:08x}",
                boiler.name(),
                request.raw()
            );
        }
        // The thermostat gets an answer even if the boiler link failed
        let answered = thermostat.send_response(response).await;
        if let Some(e) = boiler_err {
            return Err(RelayError::Boiler(e));
        }
        answered.map_err(RelayError::Thermostat)?;
        Ok(Some(response))
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameObserver for Gateway {
    fn on_frame(&self, frame: Frame) {
        if !frame.is_valid_request() {
            ot_warn!("Relaying malformed request {=u32:08x}", frame.raw());
        }
        if let Some(dropped) = self.pending.replace(Some(frame)) {
            ot_warn!("Request {=u32:08x} was never relayed", dropped.raw());
        }
        self.last_request.set(Some(frame));
    }
}
