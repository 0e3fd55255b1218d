//! Connection
//!
//! A [Connection] is the main-context face of one bound link. It owns the
//! link's [Transceiver], knows which [Role] the local device plays on that
//! link, and fans every arriving frame out to its [FrameObserver]s.
//!
//! Only one exchange is ever in flight on a connection. Blocking exchanges
//! ([Connection::send_request()]) wait for the response or the response timeout.
//! Async exchanges ([Connection::send_request_async()]) are completed later by
//! [Connection::process()].

use embassy_time::{with_timeout, Duration, Instant, TimeoutError};

use crate::{
    binding::{Binding, LinkPort},
    frame::Frame,
    Error, Transceiver,
};

/// Time a master waits for the slave's response
///
/// OpenTherm allows the slave 800ms to answer a request.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(800);

/// The maximum number of observers per connection
pub const MAX_OBSERVERS: usize = 4;

/// The role the local device plays on a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum Role {
    /// We are the master: the peer is a boiler, we send requests
    Master,
    /// We are the slave: the peer is a thermostat, we answer its requests
    Slave,
}

/// Connection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Name of the peer, e.g. "boiler" or "thermostat". Used for logging.
    pub name: &'static str,
    /// The local role on this link
    pub role: Role,
    /// How long a master waits for a response
    pub response_timeout: Duration,
}

impl ConnectionConfig {
    /// Settings with the default [RESPONSE_TIMEOUT]
    pub const fn new(name: &'static str, role: Role) -> Self {
        Self {
            name,
            role,
            response_timeout: RESPONSE_TIMEOUT,
        }
    }

    /// Settings for the link toward a real boiler
    pub const fn boiler() -> Self {
        Self::new("boiler", Role::Master)
    }

    /// Settings for the link toward a real thermostat
    pub const fn thermostat() -> Self {
        Self::new("thermostat", Role::Slave)
    }

    /// Override the response timeout
    pub const fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

/// Something interested in the frames arriving on a [Connection]
///
/// Observers are called from the main context, after an exchange has
/// finished. They see requests on [Role::Slave] connections and responses on
/// [Role::Master] connections.
pub trait FrameObserver {
    /// A frame arrived
    fn on_frame(&self, frame: Frame);
}

/// The main-context interface of one link
pub struct Connection<'a, T: Transceiver> {
    config: ConnectionConfig,
    transceiver: T,
    port: &'static LinkPort,
    observers: heapless::Vec<&'a dyn FrameObserver, MAX_OBSERVERS>,
    in_flight: Option<Instant>,
}

impl<'a, T: Transceiver> Connection<'a, T> {
    /// Create a connection for a bound link
    pub fn new(config: ConnectionConfig, transceiver: T, binding: &Binding) -> Self {
        // Anything that arrived before we were set up is stale
        binding.port().reset();
        Self {
            config,
            transceiver,
            port: binding.port(),
            observers: heapless::Vec::new(),
            in_flight: None,
        }
    }

    /// The peer name
    #[inline]
    pub fn name(&self) -> &'static str {
        self.config.name
    }

    /// The local role
    #[inline]
    pub fn role(&self) -> Role {
        self.config.role
    }

    /// Is an async exchange waiting for its response?
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Borrow the transceiver
    pub fn transceiver(&self) -> &T {
        &self.transceiver
    }

    /// Register an observer for every frame arriving on this connection
    pub fn on_frame_observed(
        &mut self,
        observer: &'a dyn FrameObserver,
    ) -> Result<(), Error<T::Error>> {
        self.observers
            .push(observer)
            .map_err(|_| Error::ObserversFull)
    }

    /// Send a request and wait for the paired response
    ///
    /// Returns [Frame::NONE] if no response arrived within the response
    /// timeout. An async exchange still in flight is completed first, and its
    /// outcome delivered to the observers. Only available in the [Role::Master]
    /// role.
    pub async fn send_request(&mut self, request: Frame) -> Result<Frame, Error<T::Error>> {
        self.expect_role(Role::Master)?;

        // One exchange at a time: an unfinished async one runs to completion first
        self.finish_in_flight().await;
        self.port.reset();
        self.transceiver.transmit(request).await?;

        match with_timeout(self.config.response_timeout, self.port.wait()).await {
            Ok(response) => {
                self.deliver(response);
                Ok(response)
            }
            Err(TimeoutError) => {
                ot_debug!(
                    "No response from {=str} to {=u32:08x}",
                    self.config.name,
                    request.raw()
                );
                Ok(Frame::NONE)
            }
        }
    }

    /// Send a request without waiting for the response
    ///
    /// Returns `false` if an exchange is already in flight. The response, or
    /// [Frame::NONE] on timeout, is delivered to the observers by a later call
    /// to [Connection::process()]. Only available in the [Role::Master] role.
    pub async fn send_request_async(&mut self, request: Frame) -> Result<bool, Error<T::Error>> {
        self.expect_role(Role::Master)?;
        if self.in_flight.is_some() {
            return Ok(false);
        }

        self.port.reset();
        self.transceiver.transmit(request).await?;
        self.in_flight = Some(Instant::now() + self.config.response_timeout);
        Ok(true)
    }

    /// Answer the last request received from the master peer
    ///
    /// Must be called within the master's response window. Only available in
    /// the [Role::Slave] role.
    pub async fn send_response(&mut self, response: Frame) -> Result<(), Error<T::Error>> {
        self.expect_role(Role::Slave)?;
        ot_trace!(
            "Answering {=str} with {=u32:08x}",
            self.config.name,
            response.raw()
        );
        self.transceiver.transmit(response).await
    }

    /// Wait for the next request from the master peer
    ///
    /// The request is delivered to the observers before it is returned. Only
    /// available in the [Role::Slave] role.
    pub async fn next_frame(&mut self) -> Result<Frame, Error<T::Error>> {
        self.expect_role(Role::Slave)?;
        let frame = self.port.wait().await;
        self.deliver(frame);
        Ok(frame)
    }

    /// Service the connection without waiting
    ///
    /// * As [Role::Slave]: delivers a request that arrived since the last call
    /// * As [Role::Master]: completes or times out an async exchange
    ///
    /// Returns the delivered frame, if any. Should be called regularly.
    pub fn process(&mut self) -> Option<Frame> {
        let frame = match self.config.role {
            Role::Slave => self.port.try_take()?,
            Role::Master => {
                let deadline = self.in_flight?;
                if let Some(response) = self.port.try_take() {
                    response
                } else if Instant::now() >= deadline {
                    ot_debug!("Async request to {=str} timed out", self.config.name);
                    Frame::NONE
                } else {
                    return None;
                }
            }
        };
        self.in_flight = None;
        self.deliver(frame);
        Some(frame)
    }

    /// Wait out an async exchange, delivering its response or [Frame::NONE]
    async fn finish_in_flight(&mut self) {
        let Some(deadline) = self.in_flight.take() else {
            return;
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        let frame = match with_timeout(remaining, self.port.wait()).await {
            Ok(response) => response,
            Err(TimeoutError) => {
                ot_debug!("Async request to {=str} timed out", self.config.name);
                Frame::NONE
            }
        };
        self.deliver(frame);
    }

    fn expect_role(&self, role: Role) -> Result<(), Error<T::Error>> {
        if self.config.role == role {
            Ok(())
        } else {
            ot_error!("Wrong role for {=str}", self.config.name);
            Err(Error::WrongRole)
        }
    }

    fn deliver(&self, frame: Frame) {
        let expected = match self.config.role {
            Role::Master => frame.is_valid_response(),
            Role::Slave => frame.is_valid_request(),
        };
        if expected {
            ot_trace!(
                "Frame {=u32:08x} from {=str} (data id {=u8})",
                frame.raw(),
                self.config.name,
                frame.data_id().0
            );
        } else {
            ot_warn!(
                "Unexpected frame {=u32:08x} from {=str} (data id {=u8}, {=str})",
                frame.raw(),
                self.config.name,
                frame.data_id().0,
                frame.message_type().as_str()
            );
        }

        for observer in self.observers.iter() {
            observer.on_frame(frame);
        }
    }
}
