//! Boiler control
//!
//! Without a thermostat on the other side (or when overriding one), the local
//! device has to tell the boiler what to do itself. This is done with three
//! exchanges per update:
//!
//! 1. The master status (data id 0): a READ_DATA request carrying the master
//!    flags in the high byte. The boiler answers with its own flags in the low
//!    byte, see [SlaveStatus].
//! 2. The CH water setpoint (TSet, data id 1), if one is set
//! 3. The DHW setpoint (TdhwSet, data id 56), if one is set
//!
//! Whoever sends the status exchange, a [StatusWatch] on the boiler connection
//! turns its answer into an [HvacState].

use core::cell::Cell;

use crate::{
    codec::{f88_encode, from_u8_pair, u8_high, u8_low, Value},
    connection::{Connection, FrameObserver},
    field::write_field,
    frame::{DataId, Frame},
    poller::{Health, Sink},
    Error, Transceiver,
};

/// How the boiler link is used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum Mode {
    /// No thermostat, the local device controls the boiler
    Standalone,
    /// A thermostat is relayed to the boiler
    Gateway {
        /// Also send our own control writes between relayed exchanges
        write_while_relaying: bool,
    },
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Gateway {
            write_while_relaying: false,
        }
    }
}

impl Mode {
    /// May [BoilerControl] send writes in this mode?
    pub const fn writes(self) -> bool {
        match self {
            Mode::Standalone => true,
            Mode::Gateway {
                write_while_relaying,
            } => write_while_relaying,
        }
    }
}

const fn bit(byte: u8, n: u8) -> bool {
    byte & (1 << n) != 0
}

/// Master status flags, the high byte of data id 0
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct MasterStatus {
    /// Central heating enabled
    pub ch_enable: bool,
    /// Domestic hot water enabled
    pub dhw_enable: bool,
    /// Cooling enabled
    pub cooling_enable: bool,
    /// Outside temperature compensation active
    pub otc_active: bool,
    /// Second central heating circuit enabled
    pub ch2_enable: bool,
}

impl MasterStatus {
    /// The request payload: flags in the high byte, low byte zero
    pub const fn to_payload(self) -> u16 {
        let flags = (self.ch_enable as u8)
            | (self.dhw_enable as u8) << 1
            | (self.cooling_enable as u8) << 2
            | (self.otc_active as u8) << 3
            | (self.ch2_enable as u8) << 4;
        from_u8_pair(flags, 0)
    }

    /// Decode from a status request or response payload
    pub const fn from_payload(payload: u16) -> Self {
        let hb = u8_high(payload);
        Self {
            ch_enable: bit(hb, 0),
            dhw_enable: bit(hb, 1),
            cooling_enable: bit(hb, 2),
            otc_active: bit(hb, 3),
            ch2_enable: bit(hb, 4),
        }
    }
}

/// Slave status flags, the low byte of data id 0
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct SlaveStatus {
    /// Fault indication
    pub fault: bool,
    /// Central heating active
    pub ch_active: bool,
    /// Domestic hot water active
    pub dhw_active: bool,
    /// Flame on
    pub flame: bool,
    /// Cooling active
    pub cooling_active: bool,
    /// Second central heating circuit active
    pub ch2_active: bool,
    /// Diagnostic indication
    pub diagnostic: bool,
}

impl SlaveStatus {
    /// Decode from a status response payload
    pub const fn from_payload(payload: u16) -> Self {
        let lb = u8_low(payload);
        Self {
            fault: bit(lb, 0),
            ch_active: bit(lb, 1),
            dhw_active: bit(lb, 2),
            flame: bit(lb, 3),
            cooling_active: bit(lb, 4),
            ch2_active: bit(lb, 5),
            diagnostic: bit(lb, 6),
        }
    }
}

/// What a heating circuit is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum Action {
    /// Not requested
    Off,
    /// Requested, but the burner is off
    Idle,
    /// Requested, and the burner is on
    Heating,
}

impl Action {
    const fn derive(active: bool, flame: bool) -> Self {
        match (active, flame) {
            (false, _) => Action::Off,
            (true, false) => Action::Idle,
            (true, true) => Action::Heating,
        }
    }
}

/// The combined state of the central heating and hot water circuits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct HvacState {
    /// Central heating
    pub ch: Action,
    /// Domestic hot water
    pub dhw: Action,
    /// Boiler reports a fault
    pub fault: bool,
}

impl SlaveStatus {
    /// What the central heating circuit is doing
    pub const fn ch_action(&self) -> Action {
        Action::derive(self.ch_active, self.flame)
    }

    /// What the hot water circuit is doing
    pub const fn dhw_action(&self) -> Action {
        Action::derive(self.dhw_active, self.flame)
    }

    /// Both circuits at once
    pub const fn hvac(&self) -> HvacState {
        HvacState {
            ch: self.ch_action(),
            dhw: self.dhw_action(),
            fault: self.fault,
        }
    }
}

/// Publishes the [HvacState] from every status response seen on a connection
///
/// Register it on the boiler connection. It picks up status exchanges from
/// the relay and from [BoilerControl] alike, so it also works as a pure relay.
pub struct StatusWatch<S: Sink> {
    sink: S,
    last: Cell<Option<SlaveStatus>>,
}

impl<S: Sink> StatusWatch<S> {
    /// Create a watch publishing to `sink`
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            last: Cell::new(None),
        }
    }

    /// The most recently seen slave status
    pub fn last(&self) -> Option<SlaveStatus> {
        self.last.get()
    }
}

impl<S: Sink> FrameObserver for StatusWatch<S> {
    fn on_frame(&self, frame: Frame) {
        if !frame.is_valid_response() || frame.data_id() != DataId::STATUS {
            return;
        }
        let status = SlaveStatus::from_payload(frame.payload());
        self.last.set(Some(status));
        self.sink.publish(Value::Hvac(status.hvac()));
        self.sink.health(Health::Ok);
    }
}

/// What the boiler is asked to do
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct Demand {
    /// Master status flags
    pub status: MasterStatus,
    /// CH water setpoint in °C, not written if `None`
    pub ch_setpoint: Option<f32>,
    /// DHW setpoint in °C, not written if `None`
    pub dhw_setpoint: Option<f32>,
}

/// The outcome of one [BoilerControl::update()]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct UpdateReport {
    /// The boiler's status, if it answered the status exchange
    pub status: Option<SlaveStatus>,
    /// Whether the CH setpoint write was accepted, `None` if not written
    pub ch_setpoint: Option<bool>,
    /// Whether the DHW setpoint write was accepted, `None` if not written
    pub dhw_setpoint: Option<bool>,
}

/// Sends our own [Demand] to the boiler
pub struct BoilerControl {
    mode: Mode,
    demand: Cell<Demand>,
    last_status: Cell<Option<SlaveStatus>>,
}

impl BoilerControl {
    /// Create a controller with an empty demand
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            demand: Cell::new(Demand::default()),
            last_status: Cell::new(None),
        }
    }

    /// The configured mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Replace the demand, used from the next update on
    pub fn set_demand(&self, demand: Demand) {
        self.demand.set(demand);
    }

    /// The current demand
    pub fn demand(&self) -> Demand {
        self.demand.get()
    }

    /// The slave status of the last successful update
    pub fn last_status(&self) -> Option<SlaveStatus> {
        self.last_status.get()
    }

    /// Send the demand to the boiler
    ///
    /// In a mode that does not write, nothing is sent and `None` is returned.
    pub async fn update<T: Transceiver>(
        &self,
        conn: &mut Connection<'_, T>,
    ) -> Result<Option<UpdateReport>, Error<T::Error>> {
        if !self.mode.writes() {
            return Ok(None);
        }
        let demand = self.demand.get();

        let request = Frame::read_request(DataId::STATUS, demand.status.to_payload());
        let response = conn.send_request(request).await?;
        let status = if response.is_valid_response() && response.data_id() == DataId::STATUS {
            Some(SlaveStatus::from_payload(response.payload()))
        } else {
            ot_warn!("Status exchange failed: {=u32:08x}", response.raw());
            None
        };
        self.last_status.set(status);

        let mut report = UpdateReport {
            status,
            ..Default::default()
        };
        if let Some(setpoint) = demand.ch_setpoint {
            report.ch_setpoint = Some(write_field(conn, DataId::TSET, f88_encode(setpoint)).await?);
        }
        if let Some(setpoint) = demand.dhw_setpoint {
            report.dhw_setpoint =
                Some(write_field(conn, DataId::TDHW_SET, f88_encode(setpoint)).await?);
        }
        Ok(Some(report))
    }
}
