//! OpenTherm frames
//!
//! Every OpenTherm transaction is a single 32-bit frame in each direction:
//!
//! ```text
//!  31  30..28   27..24   23..16     15..0
//! [P] [TTT]    [SSSS]   [DATA-ID]  [PAYLOAD]
//! ```
//!
//! * `P` is a parity bit, chosen so that the whole frame has even parity
//! * `TTT` is the [MessageType]
//! * `SSSS` are spare bits, always sent as zero
//! * `DATA-ID` is the [DataId] naming the variable being read or written
//! * `PAYLOAD` is the 16-bit value, see [codec][crate::codec] for its encodings
//!
//! Frames are plain values. Whether a frame is "valid" depends on which direction
//! it was expected to travel in, see [Frame::is_valid_request()] and
//! [Frame::is_valid_response()].

/// The kind of a frame, stored in bits 30..28
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum MessageType {
    /// Master to slave: read the given data id
    ReadData,
    /// Master to slave: write the payload to the given data id
    WriteData,
    /// Master to slave: the master's data is invalid
    InvalidData,
    /// Reserved, never sent
    Reserved,
    /// Slave to master: acknowledges a read, carries the value
    ReadAck,
    /// Slave to master: acknowledges a write
    WriteAck,
    /// Slave to master: the data id is known, but the value is invalid
    DataInvalid,
    /// Slave to master: the data id is not supported
    UnknownDataId,
}

impl MessageType {
    /// Decode the three message type bits
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0 => MessageType::ReadData,
            1 => MessageType::WriteData,
            2 => MessageType::InvalidData,
            3 => MessageType::Reserved,
            4 => MessageType::ReadAck,
            5 => MessageType::WriteAck,
            6 => MessageType::DataInvalid,
            _ => MessageType::UnknownDataId,
        }
    }

    /// The three message type bits
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Upper-case name, as used in OpenTherm documentation
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageType::ReadData => "READ_DATA",
            MessageType::WriteData => "WRITE_DATA",
            MessageType::InvalidData => "INVALID_DATA",
            MessageType::Reserved => "RESERVED",
            MessageType::ReadAck => "READ_ACK",
            MessageType::WriteAck => "WRITE_ACK",
            MessageType::DataInvalid => "DATA_INVALID",
            MessageType::UnknownDataId => "UNKNOWN_DATA_ID",
        }
    }

    /// Is this a master-to-slave message type?
    #[inline]
    pub const fn is_request(self) -> bool {
        (self as u8) < 4
    }
}

/// An OpenTherm data identifier
///
/// Only the most commonly used identifiers have names here; any `u8` is a
/// valid identifier on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(
    feature = "postcard-helpers",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct DataId(pub u8);

impl DataId {
    /// Master and slave status flags
    pub const STATUS: DataId = DataId(0);
    /// Control setpoint, the CH water temperature setpoint (f8.8, °C)
    pub const TSET: DataId = DataId(1);
    /// Master configuration
    pub const MASTER_CONFIG: DataId = DataId(2);
    /// Slave configuration
    pub const SLAVE_CONFIG: DataId = DataId(3);
    /// Remote command
    pub const COMMAND: DataId = DataId(4);
    /// Application-specific fault flags and OEM fault code
    pub const ASF_FLAGS: DataId = DataId(5);
    /// Remote override room setpoint (f8.8, °C)
    pub const TR_OVERRIDE: DataId = DataId(9);
    /// Maximum relative modulation level setting (f8.8, %)
    pub const MAX_REL_MOD_LEVEL_SETTING: DataId = DataId(14);
    /// Room setpoint (f8.8, °C)
    pub const TR_SET: DataId = DataId(16);
    /// Relative modulation level (f8.8, %)
    pub const REL_MOD_LEVEL: DataId = DataId(17);
    /// Water pressure in the CH circuit (f8.8, bar)
    pub const CH_PRESSURE: DataId = DataId(18);
    /// DHW flow rate (f8.8, l/min)
    pub const DHW_FLOW_RATE: DataId = DataId(19);
    /// Room temperature (f8.8, °C)
    pub const TR: DataId = DataId(24);
    /// Boiler flow water temperature (f8.8, °C)
    pub const TBOILER: DataId = DataId(25);
    /// DHW temperature (f8.8, °C)
    pub const TDHW: DataId = DataId(26);
    /// Outside temperature (f8.8, °C)
    pub const TOUTSIDE: DataId = DataId(27);
    /// Return water temperature (f8.8, °C)
    pub const TRET: DataId = DataId(28);
    /// Boiler exhaust temperature (s16, °C)
    pub const TEXHAUST: DataId = DataId(33);
    /// DHW setpoint bounds (s8/s8, °C)
    pub const TDHW_SET_BOUNDS: DataId = DataId(48);
    /// Max CH setpoint bounds (s8/s8, °C)
    pub const MAX_TSET_BOUNDS: DataId = DataId(49);
    /// DHW setpoint (f8.8, °C)
    pub const TDHW_SET: DataId = DataId(56);
    /// Max CH water setpoint (f8.8, °C)
    pub const MAX_TSET: DataId = DataId(57);
    /// Number of burner starts (u16)
    pub const BURNER_STARTS: DataId = DataId(116);
    /// Number of CH pump starts (u16)
    pub const CH_PUMP_STARTS: DataId = DataId(117);
    /// Burner operation hours (u16)
    pub const BURNER_OPERATION_HOURS: DataId = DataId(120);
    /// OpenTherm protocol version of the master (f8.8)
    pub const OPENTHERM_VERSION_MASTER: DataId = DataId(124);
    /// OpenTherm protocol version of the slave (f8.8)
    pub const OPENTHERM_VERSION_SLAVE: DataId = DataId(125);
}

impl From<u8> for DataId {
    fn from(value: u8) -> Self {
        DataId(value)
    }
}

impl From<DataId> for u8 {
    fn from(value: DataId) -> Self {
        value.0
    }
}

/// A single 32-bit OpenTherm frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(
    feature = "postcard-helpers",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Frame(u32);

impl Frame {
    /// The "no response" sentinel, produced when an exchange times out
    ///
    /// This is never a valid response.
    pub const NONE: Frame = Frame(0);

    const PARITY_BIT: u32 = 1 << 31;

    /// Wrap a raw 32-bit value, exactly as received
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Frame(raw)
    }

    /// The raw 32-bit value, exactly as sent on the wire
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Build a frame with correct parity
    pub const fn build(kind: MessageType, id: DataId, payload: u16) -> Self {
        let body = ((kind.bits() as u32) << 28) | ((id.0 as u32) << 16) | (payload as u32);
        if body.count_ones() % 2 == 1 {
            Frame(body | Self::PARITY_BIT)
        } else {
            Frame(body)
        }
    }

    /// A `READ_DATA` request for `id`
    pub const fn read_request(id: DataId, payload: u16) -> Self {
        Self::build(MessageType::ReadData, id, payload)
    }

    /// A `WRITE_DATA` request setting `id` to `payload`
    pub const fn write_request(id: DataId, payload: u16) -> Self {
        Self::build(MessageType::WriteData, id, payload)
    }

    /// Build the response a slave would send to this request
    ///
    /// `READ_DATA` is answered with `READ_ACK`, `WRITE_DATA` with `WRITE_ACK`,
    /// anything else with `DATA_INVALID`. Used by simulated and emulated slaves.
    pub const fn response(self, payload: u16) -> Self {
        let kind = match self.message_type() {
            MessageType::ReadData => MessageType::ReadAck,
            MessageType::WriteData => MessageType::WriteAck,
            _ => MessageType::DataInvalid,
        };
        Self::build(kind, self.data_id(), payload)
    }

    /// Does the frame have even parity?
    #[inline]
    pub const fn parity_ok(self) -> bool {
        self.0.count_ones() % 2 == 0
    }

    /// The message type bits
    #[inline]
    pub const fn message_type(self) -> MessageType {
        MessageType::from_bits((self.0 >> 28) as u8)
    }

    /// The data identifier
    #[inline]
    pub const fn data_id(self) -> DataId {
        DataId((self.0 >> 16) as u8)
    }

    /// The 16-bit payload
    #[inline]
    pub const fn payload(self) -> u16 {
        self.0 as u16
    }

    /// Is this a well-formed master-to-slave request?
    pub const fn is_valid_request(self) -> bool {
        self.parity_ok()
            && matches!(
                self.message_type(),
                MessageType::ReadData | MessageType::WriteData
            )
    }

    /// Is this a well-formed, positive slave-to-master response?
    pub const fn is_valid_response(self) -> bool {
        self.parity_ok()
            && matches!(
                self.message_type(),
                MessageType::ReadAck | MessageType::WriteAck
            )
    }
}

impl From<u32> for Frame {
    fn from(value: u32) -> Self {
        Frame(value)
    }
}

impl From<Frame> for u32 {
    fn from(value: Frame) -> Self {
        value.0
    }
}

impl core::fmt::Display for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_read_request_matches_wire() {
        // Status read with CH and DHW enabled, as sent by most thermostats
        let req = Frame::read_request(DataId::STATUS, 0x0300);
        assert_eq!(req.raw(), 0x0000_0300);
        assert!(req.is_valid_request());
        assert!(!req.is_valid_response());

        // Only the CH enable bit set: odd count, so parity is set
        let req = Frame::read_request(DataId::STATUS, 0x0100);
        assert_eq!(req.raw(), 0x8000_0100);
        assert!(req.parity_ok());
    }

    #[test]
    fn fields_are_extracted() {
        let frame = Frame::build(MessageType::ReadAck, DataId::TBOILER, 0x2A80);
        assert_eq!(frame.message_type(), MessageType::ReadAck);
        assert_eq!(frame.data_id(), DataId::TBOILER);
        assert_eq!(frame.payload(), 0x2A80);
        assert!(frame.is_valid_response());
        assert_eq!(frame.message_type().as_str(), "READ_ACK");
    }

    #[test]
    fn bad_parity_is_invalid_both_ways() {
        let good = Frame::write_request(DataId::TSET, 0x3C00);
        let flipped = Frame::from_raw(good.raw() ^ 0x0000_0001);
        assert!(good.is_valid_request());
        assert!(!flipped.parity_ok());
        assert!(!flipped.is_valid_request());
        assert!(!flipped.is_valid_response());
    }

    #[test]
    fn sentinel_is_never_a_response() {
        assert!(!Frame::NONE.is_valid_response());
        assert_eq!(Frame::NONE.raw(), 0);
    }

    #[test]
    fn responses_pair_with_requests() {
        let read = Frame::read_request(DataId::TOUTSIDE, 0);
        let resp = read.response(0xFF00);
        assert_eq!(resp.message_type(), MessageType::ReadAck);
        assert_eq!(resp.data_id(), DataId::TOUTSIDE);
        assert!(resp.is_valid_response());

        let write = Frame::write_request(DataId::TDHW_SET, 0x3700);
        assert_eq!(write.response(0x3700).message_type(), MessageType::WriteAck);

        let odd = Frame::build(MessageType::InvalidData, DataId::TSET, 0);
        assert_eq!(odd.response(0).message_type(), MessageType::DataInvalid);
        assert!(!odd.response(0).is_valid_response());
    }

    #[test]
    fn display_is_hex() {
        let frame = Frame::from_raw(0x4000_0200);
        assert_eq!(std::format!("{frame}"), "40000200");
    }
}
