//! Field access
//!
//! Typed read and write of a single data id, using blocking exchanges on a
//! master [Connection]. Failed exchanges are values, not errors: a read that
//! got no valid response is `None`, a rejected write is `false`.

use crate::{
    codec::{Codec, Value},
    connection::Connection,
    frame::{DataId, Frame},
    Error, Transceiver,
};

/// Read `id`, returning the response frame if it is a valid response
pub async fn read_frame<T: Transceiver>(
    conn: &mut Connection<'_, T>,
    id: DataId,
) -> Result<Option<Frame>, Error<T::Error>> {
    read_frame_with(conn, id, 0).await
}

/// Like [read_frame()], with `payload` in the request
///
/// Some reads carry data of their own, such as the master flags of a
/// status read.
pub async fn read_frame_with<T: Transceiver>(
    conn: &mut Connection<'_, T>,
    id: DataId,
    payload: u16,
) -> Result<Option<Frame>, Error<T::Error>> {
    let response = conn.send_request(Frame::read_request(id, payload)).await?;
    if response.is_valid_response() {
        Ok(Some(response))
    } else {
        ot_debug!(
            "Read of data id {=u8} from {=str} failed: {=u32:08x}",
            id.0,
            conn.name(),
            response.raw()
        );
        Ok(None)
    }
}

/// Read the raw payload of `id`
pub async fn read_field<T: Transceiver>(
    conn: &mut Connection<'_, T>,
    id: DataId,
) -> Result<Option<u16>, Error<T::Error>> {
    Ok(read_frame(conn, id).await?.map(Frame::payload))
}

/// Write `payload` to `id`
///
/// Returns whether the peer acknowledged the write.
pub async fn write_field<T: Transceiver>(
    conn: &mut Connection<'_, T>,
    id: DataId,
    payload: u16,
) -> Result<bool, Error<T::Error>> {
    let response = conn.send_request(Frame::write_request(id, payload)).await?;
    let accepted = response.is_valid_response();
    if !accepted {
        ot_warn!(
            "Write of {=u16:04x} to data id {=u8} rejected: {=u32:08x}",
            payload,
            id.0,
            response.raw()
        );
    }
    Ok(accepted)
}

/// A data id paired with the encoding of its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct Field {
    /// The data id
    pub id: DataId,
    /// How its payload is encoded
    pub codec: Codec,
    /// Payload sent with every read, usually zero
    pub request: u16,
}

impl Field {
    /// Create a new field, read with a zero payload
    pub const fn new(id: DataId, codec: Codec) -> Self {
        Self {
            id,
            codec,
            request: 0,
        }
    }

    /// Send `payload` with every read of this field
    pub const fn with_request(self, payload: u16) -> Self {
        Self {
            request: payload,
            ..self
        }
    }

    /// Read and decode the field
    pub async fn read<T: Transceiver>(
        &self,
        conn: &mut Connection<'_, T>,
    ) -> Result<Option<Value>, Error<T::Error>> {
        let frame = read_frame_with(conn, self.id, self.request).await?;
        Ok(frame.map(|f| self.codec.decode(f.payload())))
    }

    /// Encode and write the field
    pub async fn write<T: Transceiver>(
        &self,
        conn: &mut Connection<'_, T>,
        value: Value,
    ) -> Result<bool, Error<T::Error>> {
        write_field(conn, self.id, self.codec.encode(value)).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::Byte;
    use crate::frame::MessageType;
    use crate::sim::{block_on, Bus, Reply, SimError};

    #[test]
    fn repeated_reads_return_the_same_payload() {
        let bus = Bus::new();
        let (sim, binding) = bus.boiler();
        let mut conn = Connection::new(bus.boiler_config(), sim, &binding);
        bus.set_register(DataId::TBOILER, 0x2D80);

        for _ in 0..3 {
            let got = block_on(read_field(&mut conn, DataId::TBOILER)).unwrap();
            assert_eq!(got, Some(0x2D80));
        }
        assert_eq!(bus.boiler_sent().len(), 3);
        assert!(bus
            .boiler_sent()
            .iter()
            .all(|f| *f == Frame::read_request(DataId::TBOILER, 0)));
    }

    #[test]
    fn unknown_ids_and_timeouts_read_as_none() {
        let bus = Bus::new();
        let (sim, binding) = bus.boiler();
        let mut conn = Connection::new(bus.boiler_config(), sim, &binding);

        // No register: the boiler answers UNKNOWN_DATA_ID
        assert_eq!(block_on(read_field(&mut conn, DataId::TEXHAUST)).unwrap(), None);

        bus.script_boiler([Reply::Silent]);
        assert_eq!(block_on(read_frame(&mut conn, DataId::TRET)).unwrap(), None);
    }

    #[test]
    fn read_frame_returns_the_response() {
        let bus = Bus::new();
        let (sim, binding) = bus.boiler();
        let mut conn = Connection::new(bus.boiler_config(), sim, &binding);
        bus.set_register(DataId::STATUS, 0x000A);

        let frame = block_on(read_frame(&mut conn, DataId::STATUS)).unwrap().unwrap();
        assert_eq!(frame.message_type(), MessageType::ReadAck);
        assert_eq!(frame.payload(), 0x000A);
    }

    #[test]
    fn writes_succeed_only_on_acknowledge() {
        let bus = Bus::new();
        let (sim, binding) = bus.boiler();
        let mut conn = Connection::new(bus.boiler_config(), sim, &binding);

        assert!(block_on(write_field(&mut conn, DataId::TSET, 0x3C00)).unwrap());
        assert_eq!(bus.register(DataId::TSET), Some(0x3C00));

        bus.script_boiler([Reply::Frame(Frame::build(
            MessageType::DataInvalid,
            DataId::TSET,
            0x6400,
        ))]);
        assert!(!block_on(write_field(&mut conn, DataId::TSET, 0x6400)).unwrap());

        bus.script_boiler([Reply::Silent]);
        assert!(!block_on(write_field(&mut conn, DataId::TSET, 0x3C00)).unwrap());
        assert_eq!(
            bus.boiler_sent().last(),
            Some(&Frame::write_request(DataId::TSET, 0x3C00))
        );
    }

    #[test]
    fn typed_field_decodes_and_encodes() {
        let bus = Bus::new();
        let (sim, binding) = bus.boiler();
        let mut conn = Connection::new(bus.boiler_config(), sim, &binding);
        bus.set_register(DataId::TOUTSIDE, 0xFF00);

        let outside = Field::new(DataId::TOUTSIDE, Codec::F88);
        assert_eq!(
            block_on(outside.read(&mut conn)).unwrap(),
            Some(Value::Float(-1.0))
        );

        let setpoint = Field::new(DataId::TDHW_SET, Codec::F88);
        assert!(block_on(setpoint.write(&mut conn, Value::Float(55.5))).unwrap());
        assert_eq!(bus.register(DataId::TDHW_SET), Some(0x3780));
    }

    #[test]
    fn reads_can_carry_a_request_payload() {
        let bus = Bus::new();
        let (sim, binding) = bus.boiler();
        let mut conn = Connection::new(bus.boiler_config(), sim, &binding);
        bus.set_register(DataId::STATUS, 0x030A);

        let flame = Field::new(DataId::STATUS, Codec::Flag { byte: Byte::Low, bit: 3 })
            .with_request(0x0300);
        assert_eq!(block_on(flame.read(&mut conn)).unwrap(), Some(Value::Bool(true)));
        assert_eq!(
            bus.boiler_sent(),
            [Frame::read_request(DataId::STATUS, 0x0300)]
        );
    }

    #[test]
    fn transceiver_failures_propagate() {
        let bus = Bus::new();
        let (sim, binding) = bus.boiler();
        let mut conn = Connection::new(bus.boiler_config(), sim, &binding);
        bus.break_boiler();

        assert_eq!(
            block_on(read_field(&mut conn, DataId::TBOILER)),
            Err(Error::Transceiver(SimError::Broken))
        );
    }
}
