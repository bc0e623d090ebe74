//! TraCI storage format: framing, commands and typed values.
//!
//! All integers and floats are big-endian. A message is an `i32` total
//! length (counting itself) followed by commands. A command is a length
//! header, a command identifier and a payload; the header is a single byte
//! when the whole command fits in 255 bytes, otherwise a zero byte followed
//! by an `i32`.
//!
//! [`StorageReader`] checks every read against the remaining bytes, so a
//! truncated or corrupt frame becomes [`TraciError::Malformed`] instead of
//! a panic.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::TraciError;
use crate::protocol::tag;

const SHORT_HEADER_LEN: usize = 1;
const EXTENDED_HEADER_LEN: usize = 5;
// header plus the command identifier byte
const SHORT_COMMAND_OVERHEAD: usize = 2;
const EXTENDED_COMMAND_OVERHEAD: usize = 6;
const MESSAGE_HEADER_LEN: usize = 4;

/// A point in network coordinates (metres).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position2D {
    /// Easting.
    pub x: f64,
    /// Northing.
    pub y: f64,
}

/// One link controlled by a traffic light signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlledLink {
    /// Lane approaching the junction.
    pub incoming_lane: String,
    /// Lane leaving the junction.
    pub outgoing_lane: String,
    /// Internal lane across the junction.
    pub via_lane: String,
}

/// Status part of every response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStatus {
    /// Echo of the command identifier.
    pub command: u8,
    /// Result code, see [`crate::protocol::status`].
    pub result: u8,
    /// Server description (empty on success).
    pub description: String,
}

fn length_error(what: &str) -> TraciError {
    TraciError::malformed(format!("{what} length out of range"))
}

fn wire_len(len: usize, what: &str) -> Result<i32, TraciError> {
    i32::try_from(len).map_err(|e| TraciError::malformed(format!("{what} too long: {e}")))
}

/// Append a length-prefixed string.
pub fn put_string(buf: &mut BytesMut, value: &str) -> Result<(), TraciError> {
    buf.put_i32(wire_len(value.len(), "string")?);
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Append a tagged string list.
pub fn put_string_list(buf: &mut BytesMut, values: &[String]) -> Result<(), TraciError> {
    buf.put_u8(tag::STRING_LIST);
    buf.put_i32(wire_len(values.len(), "string list")?);
    for value in values {
        put_string(buf, value)?;
    }
    Ok(())
}

/// Frame one command: length header, identifier, payload.
pub fn encode_command(command: u8, payload: &[u8]) -> Result<Bytes, TraciError> {
    let short_len = payload
        .len()
        .checked_add(SHORT_COMMAND_OVERHEAD)
        .ok_or_else(|| length_error("command"))?;
    let mut buf = BytesMut::with_capacity(short_len.saturating_add(4));
    if let Ok(len) = u8::try_from(short_len) {
        buf.put_u8(len);
    } else {
        let extended_len = payload
            .len()
            .checked_add(EXTENDED_COMMAND_OVERHEAD)
            .ok_or_else(|| length_error("command"))?;
        buf.put_u8(0);
        buf.put_i32(wire_len(extended_len, "command")?);
    }
    buf.put_u8(command);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Frame commands into a message with its total length prefix.
pub fn encode_message(commands: &[Bytes]) -> Result<Bytes, TraciError> {
    let body_len = commands
        .iter()
        .try_fold(0usize, |total, command| total.checked_add(command.len()))
        .ok_or_else(|| length_error("message"))?;
    let total = body_len
        .checked_add(MESSAGE_HEADER_LEN)
        .ok_or_else(|| length_error("message"))?;
    let mut buf = BytesMut::with_capacity(total);
    buf.put_i32(wire_len(total, "message")?);
    for command in commands {
        buf.put_slice(command);
    }
    Ok(buf.freeze())
}

/// Payload of a get-variable command.
///
/// `params` is an already tagged parameter value, appended as-is.
pub fn variable_request(
    variable: u8,
    object_id: &str,
    params: Option<&[u8]>,
) -> Result<Bytes, TraciError> {
    let mut buf = BytesMut::new();
    buf.put_u8(variable);
    put_string(&mut buf, object_id)?;
    if let Some(params) = params {
        buf.put_slice(params);
    }
    Ok(buf.freeze())
}

/// Parameter of a 2D to lon/lat position conversion.
pub fn geo_conversion_params(position: Position2D) -> Bytes {
    let mut buf = BytesMut::with_capacity(28);
    buf.put_u8(tag::COMPOUND);
    buf.put_i32(2);
    buf.put_u8(tag::POSITION_2D);
    buf.put_f64(position.x);
    buf.put_f64(position.y);
    buf.put_u8(tag::UBYTE);
    buf.put_u8(tag::POSITION_LON_LAT);
    buf.freeze()
}

/// Bounds-checked reader over a received frame.
#[derive(Debug, Clone)]
pub struct StorageReader {
    buf: Bytes,
}

impl StorageReader {
    /// Read from `buf`.
    pub const fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize, what: &str) -> Result<(), TraciError> {
        if self.buf.remaining() < needed {
            return Err(TraciError::malformed(format!(
                "truncated {what}: need {needed} bytes, have {}",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    /// Read an unsigned byte.
    pub fn read_u8(&mut self) -> Result<u8, TraciError> {
        self.ensure(1, "ubyte")?;
        Ok(self.buf.get_u8())
    }

    /// Read a signed 32-bit integer.
    pub fn read_i32(&mut self) -> Result<i32, TraciError> {
        self.ensure(4, "integer")?;
        Ok(self.buf.get_i32())
    }

    /// Read a 64-bit float.
    pub fn read_f64(&mut self) -> Result<f64, TraciError> {
        self.ensure(8, "double")?;
        Ok(self.buf.get_f64())
    }

    fn read_count(&mut self, what: &str) -> Result<usize, TraciError> {
        let raw = self.read_i32()?;
        usize::try_from(raw)
            .map_err(|e| TraciError::malformed(format!("negative {what} count {raw}: {e}")))
    }

    /// Split off the next `len` bytes as their own reader.
    pub fn split(&mut self, len: usize) -> Result<Self, TraciError> {
        self.ensure(len, "command body")?;
        Ok(Self::new(self.buf.split_to(len)))
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, TraciError> {
        let len = self.read_count("string")?;
        self.ensure(len, "string")?;
        let bytes = self.buf.split_to(len);
        String::from_utf8(bytes.to_vec())
            .map_err(|e| TraciError::malformed(format!("invalid utf-8 in string: {e}")))
    }

    /// Read a count-prefixed string list (without tag).
    pub fn read_string_list(&mut self) -> Result<Vec<String>, TraciError> {
        let count = self.read_count("string list")?;
        // every string needs at least its length prefix
        self.ensure(count.saturating_mul(4), "string list")?;
        (0..count).map(|_| self.read_string()).collect()
    }

    /// Read a type tag and check it.
    pub fn expect_tag(&mut self, expected: u8) -> Result<(), TraciError> {
        let found = self.read_u8()?;
        if found != expected {
            return Err(TraciError::malformed(format!(
                "expected type 0x{expected:02x}, found 0x{found:02x}"
            )));
        }
        Ok(())
    }

    /// Read a tagged integer.
    pub fn read_typed_i32(&mut self) -> Result<i32, TraciError> {
        self.expect_tag(tag::INTEGER)?;
        self.read_i32()
    }

    /// Read a tagged double.
    pub fn read_typed_f64(&mut self) -> Result<f64, TraciError> {
        self.expect_tag(tag::DOUBLE)?;
        self.read_f64()
    }

    /// Read a tagged string.
    pub fn read_typed_string(&mut self) -> Result<String, TraciError> {
        self.expect_tag(tag::STRING)?;
        self.read_string()
    }

    /// Read a tagged string list.
    pub fn read_typed_string_list(&mut self) -> Result<Vec<String>, TraciError> {
        self.expect_tag(tag::STRING_LIST)?;
        self.read_string_list()
    }

    /// Read a tagged 2D position.
    pub fn read_typed_position(&mut self) -> Result<Position2D, TraciError> {
        self.expect_tag(tag::POSITION_2D)?;
        self.read_position()
    }

    fn read_position(&mut self) -> Result<Position2D, TraciError> {
        Ok(Position2D {
            x: self.read_f64()?,
            y: self.read_f64()?,
        })
    }

    /// Read a tagged polygon. Counts above 255 use a zero byte and an `i32`.
    pub fn read_typed_shape(&mut self) -> Result<Vec<Position2D>, TraciError> {
        self.expect_tag(tag::POLYGON)?;
        let count = match self.read_u8()? {
            0 => self.read_count("polygon")?,
            short => usize::from(short),
        };
        self.ensure(count.saturating_mul(16), "polygon")?;
        (0..count).map(|_| self.read_position()).collect()
    }

    /// Read a tagged lon/lat pair as `(longitude, latitude)`.
    pub fn read_typed_lon_lat(&mut self) -> Result<(f64, f64), TraciError> {
        self.expect_tag(tag::POSITION_LON_LAT)?;
        Ok((self.read_f64()?, self.read_f64()?))
    }

    /// Read the controlled-links compound of a traffic light.
    ///
    /// The result has one entry per signal index, each holding the links
    /// that signal controls.
    pub fn read_controlled_links(&mut self) -> Result<Vec<Vec<ControlledLink>>, TraciError> {
        self.expect_tag(tag::COMPOUND)?;
        let _items = self.read_i32()?;
        let signal_count = count_from(self.read_typed_i32()?, "signal")?;
        let mut signals = Vec::new();
        for _ in 0..signal_count {
            let link_count = count_from(self.read_typed_i32()?, "link")?;
            let mut links = Vec::new();
            for _ in 0..link_count {
                let lanes = self.read_typed_string_list()?;
                let mut lanes = lanes.into_iter();
                links.push(ControlledLink {
                    incoming_lane: lanes.next().unwrap_or_default(),
                    outgoing_lane: lanes.next().unwrap_or_default(),
                    via_lane: lanes.next().unwrap_or_default(),
                });
            }
            signals.push(links);
        }
        Ok(signals)
    }

    /// Read a command length header and split off the command body
    /// (identifier plus payload).
    pub fn read_command(&mut self) -> Result<(u8, Self), TraciError> {
        let body_len = match self.read_u8()? {
            0 => count_from(self.read_i32()?, "command")?
                .checked_sub(EXTENDED_HEADER_LEN)
                .ok_or_else(|| length_error("command"))?,
            short => usize::from(short)
                .checked_sub(SHORT_HEADER_LEN)
                .ok_or_else(|| length_error("command"))?,
        };
        let mut body = self.split(body_len)?;
        let id = body.read_u8()?;
        Ok((id, body))
    }

    /// Read the status command that opens every response.
    pub fn read_status(&mut self) -> Result<CommandStatus, TraciError> {
        let (command, mut body) = self.read_command()?;
        Ok(CommandStatus {
            command,
            result: body.read_u8()?,
            description: body.read_string()?,
        })
    }
}

fn count_from(raw: i32, what: &str) -> Result<usize, TraciError> {
    usize::try_from(raw)
        .map_err(|e| TraciError::malformed(format!("negative {what} count {raw}: {e}")))
}

/// Length of the message body announced by a 4-byte message header.
pub fn message_body_len(total: i32) -> Result<usize, TraciError> {
    count_from(total, "message")?
        .checked_sub(MESSAGE_HEADER_LEN)
        .ok_or_else(|| length_error("message"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::protocol::{command, status, variable};

    fn reader(bytes: &[u8]) -> StorageReader {
        StorageReader::new(Bytes::copy_from_slice(bytes))
    }

    #[test]
    fn short_command_counts_its_own_header() {
        let frame = encode_command(command::SIMULATION_STEP, &[0; 8]).unwrap();
        assert_eq!(frame.len(), 10);
        assert_eq!(frame.first(), Some(&10));
        assert_eq!(frame.get(1), Some(&command::SIMULATION_STEP));
    }

    #[test]
    fn long_command_uses_extended_header() {
        let payload = vec![7u8; 300];
        let frame = encode_command(command::GET_LANE_VARIABLE, &payload).unwrap();
        assert_eq!(frame.len(), 306);
        assert_eq!(frame.first(), Some(&0));
        assert_eq!(frame.get(1..5), Some(306i32.to_be_bytes().as_slice()));

        let (id, body) = reader(&frame).read_command().unwrap();
        assert_eq!(id, command::GET_LANE_VARIABLE);
        assert_eq!(body.remaining(), 300);
    }

    #[test]
    fn message_length_includes_header() {
        let close = encode_command(command::CLOSE, &[]).unwrap();
        let message = encode_message(&[close]).unwrap();
        assert_eq!(message.as_ref(), &[0, 0, 0, 6, 2, command::CLOSE]);
        assert_eq!(message_body_len(6).unwrap(), 2);
        assert!(message_body_len(3).is_err());
    }

    #[test]
    fn variable_request_layout() {
        let payload = variable_request(variable::SPEED, "veh0", None).unwrap();
        assert_eq!(payload.as_ref(), &[variable::SPEED, 0, 0, 0, 4, b'v', b'e', b'h', b'0']);
    }

    #[test]
    fn geo_conversion_params_layout() {
        let params = geo_conversion_params(Position2D { x: 1.0, y: 2.0 });
        let mut r = StorageReader::new(params);
        r.expect_tag(tag::COMPOUND).unwrap();
        assert_eq!(r.read_i32().unwrap(), 2);
        assert_eq!(
            r.read_typed_position().unwrap(),
            Position2D { x: 1.0, y: 2.0 }
        );
        r.expect_tag(tag::UBYTE).unwrap();
        assert_eq!(r.read_u8().unwrap(), tag::POSITION_LON_LAT);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn status_with_error_description() {
        let mut payload = BytesMut::new();
        payload.put_u8(status::ERR);
        put_string(&mut payload, "Vehicle 'x' is not known").unwrap();
        let frame = encode_command(command::GET_VEHICLE_VARIABLE, &payload).unwrap();

        let status = reader(&frame).read_status().unwrap();
        assert_eq!(status.command, command::GET_VEHICLE_VARIABLE);
        assert_eq!(status.result, status::ERR);
        assert_eq!(status.description, "Vehicle 'x' is not known");
    }

    #[test]
    fn typed_values_decode() {
        let mut buf = BytesMut::new();
        buf.put_u8(tag::DOUBLE);
        buf.put_f64(13.5);
        buf.put_u8(tag::STRING);
        put_string(&mut buf, "bus_city").unwrap();
        put_string_list(&mut buf, &["a".to_owned(), "b".to_owned()]).unwrap();
        buf.put_u8(tag::POSITION_LON_LAT);
        buf.put_f64(13.4);
        buf.put_f64(52.5);

        let mut r = StorageReader::new(buf.freeze());
        assert_eq!(r.read_typed_f64().unwrap(), 13.5);
        assert_eq!(r.read_typed_string().unwrap(), "bus_city");
        assert_eq!(r.read_typed_string_list().unwrap(), vec!["a", "b"]);
        assert_eq!(r.read_typed_lon_lat().unwrap(), (13.4, 52.5));
    }

    #[test]
    fn shape_with_short_and_long_counts() {
        let mut short = BytesMut::new();
        short.put_u8(tag::POLYGON);
        short.put_u8(2);
        for v in [0.0, 0.0, 3.0, 4.0] {
            short.put_f64(v);
        }
        let shape = StorageReader::new(short.freeze()).read_typed_shape().unwrap();
        assert_eq!(shape.last(), Some(&Position2D { x: 3.0, y: 4.0 }));

        let mut long = BytesMut::new();
        long.put_u8(tag::POLYGON);
        long.put_u8(0);
        long.put_i32(300);
        for i in 0..600u32 {
            long.put_f64(f64::from(i));
        }
        let shape = StorageReader::new(long.freeze()).read_typed_shape().unwrap();
        assert_eq!(shape.len(), 300);
    }

    #[test]
    fn controlled_links_decode() {
        let mut buf = BytesMut::new();
        buf.put_u8(tag::COMPOUND);
        buf.put_i32(3);
        buf.put_u8(tag::INTEGER);
        buf.put_i32(1);
        buf.put_u8(tag::INTEGER);
        buf.put_i32(1);
        put_string_list(
            &mut buf,
            &["in_0".to_owned(), "out_0".to_owned(), ":j_0".to_owned()],
        )
        .unwrap();

        let links = StorageReader::new(buf.freeze())
            .read_controlled_links()
            .unwrap();
        assert_eq!(links.len(), 1);
        let first = links.first().and_then(|s| s.first()).unwrap();
        assert_eq!(first.incoming_lane, "in_0");
        assert_eq!(first.via_lane, ":j_0");
    }

    #[test]
    fn truncated_input_is_malformed_not_a_panic() {
        assert!(matches!(
            reader(&[0, 0]).read_i32(),
            Err(TraciError::Malformed(_))
        ));
        assert!(matches!(
            reader(&[0, 0, 0, 9, b'a']).read_string(),
            Err(TraciError::Malformed(_))
        ));
        assert!(matches!(
            reader(&[0xFF, 0xFF, 0xFF, 0xFF]).read_string_list(),
            Err(TraciError::Malformed(_))
        ));
        assert!(matches!(
            reader(&[tag::DOUBLE, 0, 0]).read_typed_string(),
            Err(TraciError::Malformed(_))
        ));
    }
}
