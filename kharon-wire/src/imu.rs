//! IMU serial wire format, grounded on `sensor_packet.h`/`pinet.c`: a fixed
//! header followed by `SP_SERIAL_LENGTH` ASCII bytes holding 14 floats in
//! `"%.7e"` fields of `FLOAT_SERIAL_BYTES` width.

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use kharon_core::KharonError;
use std::io::Read;

/// One float field, serialized as `%.7e`, reserves 16 significant bytes
/// (sign, `n.`, 7 digits, `+/-eNN`) plus 4 bytes of padding.
pub const FLOAT_SERIAL_BYTES: usize = 20;

/// gyr.xyz, acc.xyz, mag.xyz, gps.xyz, temp, baro
pub const NUM_SERIAL_FLOATS: usize = 14;

/// Which modalities a sample carries fresh data for
/// (`imu_modality_state_type.avail[]` in the source). There is no wire bit
/// for this — a field's availability is the field itself: a group the
/// source doesn't write is left as raw zero bytes, never formatted text
/// (even a genuine `0.0` value always serializes to a non-zero first byte,
/// since `%.7e` of zero is the ASCII text `"0.0000000e+00"`, not a NUL).
/// `restore_sensor_packet` recovers `avail` by checking each group's first
/// byte for that literal all-zero pattern.
pub const AVAIL_GYR: u32 = 0b001;
pub const AVAIL_ACC: u32 = 0b010;
pub const AVAIL_MAG: u32 = 0b100;

const IDX_GYR: usize = 0;
const IDX_ACC: usize = 3;
const IDX_MAG: usize = 6;

pub const SP_SERIAL_LENGTH: usize = NUM_SERIAL_FLOATS * FLOAT_SERIAL_BYTES;

/// Handshake/type tag sent as the first word of a connection, network byte
/// order. Matches `pinet.h`'s `IMU_STREAM_ID`.
pub const IMU_STREAM_ID: u32 = 0x3142_0001;

pub const HANDSHAKE_OK: u32 = 0x2818_0000;
pub const HANDSHAKE_ERROR: u32 = 0xffff_0000;

/// Bytes reserved in the packet header for free-form log text piggybacked
/// on a sample (spec §6). The original protocol's exact allotment isn't in
/// the excerpted source; this is a conservative, documented choice.
pub const SENSOR_PACKET_LOG_DATA: usize = 256;

/// Per-sample header preceding the ASCII float payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorPacketHeader {
    pub packet_type: u32,
    /// Acquisition timestamp, `%.4f` seconds since epoch.
    pub timestamp: f64,
    pub log: Vec<u8>,
}

impl SensorPacketHeader {
    pub fn new(packet_type: u32, timestamp: f64) -> Self {
        SensorPacketHeader {
            packet_type,
            timestamp,
            log: Vec::new(),
        }
    }
}

/// Serialize the header: `packet_type` (u32), `timestamp` (f64), log length
/// (u32) followed by the log bytes themselves.
pub fn write_header(header: &SensorPacketHeader) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + 8 + 4 + header.log.len());
    buf.write_u32::<NetworkEndian>(header.packet_type).unwrap();
    buf.write_f64::<NetworkEndian>(header.timestamp).unwrap();
    buf.write_u32::<NetworkEndian>(header.log.len() as u32).unwrap();
    buf.extend_from_slice(&header.log);
    buf
}

/// Read one header and its following `SP_SERIAL_LENGTH`-byte payload off a
/// blocking reader.
///
/// I/O errors (disconnects, truncated reads) come back as `KharonError::Io`
/// and mean the connection itself needs re-establishing; a malformed but
/// complete payload comes back as `KharonError::Protocol` and can be
/// skipped without dropping the connection.
pub fn read_sample(mut r: impl Read) -> Result<(SensorPacketHeader, SensorPacket), KharonError> {
    let packet_type = r.read_u32::<NetworkEndian>()?;
    let timestamp = r.read_f64::<NetworkEndian>()?;
    let log_len = r.read_u32::<NetworkEndian>()? as usize;
    if log_len > SENSOR_PACKET_LOG_DATA {
        return Err(KharonError::protocol("sensor packet log length exceeds maximum"));
    }
    let mut log = vec![0u8; log_len];
    r.read_exact(&mut log)?;
    let mut payload = [0u8; SP_SERIAL_LENGTH];
    r.read_exact(&mut payload)?;
    let packet = restore_sensor_packet(&payload)?;
    Ok((SensorPacketHeader { packet_type, timestamp, log }, packet))
}

/// One IMU sample as carried over the wire, before rotation into ship
/// frame (§4.2's `{gyr, acc, mag, temp, availability-bits}`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorPacket {
    pub gyr: [f64; 3],
    pub acc: [f64; 3],
    pub mag: [f64; 3],
    pub gps: [f64; 3],
    pub temp: f64,
    pub baro: f64,
    /// `AVAIL_GYR | AVAIL_ACC | AVAIL_MAG` bitmask of which modalities this
    /// sample carries fresh data for.
    pub avail: u32,
}

fn write_field(out: &mut [u8], v: f64) {
    debug_assert_eq!(out.len(), FLOAT_SERIAL_BYTES);
    let s = format!("{:.7e}", v);
    let bytes = s.as_bytes();
    for (dst, src) in out.iter_mut().zip(bytes.iter()) {
        *dst = *src;
    }
    for dst in out.iter_mut().skip(bytes.len()) {
        *dst = 0;
    }
}

/// Leave a field as raw zero bytes, marking it "not present" on the wire.
fn clear_field(out: &mut [u8]) {
    debug_assert_eq!(out.len(), FLOAT_SERIAL_BYTES);
    out.fill(0);
}

fn read_field(field: &[u8]) -> Result<f64, KharonError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let s = std::str::from_utf8(&field[..end])
        .map_err(|_| KharonError::protocol("sensor packet field is not valid utf8"))?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| KharonError::protocol(format!("malformed sensor packet field: {trimmed:?}")))
}

/// Serialize a sample into its `SP_SERIAL_LENGTH`-byte wire form. Groups
/// without their `avail` bit set are left as raw zero bytes rather than a
/// formatted `0.0`, matching the source's "only write what's available"
/// convention; gps/temp/baro (no avail bit in this protocol subset) are
/// always written.
pub fn serialize_sensor_packet(s: &SensorPacket) -> [u8; SP_SERIAL_LENGTH] {
    let mut buf = [0u8; SP_SERIAL_LENGTH];
    let values = [
        s.gyr[0], s.gyr[1], s.gyr[2], s.acc[0], s.acc[1], s.acc[2], s.mag[0], s.mag[1], s.mag[2],
        s.gps[0], s.gps[1], s.gps[2], s.temp, s.baro,
    ];
    for (i, v) in values.iter().enumerate() {
        let start = i * FLOAT_SERIAL_BYTES;
        let field = &mut buf[start..start + FLOAT_SERIAL_BYTES];
        let present = match i {
            IDX_GYR..=2 => s.avail & AVAIL_GYR != 0,
            IDX_ACC..=5 => s.avail & AVAIL_ACC != 0,
            IDX_MAG..=8 => s.avail & AVAIL_MAG != 0,
            _ => true,
        };
        if present {
            write_field(field, *v);
        } else {
            clear_field(field);
        }
    }
    buf
}

/// A field group is "not present" iff the source never wrote it, which on
/// the wire is indistinguishable from the whole field being literal zero
/// bytes (the first byte of any formatted value is always a digit or sign,
/// never `0x00`).
fn group_present(serial: &[u8], first_idx: usize) -> bool {
    serial[first_idx * FLOAT_SERIAL_BYTES] != 0
}

/// Parse a wire-form sample back into its components, deriving `avail`
/// from which field groups were actually written.
pub fn restore_sensor_packet(serial: &[u8]) -> Result<SensorPacket, KharonError> {
    if serial.len() != SP_SERIAL_LENGTH {
        return Err(KharonError::protocol(format!(
            "sensor packet wrong size: expected {SP_SERIAL_LENGTH}, got {}",
            serial.len()
        )));
    }
    let mut values = [0.0f64; NUM_SERIAL_FLOATS];
    for (i, slot) in values.iter_mut().enumerate() {
        let start = i * FLOAT_SERIAL_BYTES;
        *slot = read_field(&serial[start..start + FLOAT_SERIAL_BYTES])?;
    }
    let mut avail = 0u32;
    if group_present(serial, IDX_GYR) {
        avail |= AVAIL_GYR;
    }
    if group_present(serial, IDX_ACC) {
        avail |= AVAIL_ACC;
    }
    if group_present(serial, IDX_MAG) {
        avail |= AVAIL_MAG;
    }
    Ok(SensorPacket {
        gyr: [values[0], values[1], values[2]],
        acc: [values[3], values[4], values[5]],
        mag: [values[6], values[7], values[8]],
        gps: [values[9], values[10], values[11]],
        temp: values[12],
        baro: values[13],
        avail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn round_trip_reproduces_seven_significant_digits() {
        let s = SensorPacket {
            gyr: [1.234_567_8, -2.0, 0.0],
            acc: [0.0, 9.810_000_1, 0.0],
            mag: [1.0e-3, -1.0e3, 42.5],
            gps: [-122.123_456_7, 37.987_654_3, 0.0],
            temp: 23.456_78,
            baro: 1013.25,
            avail: AVAIL_GYR | AVAIL_ACC | AVAIL_MAG,
        };
        let wire = serialize_sensor_packet(&s);
        let back = restore_sensor_packet(&wire).unwrap();
        assert_relative_eq!(back.gyr[0], s.gyr[0], max_relative = 1e-6);
        assert_relative_eq!(back.acc[1], s.acc[1], max_relative = 1e-6);
        assert_relative_eq!(back.mag[1], s.mag[1], max_relative = 1e-6);
        assert_relative_eq!(back.gps[0], s.gps[0], max_relative = 1e-6);
        assert_relative_eq!(back.temp, s.temp, max_relative = 1e-6);
        assert_eq!(back.avail, s.avail);
    }

    #[test]
    fn all_zero_field_round_trips_to_zero() {
        let s = SensorPacket::default();
        let wire = serialize_sensor_packet(&s);
        let back = restore_sensor_packet(&wire).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let too_short = vec![0u8; SP_SERIAL_LENGTH - 1];
        assert!(restore_sensor_packet(&too_short).is_err());
    }

    #[test]
    fn packet_is_280_bytes() {
        assert_eq!(SP_SERIAL_LENGTH, 280);
    }

    #[test]
    fn absent_group_is_left_as_raw_zero_bytes() {
        let s = SensorPacket {
            gyr: [1.0, 2.0, 3.0],
            avail: 0, // gyro not marked available, despite nonzero values
            ..Default::default()
        };
        let wire = serialize_sensor_packet(&s);
        assert!(wire[..3 * FLOAT_SERIAL_BYTES].iter().all(|&b| b == 0));
        let back = restore_sensor_packet(&wire).unwrap();
        assert_eq!(back.avail & AVAIL_GYR, 0);
        assert_eq!(back.gyr, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn present_group_with_zero_value_still_round_trips_as_available() {
        let s = SensorPacket { acc: [0.0, 0.0, 0.0], avail: AVAIL_ACC, ..Default::default() };
        let wire = serialize_sensor_packet(&s);
        let start = 3 * FLOAT_SERIAL_BYTES;
        assert_ne!(wire[start], 0, "a written zero value is ASCII text, not a NUL byte");
        let back = restore_sensor_packet(&wire).unwrap();
        assert_eq!(back.avail & AVAIL_ACC, AVAIL_ACC);
    }

    #[test]
    fn header_then_payload_round_trips() {
        use std::io::Cursor;
        let header = SensorPacketHeader {
            packet_type: IMU_STREAM_ID,
            timestamp: 12.5,
            log: b"boot ok".to_vec(),
        };
        let packet = SensorPacket {
            gyr: [0.1, 0.2, 0.3],
            avail: AVAIL_GYR,
            ..Default::default()
        };
        let mut wire = write_header(&header);
        wire.extend_from_slice(&serialize_sensor_packet(&packet));
        let (h, p) = read_sample(Cursor::new(wire)).unwrap();
        assert_eq!(h.packet_type, header.packet_type);
        assert_eq!(h.log, header.log);
        assert_relative_eq!(p.gyr[0], packet.gyr[0], max_relative = 1e-6);
        assert_eq!(p.avail, AVAIL_GYR);
    }
}
