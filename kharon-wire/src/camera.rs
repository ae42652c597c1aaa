//! Camera (VY) wire format, grounded on `pinet.h` and `camera_vy.c`'s
//! header-then-payload protocol: a handshake exchange followed by a
//! fixed header and a V-channel/Y-channel payload.

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use kharon_core::KharonError;
use std::io::{Cursor, Read};

pub const VY_STREAM_ID: u32 = 0x3142_0004;
pub const HANDSHAKE_OK: u32 = 0x2818_0000;
pub const HANDSHAKE_ERROR: u32 = 0xffff_0000;

/// Fixed per-frame header: packet type, request/receive timestamps, and the
/// image dimensions of the V/Y payload that follows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    pub packet_type: u32,
    pub request_time: f64,
    pub receive_time: f64,
    pub rows: u16,
    pub cols: u16,
}

pub const HEADER_LEN: usize = 4 + 8 + 8 + 2 + 2;

pub fn write_header(header: &FrameHeader) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    {
        let mut w: &mut [u8] = &mut buf;
        w.write_u32::<NetworkEndian>(header.packet_type).unwrap();
        w.write_f64::<NetworkEndian>(header.request_time).unwrap();
        w.write_f64::<NetworkEndian>(header.receive_time).unwrap();
        w.write_u16::<NetworkEndian>(header.rows).unwrap();
        w.write_u16::<NetworkEndian>(header.cols).unwrap();
    }
    buf
}

pub fn read_header(buf: &[u8]) -> Result<FrameHeader, KharonError> {
    if buf.len() != HEADER_LEN {
        return Err(KharonError::protocol("camera header wrong size"));
    }
    let mut c = Cursor::new(buf);
    let packet_type = c
        .read_u32::<NetworkEndian>()
        .map_err(|_| KharonError::protocol("truncated camera header"))?;
    let request_time = c
        .read_f64::<NetworkEndian>()
        .map_err(|_| KharonError::protocol("truncated camera header"))?;
    let receive_time = c
        .read_f64::<NetworkEndian>()
        .map_err(|_| KharonError::protocol("truncated camera header"))?;
    let rows = c
        .read_u16::<NetworkEndian>()
        .map_err(|_| KharonError::protocol("truncated camera header"))?;
    let cols = c
        .read_u16::<NetworkEndian>()
        .map_err(|_| KharonError::protocol("truncated camera header"))?;
    Ok(FrameHeader {
        packet_type,
        request_time,
        receive_time,
        rows,
        cols,
    })
}

/// A decoded frame: the header plus its V-channel and Y-channel payloads,
/// each `rows * cols` bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub v_channel: Vec<u8>,
    pub y_channel: Vec<u8>,
}

/// Read one handshake word and reply OK iff it matches `VY_STREAM_ID`.
/// Returns whether the handshake succeeded.
pub fn check_handshake(magic: u32) -> bool {
    magic == VY_STREAM_ID
}

pub fn handshake_reply(ok: bool) -> u32 {
    if ok {
        HANDSHAKE_OK
    } else {
        HANDSHAKE_ERROR
    }
}

/// Read one frame (header + V/Y payload) from a blocking reader. Dimension
/// mismatches between the declared header size and the bytes actually
/// available are a structural protocol error (spec §7: fatal).
pub fn read_frame(mut r: impl Read) -> Result<Frame, KharonError> {
    let mut hbuf = [0u8; HEADER_LEN];
    r.read_exact(&mut hbuf)
        .map_err(|_| KharonError::protocol("failed to read camera frame header"))?;
    let header = read_header(&hbuf)?;
    let plane_len = header.rows as usize * header.cols as usize;
    let mut v_channel = vec![0u8; plane_len];
    let mut y_channel = vec![0u8; plane_len];
    r.read_exact(&mut v_channel)
        .map_err(|_| KharonError::protocol("failed to read v-channel payload"))?;
    r.read_exact(&mut y_channel)
        .map_err(|_| KharonError::protocol("failed to read y-channel payload"))?;
    Ok(Frame {
        header,
        v_channel,
        y_channel,
    })
}
