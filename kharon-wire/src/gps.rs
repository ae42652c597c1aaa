//! GPS text-block wire format (spec §6): a 256-byte block holding a leading
//! `"%.3f"` timestamp, a space, then one NMEA sentence.

use kharon_core::KharonError;

pub const GPS_BLOCK_SIZE: usize = 256;

/// One timestamped NMEA sentence as received off the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsBlock {
    pub timestamp: f64,
    pub sentence: String,
}

pub fn parse_gps_block(block: &[u8]) -> Result<GpsBlock, KharonError> {
    let end = block.iter().position(|&b| b == 0).unwrap_or(block.len());
    let text = std::str::from_utf8(&block[..end])
        .map_err(|_| KharonError::protocol("gps block is not valid utf8"))?
        .trim_end();
    let (ts_str, sentence) = text
        .split_once(' ')
        .ok_or_else(|| KharonError::protocol("gps block missing timestamp separator"))?;
    let timestamp: f64 = ts_str
        .parse()
        .map_err(|_| KharonError::protocol(format!("malformed gps timestamp: {ts_str:?}")))?;
    Ok(GpsBlock {
        timestamp,
        sentence: sentence.to_string(),
    })
}

pub fn format_gps_block(block: &GpsBlock) -> [u8; GPS_BLOCK_SIZE] {
    let mut buf = [0u8; GPS_BLOCK_SIZE];
    let text = format!("{:.3} {}", block.timestamp, block.sentence);
    let bytes = text.as_bytes();
    let n = bytes.len().min(GPS_BLOCK_SIZE);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_timestamp_and_sentence() {
        let block = GpsBlock {
            timestamp: 10.125,
            sentence: "$GPGGA,123519,4807.038,N,01131.000,E*6A".to_string(),
        };
        let wire = format_gps_block(&block);
        let back = parse_gps_block(&wire).unwrap();
        assert_eq!(back, block);
    }
}
