//! GPS receiver stage (spec §2.5): reads 256-byte text blocks off a TCP
//! stream, parses the embedded NMEA sentence, and publishes a fix once the
//! minimum {time, lat, lon} set is present.

use std::io::{ErrorKind, Read};
use std::sync::Arc;

use kharon_core::queue::Queue;
use thread_control::Flag;
use tracing::{error, warn};

use kharon_wire::gps::{parse_gps_block, GPS_BLOCK_SIZE};

use crate::nmea::parse_sentence;

/// A published GPS fix (spec §6: position/course/speed once the minimum
/// set is present).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GpsFix {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub course_deg: Option<f64>,
    pub speed_mps: Option<f64>,
}

pub struct GpsReceiver {
    name: String,
    reader: Box<dyn Read + Send>,
    queue: Arc<Queue<GpsFix>>,
}

impl GpsReceiver {
    pub fn new(name: impl Into<String>, reader: Box<dyn Read + Send>, queue: Arc<Queue<GpsFix>>) -> Self {
        GpsReceiver {
            name: name.into(),
            reader,
            queue,
        }
    }

    pub fn queue(&self) -> &Arc<Queue<GpsFix>> {
        &self.queue
    }

    fn read_one_block(&mut self) -> std::io::Result<[u8; GPS_BLOCK_SIZE]> {
        let mut buf = [0u8; GPS_BLOCK_SIZE];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl kharon_core::scheduler::Stage for GpsReceiver {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, flag: &Flag) {
        while flag.is_alive() {
            // A read timeout (socket configured by the caller) surfaces as
            // WouldBlock/TimedOut; that's not a disconnect, just a chance to
            // re-check `flag` so shutdown isn't stuck behind a blocking read.
            let block = match self.read_one_block() {
                Ok(b) => b,
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    continue;
                }
                Err(e) => {
                    error!(stage = %self.name, error = %e, "gps read failed, reconnect required");
                    break;
                }
            };
            let parsed = match parse_gps_block(&block) {
                Ok(p) => p,
                Err(e) => {
                    warn!(stage = %self.name, error = %e, "malformed gps block");
                    continue;
                }
            };
            let Some(nmea) = parse_sentence(&parsed.sentence) else {
                continue;
            };
            if !nmea.available.publishable() {
                continue;
            }
            let fix = GpsFix {
                latitude_deg: nmea.latitude_deg,
                longitude_deg: nmea.longitude_deg,
                course_deg: nmea.available.track.then_some(nmea.course_deg),
                speed_mps: nmea.available.speed.then_some(nmea.speed_mps),
            };
            self.queue.push(parsed.timestamp, fix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn block_for(timestamp: f64, sentence: &str) -> Vec<u8> {
        let block = kharon_wire::gps::GpsBlock {
            timestamp,
            sentence: sentence.to_string(),
        };
        kharon_wire::gps::format_gps_block(&block).to_vec()
    }

    #[test]
    fn publishes_on_minimum_field_set() {
        let mut bytes = Vec::new();
        bytes.extend(block_for(
            10.0,
            "GPGGA,161229.487,3723.2475,N,12158.3416,W,1,07,1.0,9.0,M,,,,0000",
        ));
        let queue = Arc::new(Queue::new(8, 1));
        let mut stage = GpsReceiver::new("gps", Box::new(Cursor::new(bytes)), queue.clone());
        let (flag, control) = thread_control::make_pair();
        control.stop();
        let _ = flag;
        // run() exits on first read error (EOF) after processing the block
        let (flag2, _control2) = thread_control::make_pair();
        kharon_core::scheduler::Stage::run(&mut stage, &flag2);
        assert_eq!(queue.produced(), 1);
    }
}
