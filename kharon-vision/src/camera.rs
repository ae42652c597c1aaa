//! Camera receiver stage (spec §2.8/§4.5 leaf): reads the VY handshake once,
//! then decodes frames off a blocking `Read` into the producer queue.
//! Grounded on `kharon-gps::stage`/`kharon-imu::stage`'s break-vs-continue
//! policy and `kharon_wire::camera`'s header-then-payload protocol.

use std::io::{Read, Write};
use std::sync::Arc;

use byteorder::{NetworkEndian, ReadBytesExt};
use thread_control::Flag;
use tracing::{error, info, warn};

use kharon_core::queue::Queue;
use kharon_core::KharonError;
use kharon_wire::camera::{check_handshake, handshake_reply, read_frame, Frame};

pub struct CameraReceiver<S> {
    name: String,
    cam_num: u8,
    stream: S,
    queue: Arc<Queue<Frame>>,
}

impl<S: Read + Write + Send> CameraReceiver<S> {
    pub fn new(name: impl Into<String>, cam_num: u8, stream: S, queue: Arc<Queue<Frame>>) -> Self {
        CameraReceiver { name: name.into(), cam_num, stream, queue }
    }

    pub fn queue(&self) -> &Arc<Queue<Frame>> {
        &self.queue
    }

    pub fn cam_num(&self) -> u8 {
        self.cam_num
    }

    fn do_handshake(&mut self, magic: u32) -> std::io::Result<bool> {
        let ok = check_handshake(magic);
        self.stream.write_all(&handshake_reply(ok).to_be_bytes())?;
        Ok(ok)
    }
}

impl<S: Read + Write + Send> kharon_core::scheduler::Stage for CameraReceiver<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_run(&mut self) -> Result<(), KharonError> {
        let magic = self.stream.read_u32::<NetworkEndian>()?;
        let ok = self.do_handshake(magic)?;
        if !ok {
            return Err(KharonError::protocol("camera handshake magic mismatch"));
        }
        info!(stage = %self.name, "camera handshake complete");
        Ok(())
    }

    fn run(&mut self, flag: &Flag) {
        while flag.is_alive() {
            // A read timeout (socket configured by the caller) surfaces as
            // WouldBlock/TimedOut; that's not a disconnect, just a chance to
            // re-check `flag` so shutdown isn't stuck behind a blocking read.
            match read_frame(&mut self.stream) {
                Ok(frame) => {
                    self.queue.push(frame.header.receive_time, frame);
                }
                Err(KharonError::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(KharonError::Io(e)) => {
                    error!(stage = %self.name, error = %e, "camera stream disconnected");
                    break;
                }
                Err(e) => {
                    warn!(stage = %self.name, error = %e, "dropping malformed camera frame");
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use kharon_wire::camera::{write_header, FrameHeader};

    struct ReadOnly(Cursor<Vec<u8>>);
    impl Read for ReadOnly {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.0.read(buf)
        }
    }
    impl Write for ReadOnly {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn handshake_replies_ok_for_correct_magic() {
        let stream = ReadOnly(Cursor::new(vec![]));
        let mut recv = CameraReceiver::new("cam0", 0, stream, Arc::new(Queue::new(8, 1)));
        assert!(recv.do_handshake(kharon_wire::camera::VY_STREAM_ID).unwrap());
    }

    #[test]
    fn decodes_one_frame_into_queue() {
        let h = FrameHeader { packet_type: 1, request_time: 1.0, receive_time: 1.001, rows: 1, cols: 1 };
        let mut wire = write_header(&h).to_vec();
        wire.push(9);
        wire.push(10);
        let stream = ReadOnly(Cursor::new(wire));
        let mut recv = CameraReceiver::new("cam0", 0, stream, Arc::new(Queue::new(8, 1)));
        let frame = read_frame(&mut recv.stream).unwrap();
        recv.queue.push(frame.header.receive_time, frame);
        assert_eq!(recv.queue.produced(), 1);
    }
}
