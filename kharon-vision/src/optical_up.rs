//! Optical-up (spec §2.9/§4.6, interface-level): for each camera frame,
//! look up the ship's attitude at capture time minus hardware latency and
//! stamp the frame with it. Reprojection onto an image pyramid is a
//! Non-goal (no camera codec); `Reprojector` is the seam a later
//! implementation would fill in, with a no-op pass-through default.
//! Grounded on `optical_up.c`'s `optical_up_class_run`.

use std::sync::Arc;

use nalgebra::Matrix3;
use thread_control::Flag;
use tracing::debug;

use kharon_attitude::{get_attitude, QueryStatus};
use kharon_core::queue::{Cursor, Queue};
use kharon_wire::camera::Frame;

/// Hardware latency compensation: attitude is queried 30ms before frame
/// receipt time to line up with when the sensor actually captured it.
pub const FRAME_DELAY_SEC: f64 = 0.030;

#[derive(Debug, Clone)]
pub struct OpticalUpOutput {
    pub t: f64,
    pub cam_num: u8,
    pub ship2world: Matrix3<f64>,
    pub heading_deg: f64,
    pub frame: Frame,
}

/// Reprojects a raw camera frame onto a ship-stabilized image pyramid.
/// Real implementations interpolate the V/Y planes onto a sphere-patch
/// grid; there is no such codec here, so the default just passes the
/// frame through unchanged.
pub trait Reprojector: Send {
    fn reproject(&mut self, frame: &Frame, ship2world: &Matrix3<f64>) -> Frame {
        let _ = ship2world;
        frame.clone()
    }
}

pub struct PassThrough;
impl Reprojector for PassThrough {}

pub struct OpticalUp<R> {
    name: String,
    cam_num: u8,
    frames: Arc<Queue<Frame>>,
    frame_cursor: Cursor,
    attitude: Arc<Queue<kharon_attitude::AttitudeRecord>>,
    attitude_prev_idx: u64,
    reprojector: R,
    out_queue: Arc<Queue<OpticalUpOutput>>,
}

impl<R: Reprojector> OpticalUp<R> {
    pub fn new(
        name: impl Into<String>,
        cam_num: u8,
        frames: Arc<Queue<Frame>>,
        attitude: Arc<Queue<kharon_attitude::AttitudeRecord>>,
        reprojector: R,
        out_queue: Arc<Queue<OpticalUpOutput>>,
    ) -> Self {
        OpticalUp {
            name: name.into(),
            cam_num,
            frames,
            frame_cursor: Cursor::new(),
            attitude,
            attitude_prev_idx: 0,
            reprojector,
            out_queue,
        }
    }

    pub fn out_queue(&self) -> &Arc<Queue<OpticalUpOutput>> {
        &self.out_queue
    }

    /// Drain whatever frames are ready, stopping early (without consuming)
    /// on `PENDING` so the same frame is retried once more attitude data
    /// has arrived.
    fn drain_ready_frames(&mut self) {
        while self.frame_cursor.has_data(&self.frames) {
            let idx = self.frame_cursor.consumed();
            let Some((_, frame)) = self.frames.get(idx) else {
                self.frame_cursor.advance_to(idx + 1);
                continue;
            };
            let t = frame.header.receive_time;
            match get_attitude(&self.attitude, t - FRAME_DELAY_SEC, &mut self.attitude_prev_idx) {
                QueryStatus::Pending => {
                    debug!(stage = %self.name, t, "attitude not yet available, retrying frame later");
                    break;
                }
                QueryStatus::Missing => {
                    self.frame_cursor.advance_to(idx + 1);
                    continue;
                }
                QueryStatus::Found(att) => {
                    let reprojected = self.reprojector.reproject(&frame, &att.ship2world);
                    self.out_queue.push(
                        t,
                        OpticalUpOutput {
                            t,
                            cam_num: self.cam_num,
                            ship2world: att.ship2world,
                            heading_deg: att.true_heading_deg,
                            frame: reprojected,
                        },
                    );
                    self.frame_cursor.advance_to(idx + 1);
                }
            }
        }
    }
}

impl<R: Reprojector> kharon_core::scheduler::Stage for OpticalUp<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, flag: &Flag) {
        while flag.is_alive() {
            self.frames.wait_or_flag(self.frame_cursor.consumed(), flag);
            self.drain_ready_frames();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kharon_attitude::AttitudeRecord;
    use kharon_wire::camera::FrameHeader;

    fn frame_at(t: f64) -> Frame {
        Frame {
            header: FrameHeader { packet_type: 1, request_time: t, receive_time: t, rows: 1, cols: 1 },
            v_channel: vec![0],
            y_channel: vec![0],
        }
    }

    fn attitude_at(_t: f64) -> AttitudeRecord {
        AttitudeRecord {
            ship2world: Matrix3::identity(),
            acc: nalgebra::Vector3::new(0.0, 1.0, 0.0),
            mag: nalgebra::Vector3::new(0.0, 0.0, 1.0),
            gyr: nalgebra::Vector3::zeros(),
            acc_len: 9.8,
            mag_len: 1.0,
            true_heading_deg: 0.0,
            mag_heading_deg: 0.0,
            pitch_deg: 0.0,
            roll_deg: 0.0,
            turn_rate_dps: 0.0,
            running_blind: false,
        }
    }

    #[test]
    fn drops_frame_when_attitude_missing() {
        let frames: Arc<Queue<Frame>> = Arc::new(Queue::new(8, 1));
        let attitude: Arc<Queue<AttitudeRecord>> = Arc::new(Queue::new(8, 1));
        attitude.push(100.0, attitude_at(100.0));
        attitude.push(101.0, attitude_at(101.0));
        frames.push(1.0, frame_at(1.0)); // long before any attitude sample
        let out = Arc::new(Queue::new(8, 1));
        let mut stage = OpticalUp::new("optical_up0", 0, frames, attitude, PassThrough, out.clone());
        stage.drain_ready_frames();
        assert_eq!(out.produced(), 0);
    }

    #[test]
    fn publishes_frame_when_attitude_found() {
        let frames: Arc<Queue<Frame>> = Arc::new(Queue::new(8, 1));
        let attitude: Arc<Queue<AttitudeRecord>> = Arc::new(Queue::new(8, 1));
        attitude.push(0.5, attitude_at(0.5));
        attitude.push(1.5, attitude_at(1.5));
        frames.push(1.0, frame_at(1.0));
        let out = Arc::new(Queue::new(8, 1));
        let mut stage = OpticalUp::new("optical_up0", 0, frames, attitude, PassThrough, out.clone());
        stage.drain_ready_frames();
        assert_eq!(out.produced(), 1);
    }
}
