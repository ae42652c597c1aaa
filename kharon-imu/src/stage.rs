//! IMU receiver stage (spec §2.4/§4.2): reads fixed-length ASCII sensor
//! packets off a TCP stream, rotates them into ship space, upsamples onto
//! the 10ms grid, and publishes.

use std::io::Read;
use std::sync::Arc;

use nalgebra::Vector3;
use thread_control::Flag;
use tracing::{error, warn};

use kharon_core::queue::Queue;
use kharon_core::KharonError;
use kharon_wire::imu::{read_sample, AVAIL_ACC, AVAIL_GYR, AVAIL_MAG};

use crate::config::DeviceConfig;
use crate::upsample::{Avail, ImuSample, RawSample, UpsampleState};

pub struct ImuReceiver {
    name: String,
    reader: Box<dyn Read + Send>,
    config: DeviceConfig,
    state: UpsampleState,
    queue: Arc<Queue<ImuSample>>,
}

impl ImuReceiver {
    pub fn new(
        name: impl Into<String>,
        reader: Box<dyn Read + Send>,
        config: DeviceConfig,
        queue: Arc<Queue<ImuSample>>,
    ) -> Self {
        ImuReceiver {
            name: name.into(),
            reader,
            config,
            state: UpsampleState::new(),
            queue,
        }
    }

    pub fn queue(&self) -> &Arc<Queue<ImuSample>> {
        &self.queue
    }
}

impl kharon_core::scheduler::Stage for ImuReceiver {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, flag: &Flag) {
        while flag.is_alive() {
            // A read timeout (socket configured by the caller) surfaces as
            // WouldBlock/TimedOut; that's not a disconnect, just a chance to
            // re-check `flag` so shutdown isn't stuck behind a blocking read.
            let (header, raw) = match read_sample(&mut self.reader) {
                Ok(v) => v,
                Err(KharonError::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(KharonError::Io(e)) => {
                    error!(stage = %self.name, error = %e, "imu read failed, reconnect required");
                    break;
                }
                Err(e) => {
                    warn!(stage = %self.name, error = %e, "malformed imu packet");
                    continue;
                }
            };
            let (gyr, acc, mag) = self.config.transform(
                Vector3::from_row_slice(&raw.gyr),
                Vector3::from_row_slice(&raw.acc),
                Vector3::from_row_slice(&raw.mag),
            );
            let sample = RawSample {
                timestamp: header.timestamp,
                gyr,
                acc,
                mag,
                avail: Avail {
                    gyr: raw.avail & AVAIL_GYR != 0,
                    acc: raw.avail & AVAIL_ACC != 0,
                    mag: raw.avail & AVAIL_MAG != 0,
                },
            };
            let config = &self.config;
            let queue = &self.queue;
            self.state.ingest(&sample, config, |t, out| {
                queue.push(t, out);
            });
        }
    }
}
