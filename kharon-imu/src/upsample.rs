//! Upsample raw, irregularly-timed IMU samples onto a fixed 10ms grid,
//! grounded on `receiver_logic.c`'s `publish_upsample_gyro` /
//! `publish_upsample_no_gyro`.
//!
//! Gyro data is accumulated as rotation-vector-weighted fractions of the
//! interval between samples and flushed at each grid tick; ACC and MAG are
//! republished from a "recycle" cache until it goes stale, since they
//! report slower than the output grid.

use nalgebra::Vector3;

use crate::config::{DeviceConfig, Priority};

pub const IMU_PRODUCER_INTERVAL_US: i64 = 10_000;
pub const ACC_RECYCLE_DURATION_USEC: i64 = 150_000;
pub const MAG_RECYCLE_DURATION_USEC: i64 = 150_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Avail {
    pub gyr: bool,
    pub acc: bool,
    pub mag: bool,
}

/// One raw sample as received off the wire, already rotated into ship
/// space by `DeviceConfig::transform`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub timestamp: f64,
    pub gyr: Vector3<f64>,
    pub acc: Vector3<f64>,
    pub mag: Vector3<f64>,
    pub avail: Avail,
}

/// One upsampled output record (`imu_output_type`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    pub gyr: Vector3<f64>,
    pub acc: Vector3<f64>,
    pub mag: Vector3<f64>,
    pub avail: Avail,
}

fn round_down_usec(usec: i64, interval: i64) -> i64 {
    (usec / interval) * interval
}

fn round_up_usec(usec: i64, interval: i64) -> i64 {
    ((usec + interval) / interval) * interval
}

fn usec_from_secs(seconds: f64) -> i64 {
    (seconds * 1.0e6).round() as i64
}

fn secs_from_usec(usec: i64) -> f64 {
    usec as f64 * 1.0e-6
}

/// Per-producer upsampling state, one instance per IMU stream.
pub struct UpsampleState {
    prev_publish_t_usec: i64,
    prev_gyr_data_t_usec: i64,
    recycle_value: [Vector3<f64>; 3],
    recycle_timer_usec: [i64; 3],
    initialized: bool,
}

const IDX_GYR: usize = 0;
const IDX_ACC: usize = 1;
const IDX_MAG: usize = 2;

impl Default for UpsampleState {
    fn default() -> Self {
        UpsampleState {
            prev_publish_t_usec: 0,
            prev_gyr_data_t_usec: 0,
            recycle_value: [Vector3::zeros(); 3],
            recycle_timer_usec: [0; 3],
            initialized: false,
        }
    }
}

impl UpsampleState {
    pub fn new() -> Self {
        Self::default()
    }

    fn recycle_acc_mag(&mut self, sample: &RawSample) {
        if sample.avail.acc {
            self.recycle_value[IDX_ACC] = sample.acc;
            self.recycle_timer_usec[IDX_ACC] = ACC_RECYCLE_DURATION_USEC;
        }
        if sample.avail.mag {
            self.recycle_value[IDX_MAG] = sample.mag;
            self.recycle_timer_usec[IDX_MAG] = MAG_RECYCLE_DURATION_USEC;
        }
    }

    /// Ingest one raw sample and emit zero or more upsampled grid ticks to
    /// `publish`. `config.priority.gyr == Priority::Null` selects the
    /// acc/mag-only branch (no gyro carried by this producer at all);
    /// otherwise a sample missing gyro availability is dropped, matching
    /// the source ("No gyro data available").
    pub fn ingest(&mut self, sample: &RawSample, config: &DeviceConfig, mut publish: impl FnMut(f64, ImuSample)) {
        let data_t = usec_from_secs(sample.timestamp);
        if !self.initialized {
            self.prev_publish_t_usec = round_down_usec(data_t, IMU_PRODUCER_INTERVAL_US);
            self.prev_gyr_data_t_usec = data_t;
            self.initialized = true;
        }
        self.recycle_acc_mag(sample);

        if config.priority.gyr == Priority::Null {
            self.publish_no_gyro(sample, data_t, &mut publish);
        } else if sample.avail.gyr {
            self.publish_gyro(sample, data_t, &mut publish);
        }
    }

    fn publish_no_gyro(&mut self, sample: &RawSample, data_t: i64, publish: &mut impl FnMut(f64, ImuSample)) {
        let mut next_t = round_up_usec(self.prev_publish_t_usec, IMU_PRODUCER_INTERVAL_US);
        while next_t <= data_t {
            let mut out = ImuSample {
                gyr: Vector3::zeros(),
                acc: Vector3::zeros(),
                mag: Vector3::zeros(),
                avail: Avail::default(),
            };
            if self.recycle_timer_usec[IDX_ACC] > 0 {
                out.acc = sample.acc;
                out.avail.acc = true;
                self.recycle_timer_usec[IDX_ACC] -= IMU_PRODUCER_INTERVAL_US;
            }
            if self.recycle_timer_usec[IDX_MAG] > 0 {
                out.mag = sample.mag;
                out.avail.mag = true;
                self.recycle_timer_usec[IDX_MAG] -= IMU_PRODUCER_INTERVAL_US;
            }
            publish(secs_from_usec(next_t), out);
            self.prev_publish_t_usec = next_t;
            next_t += IMU_PRODUCER_INTERVAL_US;
        }
    }

    fn publish_gyro(&mut self, sample: &RawSample, data_t: i64, publish: &mut impl FnMut(f64, ImuSample)) {
        let mut next_t = round_up_usec(self.prev_publish_t_usec, IMU_PRODUCER_INTERVAL_US);

        if data_t < self.prev_gyr_data_t_usec {
            tracing::error!(
                previous = secs_from_usec(self.prev_gyr_data_t_usec),
                present = secs_from_usec(data_t),
                "out-of-order imu packets detected"
            );
            self.prev_gyr_data_t_usec = data_t;
        }

        let curr_gyr = sample.gyr;
        while next_t < data_t {
            let mut out = ImuSample {
                gyr: Vector3::zeros(),
                acc: Vector3::zeros(),
                mag: Vector3::zeros(),
                avail: Avail { gyr: true, acc: false, mag: false },
            };
            if self.recycle_timer_usec[IDX_ACC] > 0 {
                out.acc = sample.acc;
                out.avail.acc = true;
                self.recycle_timer_usec[IDX_ACC] -= IMU_PRODUCER_INTERVAL_US;
            }
            if self.recycle_timer_usec[IDX_MAG] > 0 {
                out.mag = sample.mag;
                out.avail.mag = true;
                self.recycle_timer_usec[IDX_MAG] -= IMU_PRODUCER_INTERVAL_US;
            }
            let k = (next_t - self.prev_gyr_data_t_usec) as f64 / IMU_PRODUCER_INTERVAL_US as f64;
            self.recycle_value[IDX_GYR] += curr_gyr * k;
            out.gyr = self.recycle_value[IDX_GYR];

            publish(secs_from_usec(next_t), out);

            self.prev_publish_t_usec = next_t;
            self.prev_gyr_data_t_usec = next_t;
            next_t += IMU_PRODUCER_INTERVAL_US;
            self.recycle_value[IDX_GYR] = Vector3::zeros();
        }

        let k = (data_t - self.prev_gyr_data_t_usec) as f64 / IMU_PRODUCER_INTERVAL_US as f64;
        self.recycle_value[IDX_GYR] += curr_gyr * k;
        self.prev_gyr_data_t_usec = data_t;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Priorities, Priority};

    fn gyro_priorities() -> Priorities {
        Priorities { gyr: Priority::P1, acc: Priority::P1, mag: Priority::P1 }
    }

    fn no_gyro_priorities() -> Priorities {
        Priorities { gyr: Priority::Null, acc: Priority::P1, mag: Priority::P1 }
    }

    #[test]
    fn gyro_branch_publishes_on_the_10ms_grid() {
        let config = DeviceConfig::identity(gyro_priorities());
        let mut state = UpsampleState::new();
        let mut outputs = Vec::new();

        let s1 = RawSample {
            timestamp: 1.000,
            gyr: Vector3::new(1.0, 0.0, 0.0),
            acc: Vector3::new(0.0, 0.0, 9.8),
            mag: Vector3::zeros(),
            avail: Avail { gyr: true, acc: true, mag: false },
        };
        state.ingest(&s1, &config, |t, s| outputs.push((t, s)));
        assert!(outputs.is_empty(), "first sample only seeds the clocks");

        let s2 = RawSample {
            timestamp: 1.010,
            gyr: Vector3::new(1.0, 0.0, 0.0),
            acc: Vector3::new(0.0, 0.0, 9.8),
            mag: Vector3::zeros(),
            avail: Avail { gyr: true, acc: true, mag: false },
        };
        state.ingest(&s2, &config, |t, s| outputs.push((t, s)));
        assert_eq!(outputs.len(), 1);
        assert!((outputs[0].0 - 1.010).abs() < 1e-9);
        assert!(outputs[0].1.avail.gyr);
        assert!(outputs[0].1.avail.acc);
        assert!(!outputs[0].1.avail.mag);
    }

    #[test]
    fn no_gyro_branch_republishes_recycled_acc_mag() {
        let config = DeviceConfig::identity(no_gyro_priorities());
        let mut state = UpsampleState::new();
        let mut outputs = Vec::new();

        let s1 = RawSample {
            timestamp: 1.000,
            gyr: Vector3::zeros(),
            acc: Vector3::new(1.0, 2.0, 3.0),
            mag: Vector3::new(4.0, 5.0, 6.0),
            avail: Avail { gyr: false, acc: true, mag: true },
        };
        state.ingest(&s1, &config, |t, s| outputs.push((t, s)));

        let s2 = RawSample {
            timestamp: 1.025,
            gyr: Vector3::zeros(),
            acc: Vector3::new(1.0, 2.0, 3.0),
            mag: Vector3::new(4.0, 5.0, 6.0),
            avail: Avail { gyr: false, acc: false, mag: false },
        };
        state.ingest(&s2, &config, |t, s| outputs.push((t, s)));
        assert_eq!(outputs.len(), 2);
        for (_, sample) in &outputs {
            assert!(sample.avail.acc && sample.avail.mag);
        }
    }

    #[test]
    fn constant_gyro_rate_integrates_without_loss() {
        let config = DeviceConfig::identity(gyro_priorities());
        let mut state = UpsampleState::new();
        let mut outputs: Vec<(f64, ImuSample)> = Vec::new();

        // A constant rate held across raw samples whose spacing is
        // deliberately not a multiple of the 10ms grid, so every tick's
        // k-weighting is fractional rather than exactly 0 or 1.
        let rate = Vector3::new(0.3, -0.2, 0.15);
        let step_secs = 0.0037;
        let mut t = 1.000;
        for _ in 0..400 {
            t += step_secs;
            let sample = RawSample {
                timestamp: t,
                gyr: rate,
                acc: Vector3::new(0.0, 0.0, 9.8),
                mag: Vector3::zeros(),
                avail: Avail { gyr: true, acc: true, mag: false },
            };
            state.ingest(&sample, &config, |pt, s| outputs.push((pt, s)));
        }
        assert!(outputs.len() > 50, "expected many grid ticks over the covered span");

        // A weighted average of a constant rate must reproduce that rate
        // exactly (within float error): no tick should drift from it.
        for (_, s) in &outputs {
            assert!((s.gyr - rate).norm() < 1e-9, "{:?} drifted from constant input rate", s.gyr);
        }

        // The sum of published contributions across the covered span must
        // equal the analytically integrated angle: rate times elapsed time.
        let tick = secs_from_usec(IMU_PRODUCER_INTERVAL_US);
        let covered_secs = outputs.len() as f64 * tick;
        let integrated: Vector3<f64> = outputs.iter().map(|(_, s)| s.gyr * tick).sum();
        let expected = rate * covered_secs;
        assert!((integrated - expected).norm() < 1e-6);
    }

    #[test]
    fn acc_recycle_expires_after_timeout() {
        let config = DeviceConfig::identity(no_gyro_priorities());
        let mut state = UpsampleState::new();
        let mut outputs = Vec::new();

        let s1 = RawSample {
            timestamp: 1.000,
            gyr: Vector3::zeros(),
            acc: Vector3::new(1.0, 0.0, 0.0),
            mag: Vector3::zeros(),
            avail: Avail { gyr: false, acc: true, mag: false },
        };
        state.ingest(&s1, &config, |t, s| outputs.push((t, s)));

        let s2 = RawSample {
            timestamp: 1.200,
            gyr: Vector3::zeros(),
            acc: Vector3::new(1.0, 0.0, 0.0),
            mag: Vector3::zeros(),
            avail: Avail { gyr: false, acc: false, mag: false },
        };
        outputs.clear();
        state.ingest(&s2, &config, |t, s| outputs.push((t, s)));
        assert!(outputs.last().map(|(_, s)| !s.avail.acc).unwrap_or(true));
    }
}
