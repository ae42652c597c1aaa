//! Per-producer device configuration: device→ship alignment matrices,
//! compass bias, and modality priority (`imu_receiver.h`'s `imu_class`).

use nalgebra::{Matrix3, Vector3};

/// `IMU_PRI_1..IMU_PRI_NULL`: 1 is always used, 2 is used at half weight,
/// 3 fills in only when 1 is absent, `Null` means the modality isn't
/// carried by this producer at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    P1,
    P2,
    P3,
    Null,
}

impl Priority {
    /// Blend weight relative to a P1 sample (spec §9: priority is a
    /// per-producer/per-modality tuple, not a fixed four rank slots).
    pub fn weight(self) -> f64 {
        match self {
            Priority::P1 => 1.0,
            Priority::P2 => 0.5,
            Priority::P3 => 0.5,
            Priority::Null => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priorities {
    pub gyr: Priority,
    pub acc: Priority,
    pub mag: Priority,
}

/// Alignment and calibration for one IMU producer.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub gyr_dev2ship: Matrix3<f64>,
    pub acc_dev2ship: Matrix3<f64>,
    pub mag_dev2ship: Matrix3<f64>,
    pub x_mag_bias: f64,
    pub z_mag_bias: f64,
    pub priority: Priorities,
}

impl DeviceConfig {
    pub fn identity(priority: Priorities) -> Self {
        DeviceConfig {
            gyr_dev2ship: Matrix3::identity(),
            acc_dev2ship: Matrix3::identity(),
            mag_dev2ship: Matrix3::identity(),
            x_mag_bias: 0.0,
            z_mag_bias: 0.0,
            priority,
        }
    }

    /// Rotate a raw sample into ship space (z forward, y up, x to port)
    /// and apply compass bias correction, matching `rotate_and_log`.
    pub fn transform(&self, gyr: Vector3<f64>, acc: Vector3<f64>, mag: Vector3<f64>) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
        let gyr = self.gyr_dev2ship * gyr;
        let acc = self.acc_dev2ship * acc;
        let mut mag = self.mag_dev2ship * mag;
        mag.x -= self.x_mag_bias;
        mag.z -= self.z_mag_bias;
        (gyr, acc, mag)
    }
}
