//! Published attitude record (`attitude_output_type`), minus the GPS
//! fields the original struct piggybacked on it — GPS has its own stream
//! here (spec's data model keeps position and attitude separate).

use nalgebra::{Matrix3, Vector3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttitudeRecord {
    pub ship2world: Matrix3<f64>,
    pub acc: Vector3<f64>,
    pub mag: Vector3<f64>,
    pub gyr: Vector3<f64>,
    pub acc_len: f64,
    pub mag_len: f64,
    pub true_heading_deg: f64,
    pub mag_heading_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub turn_rate_dps: f64,
    /// Set while the complementary filter is re-bootstrapping after losing
    /// its gyro input (spec §7: downstream consumers, e.g. the beeper,
    /// surface this as a "running blind" alert).
    pub running_blind: bool,
}
