//! Complementary filter combining gyro integration with acc/mag
//! measurements, with a bootstrap ramp and a running predicted-error
//! correction term. Grounded on `publish.c`'s `apply_filter` /
//! `apply_filter_correction`.

use nalgebra::Vector3;

use crate::rotation::{gyro_vector_to_rotation_axis, measure_rotation, rotate_vector_about_axis};

pub const SAMPLE_DUR_SEC: f64 = 0.010;
const FILTER_TIME_CONSTANT_ACC_SEC: f64 = 30.0;
const FILTER_TIME_CONSTANT_MAG_SEC: f64 = 30.0;
const COMPLEMENTARY_TAU_ACC: f64 = SAMPLE_DUR_SEC / FILTER_TIME_CONSTANT_ACC_SEC;
const COMPLEMENTARY_TAU_MAG: f64 = SAMPLE_DUR_SEC / FILTER_TIME_CONSTANT_MAG_SEC;
pub const BOOTSTRAP_INTERVAL_SEC: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct FilterOutput {
    pub corrected_acc: Vector3<f64>,
    pub corrected_mag: Vector3<f64>,
    pub gyr: Vector3<f64>,
    pub acc_len: f64,
    pub mag_len: f64,
}

pub struct AttitudeFilter {
    comp_acc: Vector3<f64>,
    comp_mag: Vector3<f64>,
    corrected_acc: Vector3<f64>,
    corrected_mag: Vector3<f64>,
    gyr: Vector3<f64>,
    acc_len: f64,
    mag_len: f64,
    est_error_acc: Vector3<f64>,
    est_error_mag: Vector3<f64>,
    /// Seconds remaining in the bootstrap ramp. Zero once the gyro has
    /// reached full weight in the complementary filter.
    init_timer: f64,
}

impl Default for AttitudeFilter {
    fn default() -> Self {
        AttitudeFilter {
            comp_acc: Vector3::new(0.0, 1.0, 0.0),
            comp_mag: Vector3::new(0.0, 0.0, 1.0),
            corrected_acc: Vector3::new(0.0, 1.0, 0.0),
            corrected_mag: Vector3::new(0.0, 0.0, 1.0),
            gyr: Vector3::zeros(),
            acc_len: 0.0,
            mag_len: 0.0,
            est_error_acc: Vector3::zeros(),
            est_error_mag: Vector3::zeros(),
            init_timer: BOOTSTRAP_INTERVAL_SEC,
        }
    }
}

impl AttitudeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-enter the bootstrap ramp. Called whenever the merged gyro signal
    /// for a publication tick is missing (spec's "reset on lost gyro"),
    /// matching the source's reset-on-signal-loss behavior.
    pub fn reset_bootstrap(&mut self) {
        self.init_timer = BOOTSTRAP_INTERVAL_SEC;
    }

    pub fn is_bootstrapping(&self) -> bool {
        self.init_timer > 0.0
    }

    fn apply_correction(&mut self, unit_acc: &Vector3<f64>, k_acc: f64, unit_mag: &Vector3<f64>, k_mag: f64) {
        let (mut acc_err_axis, acc_theta) = measure_rotation(&self.comp_acc, unit_acc);
        let (mut mag_err_axis, mag_theta) = measure_rotation(&self.comp_mag, unit_mag);
        if acc_err_axis.norm() > 0.0 {
            acc_err_axis = acc_err_axis.normalize() * acc_theta;
        }
        if mag_err_axis.norm() > 0.0 {
            mag_err_axis = mag_err_axis.normalize() * mag_theta;
        }
        self.est_error_acc = self.est_error_acc * (1.0 - k_acc) + acc_err_axis * k_acc;
        self.est_error_mag = self.est_error_mag * (1.0 - k_mag) + mag_err_axis * k_mag;

        let acc_theta = self.est_error_acc.norm();
        self.corrected_acc = rotate_vector_about_axis(&self.est_error_acc, &self.comp_acc, acc_theta);
        let mag_theta = self.est_error_mag.norm();
        self.corrected_mag = rotate_vector_about_axis(&self.est_error_mag, &self.comp_mag, mag_theta);
    }

    /// Advance the filter by one sample. `dt_sec` is normally
    /// `SAMPLE_DUR_SEC`; it's taken as a parameter to tolerate gaps.
    pub fn step(&mut self, gyr: &Vector3<f64>, acc: &Vector3<f64>, mag: &Vector3<f64>, dt_sec: f64) -> FilterOutput {
        let acc_len = acc.norm();
        let mag_len = mag.norm();
        let unit_acc = if acc_len > 0.0 { acc / acc_len } else { *acc };
        let unit_mag = if mag_len > 0.0 { mag / mag_len } else { *mag };
        self.acc_len = acc_len;
        self.mag_len = mag_len;

        let (axis, theta_dps) = gyro_vector_to_rotation_axis(gyr);
        let rotation_deg = theta_dps * dt_sec;
        let new_acc = rotate_vector_about_axis(&axis, &self.comp_acc, rotation_deg);
        let new_mag = rotate_vector_about_axis(&axis, &self.comp_mag, rotation_deg);

        let mut k_acc = COMPLEMENTARY_TAU_ACC;
        let mut k_mag = COMPLEMENTARY_TAU_MAG;

        if self.init_timer > 0.0 {
            if self.init_timer >= BOOTSTRAP_INTERVAL_SEC {
                self.init_timer = BOOTSTRAP_INTERVAL_SEC - SAMPLE_DUR_SEC;
                self.comp_acc = unit_acc;
                self.comp_mag = unit_mag;
                return FilterOutput {
                    corrected_acc: self.comp_acc,
                    corrected_mag: self.comp_mag,
                    gyr: self.gyr,
                    acc_len: self.acc_len,
                    mag_len: self.mag_len,
                };
            }
            let k = 0.05 * self.init_timer / BOOTSTRAP_INTERVAL_SEC;
            k_acc = (1.0 - k) * COMPLEMENTARY_TAU_ACC + k;
            k_mag = (1.0 - k) * COMPLEMENTARY_TAU_MAG + k;
            self.init_timer -= SAMPLE_DUR_SEC;
        }

        self.comp_acc = unit_acc * k_acc + new_acc * (1.0 - k_acc);
        self.comp_mag = unit_mag * k_mag + new_mag * (1.0 - k_mag);
        self.apply_correction(&unit_acc, k_acc, &unit_mag, k_mag / 4.0);
        self.gyr = *gyr;

        FilterOutput {
            corrected_acc: self.corrected_acc,
            corrected_mag: self.corrected_mag,
            gyr: self.gyr,
            acc_len: self.acc_len,
            mag_len: self.mag_len,
        }
    }
}
