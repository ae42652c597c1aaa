//! Turn corrected acc/mag/gyr into a published `AttitudeRecord`: builds the
//! ship2world rotation matrix, derives heading/pitch/roll, and tracks turn
//! rate. Grounded on `publish.c`'s `publish_data`.

use nalgebra::Vector3;

use crate::filter::FilterOutput;
use crate::record::AttitudeRecord;
use crate::rotation::{build_orthogonal_matrix_yz, project_onto_plane};

const R2D: f64 = 180.0 / std::f64::consts::PI;
/// Turn rate running-average time constant: ~1/2 second at 100Hz.
const TURN_RATE_TAU: f64 = 1.0 / 50.0;

pub struct PublishState {
    mag_heading_deg: f64,
    heading_sec: f64,
    turn_rate_dps: f64,
    first: bool,
}

impl Default for PublishState {
    fn default() -> Self {
        PublishState { mag_heading_deg: 0.0, heading_sec: 0.0, turn_rate_dps: 0.0, first: true }
    }
}

impl PublishState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, filter_out: &FilterOutput, declination_deg: f64, t: f64, running_blind: bool) -> AttitudeRecord {
        let ship_z = project_onto_plane(&filter_out.corrected_acc, &filter_out.corrected_mag).normalize();
        let ship2world = build_orthogonal_matrix_yz(&filter_out.corrected_acc, &ship_z);

        let mut mag_heading_deg = ship2world.m13.atan2(ship2world.m33) * R2D;
        if mag_heading_deg < 0.0 {
            mag_heading_deg += 360.0;
        }
        let mut true_heading_deg = mag_heading_deg - declination_deg;
        if true_heading_deg < 0.0 {
            true_heading_deg += 360.0;
        }

        let dt = t - self.heading_sec;
        let mut dps = 0.0;
        if !self.first && dt > 0.0 {
            let mut d_heading = mag_heading_deg - self.mag_heading_deg;
            if d_heading > 180.0 {
                d_heading -= 360.0;
            } else if d_heading <= -180.0 {
                d_heading += 360.0;
            }
            dps = d_heading / dt;
        }
        self.turn_rate_dps = (1.0 - TURN_RATE_TAU) * self.turn_rate_dps + TURN_RATE_TAU * dps;
        self.mag_heading_deg = mag_heading_deg;
        self.heading_sec = t;
        self.first = false;

        let roll_vec = Vector3::new(filter_out.corrected_acc.x, filter_out.corrected_acc.y, 0.0).normalize();
        let roll_deg = -roll_vec.x.clamp(-1.0, 1.0).asin() * R2D;

        let pitch_vec = Vector3::new(0.0, filter_out.corrected_acc.y, filter_out.corrected_acc.z).normalize();
        let pitch_deg = -pitch_vec.z.clamp(-1.0, 1.0).asin() * R2D;

        AttitudeRecord {
            ship2world,
            acc: filter_out.corrected_acc,
            mag: filter_out.corrected_mag,
            gyr: filter_out.gyr,
            acc_len: filter_out.acc_len,
            mag_len: filter_out.mag_len,
            true_heading_deg,
            mag_heading_deg,
            pitch_deg,
            roll_deg,
            turn_rate_dps: self.turn_rate_dps,
            running_blind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ship_facing_north_has_zero_pitch_roll() {
        let mut state = PublishState::new();
        let filter_out = FilterOutput {
            corrected_acc: Vector3::new(0.0, 1.0, 0.0),
            corrected_mag: Vector3::new(0.0, 0.0, 1.0),
            gyr: Vector3::zeros(),
            acc_len: 9.8,
            mag_len: 1.0,
        };
        let record = state.publish(&filter_out, 0.0, 1.0, false);
        assert!(record.pitch_deg.abs() < 1e-6);
        assert!(record.roll_deg.abs() < 1e-6);
    }

    #[test]
    fn first_sample_reports_zero_turn_rate() {
        let mut state = PublishState::new();
        let filter_out = FilterOutput {
            corrected_acc: Vector3::new(0.0, 1.0, 0.0),
            corrected_mag: Vector3::new(0.0, 0.0, 1.0),
            gyr: Vector3::zeros(),
            acc_len: 9.8,
            mag_len: 1.0,
        };
        let record = state.publish(&filter_out, 0.0, 1.0, false);
        assert_eq!(record.turn_rate_dps, 0.0);
    }
}
