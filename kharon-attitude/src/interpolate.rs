//! Time-indexed attitude lookup for consumers (e.g. optical-up), grounded
//! on `get_attitude.c`: a forward scan from the caller's previous index
//! that either interpolates between the bracketing samples or reports
//! that the answer isn't available yet (or never will be).

use kharon_core::queue::Queue;

use crate::record::AttitudeRecord;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryStatus {
    /// `t` falls within the queue's retained window; `AttitudeRecord` is a
    /// linear interpolation between the bracketing samples.
    Found(AttitudeRecord),
    /// `t` is later than anything published so far; try again once more
    /// data arrives.
    Pending,
    /// The earliest available sample is already later than `t`: the
    /// answer has already aged out of the retained window.
    Missing,
}

fn lerp_matrix(
    w0: f64,
    low: &nalgebra::Matrix3<f64>,
    w1: f64,
    high: &nalgebra::Matrix3<f64>,
) -> nalgebra::Matrix3<f64> {
    low * w0 + high * w1
}

fn weighted_average(t: f64, t0: f64, before: &AttitudeRecord, t1: f64, after: &AttitudeRecord) -> AttitudeRecord {
    let dt = t1 - t0;
    if dt <= 0.0 {
        kharon_core::scheduler::hard_exit(
            "attitude_interpolate",
            &kharon_core::KharonError::invariant(format!(
                "attitude samples must be strictly increasing in time, got t0={t0} t1={t1}"
            ))
            .to_string(),
        );
    }
    let w1 = (t - t0) / dt;
    let w0 = 1.0 - w1;
    AttitudeRecord {
        ship2world: lerp_matrix(w0, &before.ship2world, w1, &after.ship2world),
        acc: before.acc * w0 + after.acc * w1,
        mag: before.mag * w0 + after.mag * w1,
        gyr: before.gyr * w0 + after.gyr * w1,
        acc_len: before.acc_len * w0 + after.acc_len * w1,
        mag_len: before.mag_len * w0 + after.mag_len * w1,
        true_heading_deg: before.true_heading_deg * w0 + after.true_heading_deg * w1,
        mag_heading_deg: before.mag_heading_deg * w0 + after.mag_heading_deg * w1,
        pitch_deg: before.pitch_deg * w0 + after.pitch_deg * w1,
        roll_deg: before.roll_deg * w0 + after.roll_deg * w1,
        turn_rate_dps: before.turn_rate_dps * w0 + after.turn_rate_dps * w1,
        running_blind: before.running_blind || after.running_blind,
    }
}

/// Look up the attitude at time `t`, starting the forward scan at
/// `*prev_idx` (or half a queue length behind the head, whichever is
/// later, to avoid chasing the writer). Updates `*prev_idx` to the index
/// immediately preceding `t` on a `Found` result.
pub fn get_attitude(queue: &Queue<AttitudeRecord>, t: f64, prev_idx: &mut u64) -> QueryStatus {
    let produced = queue.produced();
    let capacity = queue.capacity() as u64;
    let early_start = produced.saturating_sub(capacity / 2);
    let mut idx = (*prev_idx).max(early_start);
    let mut idx_old = idx;

    while idx < produced {
        if let Some((ts, _)) = queue.get(idx) {
            if ts > t {
                if idx == idx_old {
                    return QueryStatus::Missing;
                }
                let (t0, before) = queue.get(idx_old).expect("idx_old was visited and not yet overwritten");
                let (t1, after) = queue.get(idx).expect("idx just matched");
                *prev_idx = idx_old;
                return QueryStatus::Found(weighted_average(t, t0, &before, t1, &after));
            }
        }
        idx_old = idx;
        idx += 1;
    }
    QueryStatus::Pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Vector3};

    fn sample(heading: f64) -> AttitudeRecord {
        AttitudeRecord {
            ship2world: Matrix3::identity(),
            acc: Vector3::new(0.0, 1.0, 0.0),
            mag: Vector3::new(0.0, 0.0, 1.0),
            gyr: Vector3::zeros(),
            acc_len: 9.8,
            mag_len: 1.0,
            true_heading_deg: heading,
            mag_heading_deg: heading,
            pitch_deg: 0.0,
            roll_deg: 0.0,
            turn_rate_dps: 0.0,
            running_blind: false,
        }
    }

    #[test]
    fn interpolates_between_bracketing_samples() {
        let q: Queue<AttitudeRecord> = Queue::new(16, 1);
        q.push(1.0, sample(10.0));
        q.push(2.0, sample(20.0));
        let mut prev = 0;
        match get_attitude(&q, 1.5, &mut prev) {
            QueryStatus::Found(rec) => assert!((rec.true_heading_deg - 15.0).abs() < 1e-9),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn time_past_last_sample_is_pending() {
        let q: Queue<AttitudeRecord> = Queue::new(16, 1);
        q.push(1.0, sample(10.0));
        let mut prev = 0;
        assert_eq!(get_attitude(&q, 5.0, &mut prev), QueryStatus::Pending);
    }

    #[test]
    fn time_before_first_sample_is_missing() {
        let q: Queue<AttitudeRecord> = Queue::new(16, 1);
        q.push(5.0, sample(10.0));
        q.push(6.0, sample(20.0));
        let mut prev = 0;
        assert_eq!(get_attitude(&q, 1.0, &mut prev), QueryStatus::Missing);
    }
}
