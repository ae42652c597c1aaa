//! Merge same-modality readings from multiple IMU producers by priority.
//!
//! Priority rules, from `imu_receiver.h`'s `imu_class`:
//!   P1  producer data is always used when available
//!   P2  producer data used when available, at half the weight of P1
//!   P3  producer data used only when no P1 reading is available, at the
//!       same weight as P2
//!   Null  producer does not carry this modality
//!
//! Per the redesign note that priority is a per-producer/per-modality
//! tuple rather than a hardcoded four-tier scheme, this operates on
//! whatever `(priority, value)` pairs are handed to it rather than on
//! fixed producer slots.

use kharon_imu::Priority;
use nalgebra::Vector3;

#[derive(Debug, Clone, Copy)]
pub struct ModalitySample {
    pub priority: Priority,
    pub value: Vector3<f64>,
}

/// Weighted-average merge of whatever samples are currently available for
/// one modality. Returns `None` if nothing usable is present.
pub fn merge(samples: &[ModalitySample]) -> Option<Vector3<f64>> {
    let has_p1 = samples.iter().any(|s| s.priority == Priority::P1);
    let mut sum = Vector3::zeros();
    let mut weight_sum = 0.0;
    for s in samples {
        let included = match s.priority {
            Priority::P1 | Priority::P2 => true,
            Priority::P3 => !has_p1,
            Priority::Null => false,
        };
        if included {
            let w = s.priority.weight();
            sum += s.value * w;
            weight_sum += w;
        }
    }
    if weight_sum > 0.0 {
        Some(sum / weight_sum)
    } else {
        None
    }
}
