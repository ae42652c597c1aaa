//! Attitude stage (spec §2.6/§4.3): merges upsampled IMU data from every
//! attached producer, runs the complementary filter, and publishes.
//!
//! Simplified relative to `attitude.c`'s literal delay-window/force-publish
//! state machine: each 10ms tick drains every producer's queue for its
//! newest sample, merges by priority, and publishes immediately once a
//! merged gyro reading is available. The essential behaviors (priority
//! merge, bootstrap ramp re-entered on lost gyro, acc/mag recycling) are
//! preserved; the exact multi-hundred-millisecond delay window that the
//! source uses to let slow producers catch up is not replayed tick-for-tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nalgebra::Vector3;
use thread_control::Flag;

use kharon_core::queue::{Cursor, Queue};
use kharon_imu::{Avail, ImuSample, Priorities, Priority};

use crate::declination::Declination;
use crate::filter::{AttitudeFilter, SAMPLE_DUR_SEC};
use crate::merge::{merge, ModalitySample};
use crate::publish::PublishState;
use crate::record::AttitudeRecord;

/// Max age (seconds) a recycled acc/mag reading is still trusted before
/// the producer is treated as offline for that modality (`ACC_MAG_TIMEOUT_USEC`).
pub const ACC_MAG_TIMEOUT_SEC: f64 = 0.3;

pub struct Producer {
    pub queue: Arc<Queue<ImuSample>>,
    pub priorities: Priorities,
}

struct ProducerState {
    queue: Arc<Queue<ImuSample>>,
    priorities: Priorities,
    cursor: Cursor,
    last_acc: Option<(f64, Vector3<f64>)>,
    last_mag: Option<(f64, Vector3<f64>)>,
}

pub struct AttitudeStage {
    name: String,
    producers: Vec<ProducerState>,
    filter: AttitudeFilter,
    publish_state: PublishState,
    declination: Arc<Declination>,
    out_queue: Arc<Queue<AttitudeRecord>>,
    next_publish_t: f64,
    now: Arc<dyn Fn() -> f64 + Send + Sync>,
}

impl AttitudeStage {
    pub fn new(
        name: impl Into<String>,
        producers: Vec<Producer>,
        declination: Arc<Declination>,
        out_queue: Arc<Queue<AttitudeRecord>>,
        now: Arc<dyn Fn() -> f64 + Send + Sync>,
    ) -> Self {
        AttitudeStage {
            name: name.into(),
            producers: producers
                .into_iter()
                .map(|p| ProducerState {
                    queue: p.queue,
                    priorities: p.priorities,
                    cursor: Cursor::new(),
                    last_acc: None,
                    last_mag: None,
                })
                .collect(),
            filter: AttitudeFilter::new(),
            publish_state: PublishState::new(),
            declination,
            out_queue,
            next_publish_t: 0.0,
            now,
        }
    }

    pub fn out_queue(&self) -> &Arc<Queue<AttitudeRecord>> {
        &self.out_queue
    }

    /// Pull every producer forward to its latest sample, recording what
    /// each carries this tick (gyro directly, acc/mag recycled against
    /// `ACC_MAG_TIMEOUT_SEC`).
    fn poll_producers(&mut self, t: f64) -> (Vec<ModalitySample>, Vec<ModalitySample>, Vec<ModalitySample>) {
        let mut gyr_samples = Vec::new();
        let mut acc_samples = Vec::new();
        let mut mag_samples = Vec::new();

        for p in &mut self.producers {
            let mut latest: Option<ImuSample> = None;
            while p.cursor.has_data(&p.queue) {
                let idx = p.cursor.consumed();
                if let Some((_, sample)) = p.queue.get(idx) {
                    latest = Some(sample);
                }
                p.cursor.advance_to(idx + 1);
            }
            let Some(sample) = latest else { continue };
            let Avail { gyr, acc, mag } = sample.avail;

            if gyr && p.priorities.gyr != kharon_imu::Priority::Null {
                gyr_samples.push(ModalitySample { priority: p.priorities.gyr, value: sample.gyr });
            }
            if acc {
                p.last_acc = Some((t, sample.acc));
            }
            if mag {
                p.last_mag = Some((t, sample.mag));
            }
            if let Some((seen, v)) = p.last_acc {
                if t - seen <= ACC_MAG_TIMEOUT_SEC && p.priorities.acc != kharon_imu::Priority::Null {
                    acc_samples.push(ModalitySample { priority: p.priorities.acc, value: v });
                }
            }
            if let Some((seen, v)) = p.last_mag {
                if t - seen <= ACC_MAG_TIMEOUT_SEC && p.priorities.mag != kharon_imu::Priority::Null {
                    mag_samples.push(ModalitySample { priority: p.priorities.mag, value: v });
                }
            }
        }
        (gyr_samples, acc_samples, mag_samples)
    }
}

impl kharon_core::scheduler::Stage for AttitudeStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_run(&mut self) -> Result<(), kharon_core::KharonError> {
        if self.producers.is_empty() {
            return Err(kharon_core::KharonError::configuration(
                "attitude stage requires at least one imu producer",
            ));
        }
        // `attitude_class_run`'s own pre-run check: every modality needs at
        // least one P1 producer, or the fused output has no primary
        // reference for that axis and the stage can't do its job.
        let has_p1_gyr = self.producers.iter().any(|p| p.priorities.gyr == Priority::P1);
        let has_p1_acc = self.producers.iter().any(|p| p.priorities.acc == Priority::P1);
        let has_p1_mag = self.producers.iter().any(|p| p.priorities.mag == Priority::P1);
        if !(has_p1_gyr && has_p1_acc && has_p1_mag) {
            return Err(kharon_core::KharonError::configuration(
                "attitude stage requires a P1 producer for gyro, acc, and mag",
            ));
        }
        self.next_publish_t = (self.now)();
        Ok(())
    }

    fn run(&mut self, flag: &Flag) {
        let tick = Duration::from_secs_f64(SAMPLE_DUR_SEC);
        while flag.is_alive() {
            std::thread::sleep(tick);
            let t = (self.now)();
            let (gyr, acc, mag) = self.poll_producers(t);

            let Some(merged_gyr) = merge(&gyr) else {
                self.filter.reset_bootstrap();
                continue;
            };
            let merged_acc = merge(&acc).unwrap_or(Vector3::new(0.0, 1.0, 0.0));
            let merged_mag = merge(&mag).unwrap_or(Vector3::new(0.0, 0.0, 1.0));

            let out = self.filter.step(&merged_gyr, &merged_acc, &merged_mag, SAMPLE_DUR_SEC);
            let declination = self.declination.get();
            self.next_publish_t += SAMPLE_DUR_SEC;
            let running_blind = self.filter.is_bootstrapping();
            let record = self.publish_state.publish(&out, declination, self.next_publish_t, running_blind);
            self.out_queue.push(self.next_publish_t, record);
        }
    }
}

/// `TimeBase`-backed clock, extracted as a counter for tests.
pub fn counting_clock(counter: Arc<AtomicU64>, step_secs: f64) -> Arc<dyn Fn() -> f64 + Send + Sync> {
    Arc::new(move || {
        let n = counter.fetch_add(1, Ordering::Relaxed);
        n as f64 * step_secs
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn producer_with(priorities: Priorities) -> Producer {
        Producer { queue: Arc::new(Queue::new(16, 1)), priorities }
    }

    #[test]
    fn pre_run_fails_with_no_producers() {
        let mut stage = AttitudeStage::new(
            "attitude",
            vec![],
            Arc::new(Declination::default()),
            Arc::new(Queue::new(16, 1)),
            Arc::new(|| 0.0),
        );
        assert!(kharon_core::scheduler::Stage::pre_run(&mut stage).is_err());
    }

    #[test]
    fn poll_producers_reports_merged_gyro() {
        let priorities = Priorities { gyr: kharon_imu::Priority::P1, acc: kharon_imu::Priority::P1, mag: kharon_imu::Priority::P1 };
        let producer = producer_with(priorities);
        producer.queue.push(
            1.0,
            ImuSample {
                gyr: Vector3::new(1.0, 0.0, 0.0),
                acc: Vector3::new(0.0, 1.0, 0.0),
                mag: Vector3::new(0.0, 0.0, 1.0),
                avail: Avail { gyr: true, acc: true, mag: true },
            },
        );
        let mut stage = AttitudeStage::new(
            "attitude",
            vec![producer],
            Arc::new(Declination::default()),
            Arc::new(Queue::new(16, 1)),
            Arc::new(|| 1.0),
        );
        let (gyr, acc, mag) = stage.poll_producers(1.0);
        assert_eq!(gyr.len(), 1);
        assert_eq!(acc.len(), 1);
        assert_eq!(mag.len(), 1);
    }

    #[test]
    fn pre_run_fails_without_a_p1_producer_per_modality() {
        let priorities = Priorities { gyr: Priority::P2, acc: Priority::P1, mag: Priority::P1 };
        let mut stage = AttitudeStage::new(
            "attitude",
            vec![producer_with(priorities)],
            Arc::new(Declination::default()),
            Arc::new(Queue::new(16, 1)),
            Arc::new(|| 0.0),
        );
        assert!(kharon_core::scheduler::Stage::pre_run(&mut stage).is_err());
    }

    #[test]
    fn pre_run_succeeds_with_a_p1_producer_per_modality() {
        let priorities = Priorities { gyr: Priority::P1, acc: Priority::P1, mag: Priority::P1 };
        let mut stage = AttitudeStage::new(
            "attitude",
            vec![producer_with(priorities)],
            Arc::new(Declination::default()),
            Arc::new(Queue::new(16, 1)),
            Arc::new(|| 0.0),
        );
        assert!(kharon_core::scheduler::Stage::pre_run(&mut stage).is_ok());
    }
}
