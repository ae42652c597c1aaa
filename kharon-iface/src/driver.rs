//! Driver/beeper interface (spec §2.11): downstream consumers of
//! attitude+GPS+frame data are collaborators, not implemented here — these
//! are the seams a concrete autopilot/beeper driver plugs into, plus the
//! alert-state logic spec §7 calls out explicitly ("beeper emits a
//! distinct 'running blind' alert when attitude marks running-blind in
//! its persistent flags").

use kharon_attitude::AttitudeRecord;
use kharon_gps::GpsFix;
use kharon_vision::FrameSet;

/// Steering/route consumer. A concrete implementation turns attitude, GPS,
/// and frame data into autopilot commands; this crate only defines the
/// seam.
pub trait Driver: Send {
    fn on_attitude(&mut self, record: &AttitudeRecord);
    fn on_gps(&mut self, fix: &GpsFix);
    fn on_frame_set(&mut self, set: &FrameSet);
}

/// Audible alerts a beeper driver can be asked to sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    /// Attitude is unreliable (filter re-bootstrapping after losing gyro).
    RunningBlind,
    /// No GPS fix has been seen recently.
    NoGps,
    /// Conditions are back to normal; silence any standing alert.
    Clear,
}

pub trait Beeper: Send {
    fn sound(&mut self, alert: Alert);
}

/// Watches attitude and GPS records and raises/clears alerts on a
/// `Beeper`, collapsing repeated identical alerts into a single sound.
pub struct AlertMonitor<B> {
    beeper: B,
    current: Option<Alert>,
}

impl<B: Beeper> AlertMonitor<B> {
    pub fn new(beeper: B) -> Self {
        AlertMonitor { beeper, current: None }
    }

    pub fn on_attitude(&mut self, record: &AttitudeRecord) {
        let alert = if record.running_blind { Some(Alert::RunningBlind) } else { None };
        self.apply(alert);
    }

    pub fn on_gps_timeout(&mut self, timed_out: bool) {
        let alert = if timed_out { Some(Alert::NoGps) } else { None };
        self.apply(alert);
    }

    fn apply(&mut self, alert: Option<Alert>) {
        match (self.current, alert) {
            (Some(a), Some(b)) if a == b => {}
            (_, Some(b)) => {
                self.beeper.sound(b);
                self.current = Some(b);
            }
            (Some(_), None) => {
                self.beeper.sound(Alert::Clear);
                self.current = None;
            }
            (None, None) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Vector3};

    #[derive(Default)]
    struct RecordingBeeper {
        sounded: Vec<Alert>,
    }
    impl Beeper for RecordingBeeper {
        fn sound(&mut self, alert: Alert) {
            self.sounded.push(alert);
        }
    }

    fn record(running_blind: bool) -> AttitudeRecord {
        AttitudeRecord {
            ship2world: Matrix3::identity(),
            acc: Vector3::new(0.0, 1.0, 0.0),
            mag: Vector3::new(0.0, 0.0, 1.0),
            gyr: Vector3::zeros(),
            acc_len: 9.8,
            mag_len: 1.0,
            true_heading_deg: 0.0,
            mag_heading_deg: 0.0,
            pitch_deg: 0.0,
            roll_deg: 0.0,
            turn_rate_dps: 0.0,
            running_blind,
        }
    }

    #[test]
    fn running_blind_sounds_once_until_cleared() {
        let mut monitor = AlertMonitor::new(RecordingBeeper::default());
        monitor.on_attitude(&record(true));
        monitor.on_attitude(&record(true));
        monitor.on_attitude(&record(false));
        assert_eq!(monitor.beeper.sounded, vec![Alert::RunningBlind, Alert::Clear]);
    }

    #[test]
    fn nominal_attitude_stays_quiet() {
        let mut monitor = AlertMonitor::new(RecordingBeeper::default());
        monitor.on_attitude(&record(false));
        assert!(monitor.beeper.sounded.is_empty());
    }
}
