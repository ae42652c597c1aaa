//! Runtime configuration file format (spec §6's `runtime <config.toml>`),
//! grounded on `braid-config-data`'s `BraidConfig`: one `[[table]]` per
//! producer, deserialized with serde then converted into the stage types
//! each crate expects.

use std::net::SocketAddr;

use kharon_imu::{DeviceConfig, Priorities, Priority};
use nalgebra::Matrix3;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    pub log_root: std::path::PathBuf,
    #[serde(default)]
    pub declination_deg: f64,
    #[serde(default = "default_frame_interval_sec")]
    pub frame_interval_sec: f64,
    #[serde(default)]
    pub imu: Vec<ImuConfig>,
    #[serde(default)]
    pub gps: Vec<GpsConfig>,
    #[serde(default)]
    pub camera: Vec<CameraConfig>,
}

fn default_frame_interval_sec() -> f64 {
    1.0 / 30.0
}

#[derive(Debug, Deserialize)]
pub struct ImuConfig {
    pub name: String,
    pub addr: SocketAddr,
    #[serde(default = "PriorityCfg::p1")]
    pub gyr_priority: PriorityCfg,
    #[serde(default = "PriorityCfg::p1")]
    pub acc_priority: PriorityCfg,
    #[serde(default = "PriorityCfg::p1")]
    pub mag_priority: PriorityCfg,
    #[serde(default)]
    pub x_mag_bias: f64,
    #[serde(default)]
    pub z_mag_bias: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityCfg {
    P1,
    P2,
    P3,
    Null,
}

impl PriorityCfg {
    fn p1() -> Self {
        PriorityCfg::P1
    }
}

impl From<PriorityCfg> for Priority {
    fn from(p: PriorityCfg) -> Self {
        match p {
            PriorityCfg::P1 => Priority::P1,
            PriorityCfg::P2 => Priority::P2,
            PriorityCfg::P3 => Priority::P3,
            PriorityCfg::Null => Priority::Null,
        }
    }
}

impl ImuConfig {
    pub fn device_config(&self) -> DeviceConfig {
        let priority = Priorities {
            gyr: self.gyr_priority.into(),
            acc: self.acc_priority.into(),
            mag: self.mag_priority.into(),
        };
        let mut cfg = DeviceConfig::identity(priority);
        cfg.x_mag_bias = self.x_mag_bias;
        cfg.z_mag_bias = self.z_mag_bias;
        cfg
    }
}

#[derive(Debug, Deserialize)]
pub struct GpsConfig {
    pub name: String,
    pub addr: SocketAddr,
}

#[derive(Debug, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    pub cam_num: u8,
    pub addr: SocketAddr,
}

/// Row-major 3x3 matrix as it would appear in the config file, e.g.
/// `dev2ship = [1,0,0, 0,1,0, 0,0,1]`. Currently unused by any built-in
/// device profile but kept available for per-IMU alignment overrides.
pub fn matrix_from_rows(rows: [f64; 9]) -> Matrix3<f64> {
    Matrix3::new(
        rows[0], rows[1], rows[2], rows[3], rows[4], rows[5], rows[6], rows[7], rows[8],
    )
}
