pub mod config;
pub mod stage;
pub mod upsample;

pub use config::{DeviceConfig, Priorities, Priority};
pub use stage::ImuReceiver;
pub use upsample::{Avail, ImuSample, RawSample, UpsampleState};
