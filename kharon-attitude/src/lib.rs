pub mod declination;
pub mod filter;
pub mod merge;
pub mod record;
pub mod rotation;
pub mod interpolate;
pub mod publish;
pub mod stage;

pub use declination::Declination;
pub use filter::{AttitudeFilter, FilterOutput, BOOTSTRAP_INTERVAL_SEC, SAMPLE_DUR_SEC};
pub use interpolate::{get_attitude, QueryStatus};
pub use merge::{merge, ModalitySample};
pub use publish::PublishState;
pub use record::AttitudeRecord;
pub use stage::{AttitudeStage, Producer, ACC_MAG_TIMEOUT_SEC};
