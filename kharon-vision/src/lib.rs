pub mod camera;
pub mod frame_sync;
pub mod optical_up;

pub use camera::CameraReceiver;
pub use frame_sync::{FrameSync, FrameSyncState, FrameSet, ALIGN_SECS, MAX_CAMS};
pub use optical_up::{OpticalUp, OpticalUpOutput, PassThrough, Reprojector, FRAME_DELAY_SEC};
