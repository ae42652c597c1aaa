pub mod driver;
pub mod postmaster;
pub mod udp_sync;

pub use driver::{Alert, AlertMonitor, Beeper, Driver};
pub use postmaster::{bam32_to_degrees, degrees_to_bam32, Command, Request, Response};
pub use udp_sync::{SyncFlags, SyncPacket};
