pub mod error;
pub mod nmea;
pub mod stage;

pub use error::GpsError;
pub use nmea::{parse_sentence, Available, NmeaFix};
pub use stage::{GpsFix, GpsReceiver};
