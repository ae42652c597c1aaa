#[derive(thiserror::Error, Debug)]
pub enum GpsError {
    #[error(transparent)]
    Core(#[from] kharon_core::KharonError),
    #[error("i/o error")]
    Io(#[from] std::io::Error),
}
