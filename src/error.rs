use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("frame error: {0}")]
    Frame(#[from] geometry::FrameError),

    #[error("grid file lacks the expected preamble or is truncated")]
    Format,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<binrw::Error> for Error {
    fn from(e: binrw::Error) -> Self {
        match e {
            binrw::Error::BadMagic { .. } => Error::Format,
            binrw::Error::Io(io) => Error::Io(io),
            _ => Error::Format,
        }
    }
}
