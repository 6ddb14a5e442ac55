use std::io;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid log level {name:?}: {reason}")]
    InvalidLevel { name: String, reason: &'static str },

    #[error("log level {0} is not supported")]
    UnsupportedLevel(String),

    #[error("output {0:?} is not supported")]
    UnsupportedOutput(String),

    #[error("format {0} is not supported")]
    UnsupportedFormat(String),

    #[error("caller location unavailable: {0}")]
    CallerUnavailable(String),

    #[error("failed registering the global logger")]
    Install(#[from] log::SetLoggerError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn invalid_level(name: impl Into<String>, reason: &'static str) -> Self {
        Error::InvalidLevel {
            name: name.into(),
            reason,
        }
    }
}
