use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Unsupported(String),
    InvalidConfig(String),
    InvalidArgs(String),
    EmptyPopulation(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Unsupported(msg) => write!(f, "capability unavailable: {}", msg),
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Error::InvalidArgs(msg) => write!(f, "invalid arguments: {}", msg),
            Error::EmptyPopulation(what) => {
                write!(f, "cannot compute {} of an empty sample population", what)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
