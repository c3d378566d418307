use std::fmt;

#[derive(Debug)]
pub enum Error {
    Auth(String),
    Api { status: u16, detail: String },
    Network(reqwest::Error),
    Protocol(String),
    Config(String),
    ValueParse { sensor: String, value: String },
}

impl Error {
    /// True when the session token should be discarded before the next request.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Auth(msg) => write!(f, "authentication failed: {msg}"),
            Error::Api { status, detail } if detail.is_empty() => {
                write!(f, "API error ({status})")
            }
            Error::Api { status, detail } => write!(f, "API error ({status}): {detail}"),
            Error::Network(e) => write!(f, "network error: {e}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::ValueParse { sensor, value } => {
                write!(f, "non-numeric value {value:?} for sensor {sensor}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Network(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
