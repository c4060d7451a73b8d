use std::fmt;

/// All error types produced by the poly-route core.
#[derive(Debug)]
pub enum PolyRouteError {
    /// The configuration could not be loaded, or fails validation
    /// (e.g. no protocol section at all).
    Config(String),

    /// The region resolver could not turn the request's raw region value
    /// into a canonical region (missing field, unmapped value, ...).
    Resolve(String),

    /// The region lookup HTTP call failed at the transport level.
    Http(reqwest::Error),

    /// An I/O error (configuration file read, ...).
    Io(std::io::Error),
}

impl fmt::Display for PolyRouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolyRouteError::Config(msg) => write!(f, "{msg}"),
            PolyRouteError::Resolve(msg) => write!(f, "{msg}"),
            PolyRouteError::Http(err) => write!(f, "{err}"),
            PolyRouteError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for PolyRouteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PolyRouteError::Http(err) => Some(err),
            PolyRouteError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PolyRouteError {
    fn from(err: std::io::Error) -> Self {
        PolyRouteError::Io(err)
    }
}

impl From<reqwest::Error> for PolyRouteError {
    fn from(err: reqwest::Error) -> Self {
        PolyRouteError::Http(err)
    }
}

/// Convenience type alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PolyRouteError>;
