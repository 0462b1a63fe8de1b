use std::io;
use thiserror::Error;

/// Fatal engine-level errors.
///
/// These abort startup (bind/listen failures) or describe conditions the
/// reactor cannot continue from. Per-connection failures never surface
/// here — they tear down the one connection and the worker keeps looping.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("invalid engine config: {reason}")]
    InvalidConfig { reason: String },
}

impl EngineError {
    pub fn invalid_config<S: ToString>(reason: S) -> Self {
        Self::InvalidConfig { reason: reason.to_string() }
    }
}

/// A malformed request.
///
/// Note the deliberate asymmetry with "need more bytes": an incomplete
/// request is *not* an error (the parser returns `Ok(None)` and the caller
/// waits for the next read). `ParseError` always means the connection must
/// be closed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("request line not terminated by CRLF")]
    BareLf,

    #[error("header line without colon")]
    HeaderMissingColon,

    #[error("invalid content-length value")]
    InvalidContentLength,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        assert_eq!(ParseError::HeaderMissingColon.to_string(), "header line without colon");
        assert_eq!(ParseError::InvalidContentLength.to_string(), "invalid content-length value");
    }
}
