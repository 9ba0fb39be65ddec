use std::io;
use std::net;

/// Opaque id assigned to every accepted connection. Monotonic per host,
/// never reused within a process lifetime.
pub type ClientId = u64;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// All protocol plumbing reports either a `Wait` (not enough data or buffer
/// space, try again later) or a `Fatal` error that kills the connection.
#[derive(Debug, Eq, PartialEq)]
pub enum ProtocolError {
    Wait,
    Fatal(ErrorType),
}

#[derive(Debug, Eq, PartialEq)]
pub enum ErrorType {
    /// Decoded frame length outside the allowed bounds.
    FrameBounds,
    /// A read ran past the end of the payload.
    PayloadUnderflow,
    /// A write ran past the end of the frame scratch buffer.
    SinkOverflow,
    /// A wire string was not valid UTF-8.
    StringEncoding,
    /// The outbound buffer ceiling was exceeded.
    BackPressure,
    /// A payload failed to decode inside a handler.
    MalformedCommand,
    AddrParse,
    Io(io::ErrorKind),
}

impl From<io::Error> for ProtocolError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => ProtocolError::Wait,
            kind => ProtocolError::Fatal(ErrorType::Io(kind)),
        }
    }
}

impl From<net::AddrParseError> for ProtocolError {
    #[inline]
    fn from(_: net::AddrParseError) -> Self {
        ProtocolError::Fatal(ErrorType::AddrParse)
    }
}

pub trait ErrorUtils {
    /// Returns true if the result holds a fatal error. `Wait` does not count
    /// as a failure.
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for ProtocolResult<T> {
    fn has_failed(&self) -> bool {
        match self {
            Ok(_) => false,
            Err(ProtocolError::Wait) => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_would_block_folds_to_wait() {
        let err: ProtocolError = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert_eq!(err, ProtocolError::Wait);
    }

    #[test]
    fn test_other_io_errors_are_fatal() {
        let err: ProtocolError = io::Error::from(io::ErrorKind::ConnectionReset).into();
        assert_eq!(
            err,
            ProtocolError::Fatal(ErrorType::Io(io::ErrorKind::ConnectionReset))
        );
    }

    #[test]
    fn test_has_failed() {
        assert!(!Ok::<(), ProtocolError>(()).has_failed());
        assert!(!Err::<(), _>(ProtocolError::Wait).has_failed());
        assert!(Err::<(), _>(ProtocolError::Fatal(ErrorType::FrameBounds)).has_failed());
    }
}
