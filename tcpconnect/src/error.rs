//! Error types.
//!
//! Two families exist:
//! - [`ArgumentError`] is returned synchronously by the host entry point
//!   when the call itself is malformed. Nothing has been allocated yet.
//! - [`ConnectError`] is the rejection value of a started request. It
//!   describes which step failed and carries the OS error where there is
//!   one, so its `Display` is the platform's own description.

use std::io;

use thiserror::Error;

/// A malformed call to `tcpConnect`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("Wrong number of arguments. Expects 3 arguments.")]
    Count { got: usize },

    #[error("Wrong type of arguments. The host must be a string.")]
    HostType,

    #[error("Wrong type of arguments. The port must be a number.")]
    PortType,

    #[error("Wrong type of arguments. The message must be a string.")]
    MessageType,

    #[error("The port must be an integer between 0 and 65535.")]
    PortRange,
}

/// Growing a receive buffer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Error allocating memory")]
pub struct AllocError;

/// Why a request was rejected.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// `host:port` is not a usable socket address.
    #[error("invalid address {address}: {reason}")]
    Resolve { address: String, reason: String },

    /// The socket could not be created.
    #[error("{0}")]
    Open(#[source] io::Error),

    /// The connection could not be established.
    #[error("{0}")]
    Connect(#[source] io::Error),

    #[error("{0}")]
    Write(#[source] io::Error),

    #[error("{0}")]
    Read(#[source] io::Error),

    #[error(transparent)]
    Alloc(#[from] AllocError),

    /// The request did not settle within the configured timeout.
    #[error("operation timed out")]
    TimedOut,

    /// The request was dropped before it could settle, typically because
    /// its event loop was dropped while the request was in flight.
    #[error("request abandoned before completion")]
    Abandoned,
}

impl ConnectError {
    /// Classifies the error the way `std::io` would.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            ConnectError::Resolve { .. } => io::ErrorKind::InvalidInput,
            ConnectError::Open(err)
            | ConnectError::Connect(err)
            | ConnectError::Write(err)
            | ConnectError::Read(err) => err.kind(),
            ConnectError::Alloc(_) => io::ErrorKind::OutOfMemory,
            ConnectError::TimedOut => io::ErrorKind::TimedOut,
            ConnectError::Abandoned => io::ErrorKind::Interrupted,
        }
    }

    /// The OS error code behind this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            ConnectError::Open(err)
            | ConnectError::Connect(err)
            | ConnectError::Write(err)
            | ConnectError::Read(err) => err.raw_os_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_errors_display_platform_description() {
        let err = ConnectError::Connect(io::Error::from_raw_os_error(libc::ECONNREFUSED));

        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert_eq!(err.raw_os_error(), Some(libc::ECONNREFUSED));
        assert_eq!(
            err.to_string(),
            io::Error::from_raw_os_error(libc::ECONNREFUSED).to_string()
        );
    }

    #[test]
    fn alloc_failure_keeps_its_message() {
        let err = ConnectError::from(AllocError);

        assert_eq!(err.to_string(), "Error allocating memory");
        assert_eq!(err.kind(), io::ErrorKind::OutOfMemory);
    }
}
