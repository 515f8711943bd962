//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use std::io;
use thiserror::Error;

use crate::socks5::HandshakeError;

/// socks-tun error type
///
/// Every variant except `Io` is fatal at startup: the binary reports it and
/// exits. Relay failures never show up here, they are reported per direction
/// in a `RelayOutcome`.
#[derive(Error, Debug)]
pub enum SocksTunError {
    /// The proxy could not be reached
    #[error("Failed to connect to SOCKS5 proxy {address}: {source}")]
    Dial {
        /// Proxy address that was dialed
        address: String,
        /// Underlying connect error
        #[source]
        source: io::Error,
    },

    /// The SOCKS5 handshake failed
    #[error("SOCKS5 handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// The virtual interface could not be set up
    #[error("Interface setup error: {0}")]
    InterfaceSetup(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `SocksTunError`.
pub type Result<T> = std::result::Result<T, SocksTunError>;

impl From<config::ConfigError> for SocksTunError {
    fn from(err: config::ConfigError) -> Self {
        SocksTunError::Config(err.to_string())
    }
}
